//! Coordination-store boundary for the registry linker.
//!
//! The distributed store that backends register themselves in (and that
//! keeps registrations fresh with leases) is an external collaborator. This
//! module defines the narrow surface the registry linker needs from it -
//! bulk prefix read, prefix watch, close - plus [`MemoryStore`], a complete
//! in-process implementation used for embedding and tests.

use std::collections::BTreeMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::constants;
use crate::error::Result;

/// A change observed under a watched key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A key was created or overwritten.
    Put {
        /// Full key, including the watched prefix.
        key: String,
        /// Raw value (JSON-encoded `ServiceInfo` for registration keys).
        value: String,
    },
    /// A key was removed (deregistered or lease-expired).
    Delete {
        /// Full key, including the watched prefix.
        key: String,
    },
}

/// Key-value coordination store capabilities used by the registry linker.
///
/// Registration freshness (leases, keepalives) is the registrant's concern;
/// from this side a lease expiry is just a `Delete` event.
pub trait RegistryStore: Send + Sync + 'static {
    /// Read every `(key, value)` pair under `prefix`.
    fn fetch(&self, prefix: &str) -> impl Future<Output = Result<Vec<(String, String)>>> + Send;

    /// Start watching `prefix`. The returned stream yields every subsequent
    /// put/delete under the prefix and ends when the store is closed.
    fn watch(&self, prefix: &str) -> mpsc::Receiver<RegistryEvent>;

    /// Release the store connection and end all watch streams. Idempotent.
    fn close(&self);
}

struct Watcher {
    prefix: String,
    tx: mpsc::Sender<RegistryEvent>,
}

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<String, String>,
    watchers: Vec<Watcher>,
    closed: bool,
}

/// In-process [`RegistryStore`].
///
/// Behaves like the real coordination store at this crate's boundary:
/// watches observe every mutation made after they were established, and
/// closing the store ends every watch stream. Useful when embedding the
/// client and its backends in one process, and as the store fixture in
/// tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key, notifying matching watchers.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.entries.insert(key.clone(), value.clone());
        Self::publish(&mut inner, &RegistryEvent::Put { key, value });
    }

    /// Remove a key, notifying matching watchers if it existed.
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        if inner.entries.remove(key).is_some() {
            Self::publish(
                &mut inner,
                &RegistryEvent::Delete {
                    key: key.to_string(),
                },
            );
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn publish(inner: &mut StoreInner, event: &RegistryEvent) {
        let key = match event {
            RegistryEvent::Put { key, .. } | RegistryEvent::Delete { key } => key,
        };
        inner.watchers.retain(|watcher| {
            if !key.starts_with(&watcher.prefix) {
                return true;
            }
            match watcher.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(key = %key, "watch stream full, event dropped");
                    true
                }
                // Receiver went away; forget the watcher.
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl RegistryStore for MemoryStore {
    async fn fetch(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn watch(&self, prefix: &str) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel(constants::WATCH_BUFFER);
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.watchers.push(Watcher {
                prefix: prefix.to_string(),
                tx,
            });
        }
        rx
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        // Dropping the senders ends every watch stream.
        inner.watchers.clear();
        debug!("memory store closed");
    }
}
