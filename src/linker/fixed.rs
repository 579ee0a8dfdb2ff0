//! Fixed-address linker for direct, discovery-free connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;

use super::{AddressSet, Linker};

/// A linker with exactly one fixed backend address.
///
/// Selection always yields the configured address - with no alternates the
/// exclusion set is irrelevant. The offline source never emits; it simply
/// ends when the linker is closed.
#[derive(Debug)]
pub struct FixedLinker {
    address: Arc<str>,
    /// Held so the offline source stays open until `close`; never sent on.
    offline_tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    offline_rx: Mutex<Option<mpsc::Receiver<Arc<str>>>>,
    closed: AtomicBool,
}

impl FixedLinker {
    /// Create a linker for one fixed address.
    pub fn new(address: impl Into<Arc<str>>) -> Self {
        let (offline_tx, offline_rx) = mpsc::channel(1);
        Self {
            address: address.into(),
            offline_tx: Mutex::new(Some(offline_tx)),
            offline_rx: Mutex::new(Some(offline_rx)),
            closed: AtomicBool::new(false),
        }
    }

    /// The fixed address this linker resolves every route to.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Linker for FixedLinker {
    fn select(&self, _route: &str, _exclude: &AddressSet) -> Result<Arc<str>> {
        Ok(Arc::clone(&self.address))
    }

    fn candidate_count(&self, _route: &str) -> usize {
        1
    }

    fn watch_offline(&self) -> Option<mpsc::Receiver<Arc<str>>> {
        self.offline_rx.lock().take()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender ends the offline source.
        self.offline_tx.lock().take();
        debug!(address = %self.address, "fixed linker closed");
    }
}
