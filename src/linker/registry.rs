//! Registry-backed linker: discovery over a coordination store.
//!
//! The linker keeps two consistent in-memory indices over the set of
//! registered backends - address to routes, and route to address set -
//! populated by one bulk read at startup and kept current by a background
//! task consuming the store's watch stream. Selection is a synchronous read
//! picking uniformly at random among eligible candidates.
//!
//! Deregistrations are published on a bounded offline-notification channel;
//! when the consumer falls behind, notifications are dropped rather than
//! blocking the watch loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};

use super::store::{RegistryEvent, RegistryStore};
use super::{AddressSet, Linker, ServiceInfo};

/// The two registry indices, updated together under one lock so a single
/// registration event is always atomic with respect to readers:
/// an address appears in `routes[r]` iff `r` is in `nodes[address]`.
#[derive(Default)]
struct Indices {
    /// Address -> the routes it serves.
    nodes: HashMap<Arc<str>, ServiceInfo>,
    /// Route -> the addresses serving it.
    routes: HashMap<String, HashSet<Arc<str>>>,
}

impl Indices {
    /// Insert or overwrite one address's registration.
    fn insert(&mut self, address: Arc<str>, info: ServiceInfo) {
        // An overwrite may shrink the route set; drop the old edges first.
        self.remove(&address);
        for route in &info.uri_paths {
            self.routes
                .entry(route.clone())
                .or_default()
                .insert(Arc::clone(&address));
        }
        self.nodes.insert(address, info);
    }

    /// Remove one address from both indices. Returns whether it was known.
    fn remove(&mut self, address: &str) -> bool {
        let Some(info) = self.nodes.remove(address) else {
            return false;
        };
        for route in &info.uri_paths {
            let emptied = match self.routes.get_mut(route) {
                Some(addresses) => {
                    addresses.remove(address);
                    addresses.is_empty()
                }
                None => false,
            };
            if emptied {
                self.routes.remove(route);
            }
        }
        true
    }
}

/// Linker backed by a coordination store.
///
/// `S` is the store client; see [`RegistryStore`]. The linker owns a watch
/// consumption task for the store's key namespace; dropping registrations
/// evicts the address from both indices and emits an offline notification.
pub struct RegistryLinker<S: RegistryStore> {
    store: Arc<S>,
    indices: Arc<RwLock<Indices>>,
    offline_rx: Mutex<Option<mpsc::Receiver<Arc<str>>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: RegistryStore> RegistryLinker<S> {
    /// Build the indices with a bulk read and start the watch task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration or
    /// [`Error::Registry`] when the bulk read fails.
    pub async fn connect(store: Arc<S>, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let namespace = config.namespace.clone();

        // Watch before the bulk read so nothing slips between the two; an
        // entry seen by both is simply inserted twice.
        let events = store.watch(&namespace);

        let mut indices = Indices::default();
        for (key, value) in store.fetch(&namespace).await? {
            if let Some((address, info)) = parse_registration(&namespace, &key, &value) {
                indices.insert(address, info);
            }
        }
        info!(
            namespace = %namespace,
            backends = indices.nodes.len(),
            "registry linker initialized"
        );

        let indices = Arc::new(RwLock::new(indices));
        let (offline_tx, offline_rx) = mpsc::channel(config.offline_buffer);
        let watch_task = tokio::spawn(consume_events(
            namespace,
            events,
            Arc::clone(&indices),
            offline_tx,
        ));

        Ok(Self {
            store,
            indices,
            offline_rx: Mutex::new(Some(offline_rx)),
            watch_task: Mutex::new(Some(watch_task)),
            closed: AtomicBool::new(false),
        })
    }
}

impl<S: RegistryStore> Linker for RegistryLinker<S> {
    fn select(&self, route: &str, exclude: &AddressSet) -> Result<Arc<str>> {
        let indices = self.indices.read();
        let Some(addresses) = indices.routes.get(route) else {
            return Err(Error::not_found_service(route));
        };
        let eligible: Vec<&Arc<str>> = addresses
            .iter()
            .filter(|address| !exclude.contains(*address))
            .collect();
        if eligible.is_empty() {
            return Err(Error::not_found_service(route));
        }
        let pick = eligible[rand::thread_rng().gen_range(0..eligible.len())];
        Ok(Arc::clone(pick))
    }

    fn candidate_count(&self, route: &str) -> usize {
        self.indices
            .read()
            .routes
            .get(route)
            .map_or(0, HashSet::len)
    }

    fn watch_offline(&self) -> Option<mpsc::Receiver<Arc<str>>> {
        self.offline_rx.lock().take()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Aborting the watch task drops the offline sender, ending the
        // notification source.
        if let Some(task) = self.watch_task.lock().take() {
            task.abort();
        }
        self.store.close();
        info!("registry linker closed");
    }
}

/// Watch-consumption loop: applies every put/delete to the indices and
/// publishes offline notifications. Runs until the store's stream ends.
async fn consume_events(
    namespace: String,
    mut events: mpsc::Receiver<RegistryEvent>,
    indices: Arc<RwLock<Indices>>,
    offline_tx: mpsc::Sender<Arc<str>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RegistryEvent::Put { key, value } => {
                if let Some((address, info)) = parse_registration(&namespace, &key, &value) {
                    debug!(address = %address, routes = info.uri_paths.len(), "backend registered");
                    indices.write().insert(address, info);
                }
            }
            RegistryEvent::Delete { key } => {
                let Some(address) = key.strip_prefix(&namespace) else {
                    continue;
                };
                let address: Arc<str> = Arc::from(address);
                if indices.write().remove(&address) {
                    info!(address = %address, "backend deregistered");
                    if offline_tx.try_send(Arc::clone(&address)).is_err() {
                        warn!(
                            address = %address,
                            "offline notification dropped, consumer not keeping up"
                        );
                    }
                }
            }
        }
    }
    debug!("registry watch stream ended");
}

/// Parse a registration entry into `(address, ServiceInfo)`.
///
/// Malformed entries (foreign keys, invalid JSON) are logged and skipped so
/// one bad registrant cannot poison discovery.
fn parse_registration(namespace: &str, key: &str, value: &str) -> Option<(Arc<str>, ServiceInfo)> {
    let Some(address) = key.strip_prefix(namespace) else {
        warn!(key = %key, "registration key outside namespace, ignored");
        return None;
    };
    match serde_json::from_str::<ServiceInfo>(value) {
        Ok(info) => Some((Arc::from(address), info)),
        Err(err) => {
            warn!(key = %key, error = %err, "malformed registration value, ignored");
            None
        }
    }
}
