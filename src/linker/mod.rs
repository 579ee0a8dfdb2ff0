//! Backend discovery: mapping routes to candidate addresses.
//!
//! A [`Linker`] answers three questions for the call path: which address
//! currently serves a route (with some addresses excluded), how many
//! candidates exist at all, and which addresses have gone away. Two
//! implementations are provided:
//!
//! - [`FixedLinker`] - one fixed address, no discovery
//! - [`RegistryLinker`] - backed by a coordination store, kept current by a
//!   continuous watch
//!
//! # Key Types
//!
//! - [`Linker`] - the discovery trait consumed by the breaker and client
//! - [`ServiceInfo`] - the set of routes one address serves
//! - [`RegistryStore`] - the coordination-store boundary
//! - [`MemoryStore`] - in-process store for embedding and tests

mod fixed;
mod registry;
mod store;

pub use fixed::FixedLinker;
pub use registry::RegistryLinker;
pub use store::{MemoryStore, RegistryEvent, RegistryStore};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Set of backend addresses, used for per-call exclusion during selection.
pub type AddressSet = HashSet<Arc<str>>;

/// The set of routes a backend address currently serves.
///
/// This is the registry's value format: a registration key
/// `<namespace><address>` maps to the JSON encoding of this struct.
/// Unknown fields are tolerated for forward compatibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Routes served by the address.
    #[serde(default)]
    pub uri_paths: Vec<String>,
}

impl ServiceInfo {
    /// Create a `ServiceInfo` from anything yielding route strings.
    pub fn new<I, S>(uri_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uri_paths: uri_paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// Discovery abstraction mapping routes to candidate backend addresses.
///
/// Selection methods are synchronous reads over in-memory indices; keeping
/// the indices current is the implementation's own (background) concern.
pub trait Linker: Send + Sync + 'static {
    /// Return one candidate address serving `route` that is not in
    /// `exclude`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFoundService`] when no candidate exists - the
    /// route is unknown or every candidate is excluded.
    ///
    /// [`Error::NotFoundService`]: crate::error::Error::NotFoundService
    fn select(&self, route: &str, exclude: &AddressSet) -> Result<Arc<str>>;

    /// Number of known candidates for `route` (0 if unknown). Callers use
    /// this to bound their retry loops.
    fn candidate_count(&self, route: &str) -> usize;

    /// Take the offline-notification source.
    ///
    /// The source emits an address every time that address disappears from
    /// discovery. It can be taken exactly once; subsequent calls return
    /// `None`. The source ends when the linker is closed.
    fn watch_offline(&self) -> Option<mpsc::Receiver<Arc<str>>>;

    /// Release discovery resources and end the offline source. Idempotent.
    fn close(&self);
}
