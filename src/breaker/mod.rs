//! Per-backend circuit breaking and failure-aware session selection.
//!
//! The breaker owns one state machine per discovered backend address
//! (see [`state`]), a table of lazily created sessions, and the background
//! maintenance that keeps the rolling failure windows honest:
//!
//! - a **rotation** task advancing every address's window one slot per
//!   interval (clearing the oldest slot), and
//! - an **evaluation** task opening the circuit of any Closed address whose
//!   windowed failure rate is over the threshold, rotating the windows of
//!   those that stay Closed.
//!
//! A third task drains the linker's offline notifications, discarding the
//! session of any address that leaves discovery.
//!
//! ## States
//!
//! - **Closed**: normal operation, calls admitted
//! - **Open**: too many failures, calls rejected until the break elapses
//! - **`HalfOpen`**: testing recovery - only ONE probe call allowed
//!
//! When breaking is disabled by configuration the breaker degrades to a
//! pass-through: every admission succeeds, feedback is discarded and no
//! window maintenance runs. Session caching and offline eviction still
//! apply - they are discovery semantics, not failure isolation.

mod config;
pub(crate) mod state;
mod window;

#[cfg(test)]
mod tests;

pub use config::BreakerConfig;
pub use state::BreakerStatus;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::linker::{AddressSet, Linker};
use crate::session::Session;
use crate::transport::Transport;

type SessionTable<C> = Arc<RwLock<HashMap<Arc<str>, Arc<Session<C>>>>>;

/// Failure-aware session source for one transport.
///
/// Combines discovery ([`Linker`]), per-address circuit state and lazy
/// session creation into a single "give me a healthy session for this
/// route" operation. Must be created inside a Tokio runtime: construction
/// spawns the maintenance tasks.
pub struct CircuitBreaker<T: Transport> {
    transport: Arc<T>,
    linker: Arc<dyn Linker>,
    sessions: SessionTable<T::Conn>,
    config: BreakerConfig,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<T: Transport> CircuitBreaker<T> {
    /// Create a breaker and start its maintenance tasks.
    pub fn new(config: BreakerConfig, linker: Arc<dyn Linker>, transport: Arc<T>) -> Self {
        let sessions: SessionTable<T::Conn> = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        if config.enabled {
            tasks.push(spawn_rotation(
                Arc::clone(&sessions),
                config.rotation_interval,
                shutdown.subscribe(),
            ));
            tasks.push(spawn_evaluation(
                Arc::clone(&sessions),
                config.clone(),
                shutdown.subscribe(),
            ));
        }
        if let Some(offline) = linker.watch_offline() {
            tasks.push(spawn_offline_drain(
                Arc::clone(&sessions),
                offline,
                shutdown.subscribe(),
            ));
        }

        Self {
            transport,
            linker,
            sessions,
            config,
            shutdown,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        }
    }

    /// Select a session for `route`, honoring breaker state.
    ///
    /// Equivalent to [`CircuitBreaker::select_session_excluding`] with a
    /// fresh exclusion set.
    ///
    /// # Errors
    ///
    /// See [`CircuitBreaker::select_session_excluding`].
    pub async fn select_session(&self, route: &str) -> Result<Arc<Session<T::Conn>>> {
        let mut exclude = AddressSet::new();
        self.select_session_excluding(route, &mut exclude).await
    }

    /// Select a session for `route`, skipping the addresses in `exclude`.
    ///
    /// Examines at most `candidate_count(route)` distinct addresses: each
    /// address whose circuit refuses admission is added to `exclude` and
    /// selection is retried, so the loop terminates even when every backend
    /// is Open. The set belongs to one logical call - the client threads it
    /// through the failover attempts of a single pull/push so a backend
    /// that just failed is not retried - and is never shared across calls.
    /// A newly created session is trusted without an admission check on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFoundService`] when the route has no candidates
    /// or all of them are currently unavailable, or the transport's error
    /// when the lazy connect for a new address fails.
    pub async fn select_session_excluding(
        &self,
        route: &str,
        exclude: &mut AddressSet,
    ) -> Result<Arc<Session<T::Conn>>> {
        let candidates = self.linker.candidate_count(route);
        if candidates == 0 {
            return Err(Error::not_found_service(route));
        }

        for _ in 0..candidates {
            let address = self.linker.select(route, exclude)?;

            let existing = {
                let sessions = self.sessions.read();
                sessions.get(&address).cloned()
            };
            match existing {
                Some(session) => {
                    if self.admit(&session) {
                        return Ok(session);
                    }
                    debug!(route = %route, address = %address, "backend unavailable, excluded");
                    exclude.insert(address);
                }
                None => return self.create_session(address).await,
            }
        }
        Err(Error::not_found_service(route))
    }

    /// Report a call outcome for a session.
    ///
    /// `healthy` must be false only for connection-level failures; a
    /// backend that answered with an application error did its job.
    /// No-op when breaking is disabled.
    pub fn feedback(&self, session: &Session<T::Conn>, healthy: bool) {
        if !self.config.enabled {
            return;
        }
        session.feedback(healthy, self.config.break_duration);
    }

    /// Snapshot of every tracked address and its circuit status.
    pub fn states(&self) -> Vec<(Arc<str>, BreakerStatus)> {
        self.sessions
            .read()
            .iter()
            .map(|(address, session)| (Arc::clone(address), session.status()))
            .collect()
    }

    /// Number of cached sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Stop maintenance, close the linker and drop every session.
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(());
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.linker.close();
        self.sessions.write().clear();
        info!("circuit breaker closed");
    }

    fn admit(&self, session: &Session<T::Conn>) -> bool {
        if !self.config.enabled {
            return true;
        }
        session.admit()
    }

    async fn create_session(&self, address: Arc<str>) -> Result<Arc<Session<T::Conn>>> {
        let conn = self.transport.connect(&address).await?;
        let session = Arc::new(Session::new(
            Arc::clone(&address),
            conn,
            self.config.window_slots,
        ));
        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry(address)
            // Lost a creation race: keep the session that got there first.
            .or_insert_with(|| {
                debug!(address = %session.address(), "session created");
                Arc::clone(&session)
            });
        Ok(Arc::clone(entry))
    }
}

fn spawn_rotation<C: Send + Sync + 'static>(
    sessions: SessionTable<C>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tick.tick() => {
                    let snapshot: Vec<_> = sessions.read().values().cloned().collect();
                    for session in snapshot {
                        session.rotate();
                    }
                }
            }
        }
        debug!("window rotation task stopped");
    })
}

fn spawn_evaluation<C: Send + Sync + 'static>(
    sessions: SessionTable<C>,
    config: BreakerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.eval_interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tick.tick() => {
                    let snapshot: Vec<_> = sessions.read().values().cloned().collect();
                    for session in snapshot {
                        session.evaluate(config.error_percentage, config.break_duration);
                    }
                }
            }
        }
        debug!("failure evaluation task stopped");
    })
}

fn spawn_offline_drain<C: Send + Sync + 'static>(
    sessions: SessionTable<C>,
    mut offline: tokio::sync::mpsc::Receiver<Arc<str>>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                notification = offline.recv() => match notification {
                    Some(address) => {
                        if sessions.write().remove(&address).is_some() {
                            info!(address = %address, "backend offline, session discarded");
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("offline drain task stopped");
    })
}
