//! Per-address session: connection handle plus breaker state.
//!
//! A [`Session`] is created lazily on the first selection of an address,
//! cached in the breaker's session table, and discarded only when the
//! linker reports the address offline. It pairs the transport's connection
//! handle with the address's breaker state behind one per-address lock, so
//! admission checks, feedback, window rotation and evaluation never race
//! for the same backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::breaker::state::{BreakerState, BreakerStatus, Transition};

/// A cached connection to one backend address, with its circuit state.
///
/// `C` is the transport's connection handle type.
#[derive(Debug)]
pub struct Session<C> {
    address: Arc<str>,
    conn: C,
    state: Mutex<BreakerState>,
}

impl<C> Session<C> {
    pub(crate) fn new(address: Arc<str>, conn: C, window_slots: usize) -> Self {
        Self {
            address,
            conn,
            state: Mutex::new(BreakerState::new(window_slots)),
        }
    }

    /// The backend address this session is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Shared handle to the address, for exclusion-set bookkeeping.
    pub(crate) fn address_shared(&self) -> Arc<str> {
        Arc::clone(&self.address)
    }

    /// The transport connection handle for this session.
    pub const fn conn(&self) -> &C {
        &self.conn
    }

    /// Current circuit status of this backend.
    pub fn status(&self) -> BreakerStatus {
        self.state.lock().status()
    }

    /// `(successes, failures)` currently held in the rolling window.
    pub fn window_totals(&self) -> (u64, u64) {
        self.state.lock().window_totals()
    }

    /// Admission check; see [`BreakerState::admit`].
    pub(crate) fn admit(&self) -> bool {
        let mut state = self.state.lock();
        let was = state.status();
        let admitted = state.admit(Instant::now());
        if was == BreakerStatus::Open && state.status() == BreakerStatus::HalfOpen {
            info!(address = %self.address, "break duration elapsed, probing backend");
        }
        admitted
    }

    /// Outcome feedback; see [`BreakerState::feedback`].
    pub(crate) fn feedback(&self, healthy: bool, break_duration: Duration) {
        let transition = self
            .state
            .lock()
            .feedback(healthy, break_duration, Instant::now());
        match transition {
            Some(Transition::ProbeClosed) => {
                info!(address = %self.address, "probe succeeded, circuit closed");
            }
            Some(Transition::ProbeReopened) => {
                warn!(address = %self.address, "probe failed, circuit reopened");
            }
            None => {}
        }
    }

    /// Advance the rolling window by one slot.
    pub(crate) fn rotate(&self) {
        self.state.lock().rotate();
    }

    /// Evaluate the windowed failure rate, opening the circuit if it is
    /// past the threshold.
    pub(crate) fn evaluate(&self, error_percentage: u8, break_duration: Duration) {
        let opened = self
            .state
            .lock()
            .evaluate(error_percentage, break_duration, Instant::now());
        if opened {
            warn!(
                address = %self.address,
                threshold = error_percentage,
                "failure rate over threshold, circuit opened"
            );
        }
    }
}
