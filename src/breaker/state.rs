//! Per-address breaker state machine.
//!
//! Defines the three states a backend's circuit can be in:
//! - **Closed**: normal operation, calls admitted, outcomes recorded
//! - **Open**: calls blocked until the reopen deadline passes
//! - **HalfOpen**: testing recovery - only ONE probe call allowed
//!
//! The Open -> HalfOpen transition is driven by a per-address reopen
//! deadline stored in the state and checked at admission time, re-armed in
//! place whenever the circuit (re)opens so deadlines never stack.

use std::fmt;
use std::time::{Duration, Instant};

use super::window::RollingWindow;

/// Publicly observable status of a backend's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Calls admitted; outcomes recorded in the rolling window.
    Closed,
    /// Calls blocked; the backend sits out its break duration.
    Open,
    /// Recovery probe in progress; one trial call at a time.
    HalfOpen,
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        write!(f, "{s}")
    }
}

/// State-machine transition produced by feedback, for logging by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Probe succeeded; circuit closed with a fresh window.
    ProbeClosed,
    /// Probe failed; circuit reopened with a re-armed deadline.
    ProbeReopened,
}

/// Breaker state for a single backend address.
///
/// Not internally synchronized; the owning session wraps it in a lock so
/// that admission, feedback, rotation and evaluation are linearized per
/// address.
#[derive(Debug)]
pub(crate) struct BreakerState {
    status: BreakerStatus,
    window: RollingWindow,
    /// True while exactly one trial call is outstanding during HalfOpen.
    probing: bool,
    /// When an Open circuit becomes eligible for a recovery probe.
    reopen_at: Option<Instant>,
}

impl BreakerState {
    pub(crate) fn new(window_slots: usize) -> Self {
        Self {
            status: BreakerStatus::Closed,
            window: RollingWindow::new(window_slots),
            probing: false,
            reopen_at: None,
        }
    }

    pub(crate) const fn status(&self) -> BreakerStatus {
        self.status
    }

    pub(crate) fn window_totals(&self) -> (u64, u64) {
        self.window.totals()
    }

    /// Decide whether a call may go to this backend right now.
    ///
    /// An Open circuit whose deadline has passed flips to HalfOpen here and
    /// admits the caller as the single probe. While a probe is in flight
    /// every other admission is refused.
    pub(crate) fn admit(&mut self, now: Instant) -> bool {
        match self.status {
            BreakerStatus::Closed => true,
            BreakerStatus::Open => match self.reopen_at {
                Some(deadline) if now >= deadline => {
                    self.status = BreakerStatus::HalfOpen;
                    self.reopen_at = None;
                    self.probing = true;
                    true
                }
                _ => false,
            },
            BreakerStatus::HalfOpen => {
                if self.probing {
                    false
                } else {
                    self.probing = true;
                    true
                }
            }
        }
    }

    /// Record a call outcome.
    ///
    /// Closed: counts into the current window slot. HalfOpen: resolves the
    /// probe - success closes the circuit with a reset window, failure
    /// reopens it and re-arms the deadline (replacing any previous one).
    /// Open: nothing to update.
    pub(crate) fn feedback(
        &mut self,
        healthy: bool,
        break_duration: Duration,
        now: Instant,
    ) -> Option<Transition> {
        match self.status {
            BreakerStatus::Closed => {
                self.window.record(healthy);
                None
            }
            BreakerStatus::Open => None,
            BreakerStatus::HalfOpen => {
                self.probing = false;
                if healthy {
                    self.status = BreakerStatus::Closed;
                    self.window.reset();
                    Some(Transition::ProbeClosed)
                } else {
                    self.status = BreakerStatus::Open;
                    self.reopen_at = Some(now + break_duration);
                    Some(Transition::ProbeReopened)
                }
            }
        }
    }

    /// Advance the rolling window by one slot.
    pub(crate) fn rotate(&mut self) {
        self.window.rotate();
    }

    /// Evaluate the failure rate of a Closed circuit.
    ///
    /// Opens the circuit (resetting the window and arming the reopen
    /// deadline) when the windowed failure rate strictly exceeds
    /// `error_percentage`; otherwise rotates the window one extra slot.
    /// Returns true when the circuit opened. Non-Closed circuits are left
    /// untouched.
    pub(crate) fn evaluate(
        &mut self,
        error_percentage: u8,
        break_duration: Duration,
        now: Instant,
    ) -> bool {
        if self.status != BreakerStatus::Closed {
            return false;
        }
        if self.window.exceeds_failure_rate(error_percentage) {
            self.status = BreakerStatus::Open;
            self.window.reset();
            self.reopen_at = Some(now + break_duration);
            true
        } else {
            self.window.rotate();
            false
        }
    }
}
