//! Circuit breaker configuration.
//!
//! The runtime (Duration-typed) view of the breaker knobs. Host-facing
//! configuration lives in [`crate::config::ClientConfig`], which converts
//! into this struct.

use std::time::Duration;

use crate::constants;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Whether breaking is enabled at all. When false, admission always
    /// succeeds, feedback is discarded and no maintenance runs.
    pub enabled: bool,
    /// Failure percentage (1-100) over the rolling window above which a
    /// circuit opens.
    pub error_percentage: u8,
    /// How long an opened circuit blocks calls before probing recovery.
    pub break_duration: Duration,
    /// Number of slots in the rolling window.
    pub window_slots: usize,
    /// Interval between window rotations.
    pub rotation_interval: Duration,
    /// Interval between failure-rate evaluations.
    pub eval_interval: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_percentage: constants::DEFAULT_ERROR_PERCENTAGE,
            break_duration: Duration::from_millis(constants::DEFAULT_BREAK_DURATION_MS),
            window_slots: constants::DEFAULT_WINDOW_SLOTS,
            rotation_interval: Duration::from_millis(constants::DEFAULT_ROTATION_INTERVAL_MS),
            eval_interval: Duration::from_millis(constants::DEFAULT_EVAL_INTERVAL_MS),
        }
    }
}
