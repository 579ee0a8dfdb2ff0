//! Configuration types for the client and the registry linker.
//!
//! This module provides configuration structs for:
//! - Client behavior ([`ClientConfig`]) - breaker thresholds, failover budget
//! - Registry discovery ([`RegistryConfig`]) - key namespace, buffering
//!
//! All configuration types support serde deserialization so a host
//! application can embed them in its own configuration file, and provide
//! sensible defaults suitable for development use. File loading, CLI flags
//! and environment variables belong to the host, not to this crate.
//!
//! Durations are carried as integer millisecond fields and converted through
//! accessor methods.

use std::time::Duration;

use serde::Deserialize;

use crate::breaker::BreakerConfig;
use crate::constants;
use crate::error::{Error, Result};

/// Client configuration: circuit breaking and failover.
///
/// # Example
///
/// ```
/// use tether::ClientConfig;
///
/// let config = ClientConfig {
///     failover_count: 2,
///     ..ClientConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whether circuit breaking is enabled. When false the breaker degrades
    /// to a pass-through: every backend is always admitted.
    pub circuit_breaker: bool,
    /// Failure percentage (1-100) over the rolling window above which an
    /// address's circuit opens.
    pub error_percentage: u8,
    /// How long an opened circuit blocks calls before probing recovery.
    pub break_duration_ms: u64,
    /// Extra attempts against alternate backends after a connection failure.
    /// The total attempt budget is `failover_count + 1`.
    pub failover_count: usize,
    /// Number of slots in the rolling success/failure window.
    pub window_slots: usize,
    /// Interval between window rotations. One slot of history is cleared per
    /// rotation, so the window spans `window_slots * rotation_interval_ms`.
    pub rotation_interval_ms: u64,
    /// Interval between failure-rate evaluations.
    pub eval_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: true,
            error_percentage: constants::DEFAULT_ERROR_PERCENTAGE,
            break_duration_ms: constants::DEFAULT_BREAK_DURATION_MS,
            failover_count: constants::DEFAULT_FAILOVER_COUNT,
            window_slots: constants::DEFAULT_WINDOW_SLOTS,
            rotation_interval_ms: constants::DEFAULT_ROTATION_INTERVAL_MS,
            eval_interval_ms: constants::DEFAULT_EVAL_INTERVAL_MS,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field if any value is
    /// out of range.
    pub fn validate(&self) -> Result<()> {
        if self.error_percentage == 0 || self.error_percentage > 100 {
            return Err(Error::Config(format!(
                "error_percentage must be in 1..=100, got {}",
                self.error_percentage
            )));
        }
        if self.break_duration_ms == 0 {
            return Err(Error::Config(
                "break_duration_ms must be at least 1".to_string(),
            ));
        }
        if self.window_slots == 0 {
            return Err(Error::Config("window_slots must be at least 1".to_string()));
        }
        if self.rotation_interval_ms == 0 {
            return Err(Error::Config(
                "rotation_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.eval_interval_ms == 0 {
            return Err(Error::Config(
                "eval_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration an opened circuit blocks calls.
    pub const fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }

    /// The breaker-facing view of this configuration.
    pub(crate) fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            enabled: self.circuit_breaker,
            error_percentage: self.error_percentage,
            break_duration: self.break_duration(),
            window_slots: self.window_slots,
            rotation_interval: Duration::from_millis(self.rotation_interval_ms),
            eval_interval: Duration::from_millis(self.eval_interval_ms),
        }
    }
}

/// Registry linker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Key namespace under which backend registrations live. A registration
    /// key is `<namespace><address>`.
    pub namespace: String,
    /// Buffer size of the offline-notification channel. Notifications are
    /// dropped rather than blocking the watch loop once the buffer is full.
    pub offline_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: constants::DEFAULT_NAMESPACE.to_string(),
            offline_buffer: constants::DEFAULT_OFFLINE_BUFFER,
        }
    }
}

impl RegistryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the namespace is empty or the offline
    /// buffer has no capacity.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace cannot be empty".to_string()));
        }
        if self.offline_buffer == 0 {
            return Err(Error::Config(
                "offline_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
