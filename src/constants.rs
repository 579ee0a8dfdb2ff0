//! Centralized constants for resilience defaults.
//!
//! All magic numbers in the crate should be defined here with
//! documented rationale. This enables:
//! - Tuning in one place
//! - Consistent defaults across modules
//! - Easy auditing without code search

// =============================================================================
// Circuit Breaker Defaults
// =============================================================================

/// Failure percentage over the rolling window above which a circuit opens.
/// Rationale: at 50% more calls are failing than succeeding - the backend is
/// doing more harm than good.
pub const DEFAULT_ERROR_PERCENTAGE: u8 = 50;

/// How long an opened circuit blocks calls before probing recovery (5s).
/// Rationale: long enough for transient faults to clear, short enough that a
/// recovered backend rejoins rotation quickly.
pub const DEFAULT_BREAK_DURATION_MS: u64 = 5_000;

/// Number of slots in the rolling success/failure window.
/// One slot is cleared and reused on every rotation, so the window spans
/// `DEFAULT_WINDOW_SLOTS * DEFAULT_ROTATION_INTERVAL_MS` of history.
pub const DEFAULT_WINDOW_SLOTS: usize = 10;

/// Interval between window rotations (1s - one slot per second).
pub const DEFAULT_ROTATION_INTERVAL_MS: u64 = 1_000;

/// Interval between failure-rate evaluations (10s).
/// Rationale: evaluating once per full window avoids opening circuits on a
/// partial sample.
pub const DEFAULT_EVAL_INTERVAL_MS: u64 = 10_000;

// =============================================================================
// Client Defaults
// =============================================================================

/// Extra attempts against alternate backends after a connection failure.
/// Zero means a single attempt with no failover.
pub const DEFAULT_FAILOVER_COUNT: usize = 0;

// =============================================================================
// Registry Defaults
// =============================================================================

/// Key namespace under which backend registrations live.
/// A registration key is `<namespace><address>` with a JSON value listing the
/// routes the address serves.
pub const DEFAULT_NAMESPACE: &str = "/tether/srv/";

/// Buffer size of the offline-notification channel.
/// Notifications are dropped (never block the watch loop) once the buffer
/// is full.
pub const DEFAULT_OFFLINE_BUFFER: usize = 64;

/// Buffer size of a registry watch event stream.
pub const WATCH_BUFFER: usize = 256;
