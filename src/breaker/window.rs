//! Rolling success/failure window.
//!
//! A fixed-length circular buffer of per-interval counters. Feedback lands
//! in the slot under the cursor; a rotation advances the cursor and clears
//! the slot it lands on (that slot held the oldest interval). The failure
//! rate is always computed over the totals of the whole window, never a
//! single slot.

/// One interval's worth of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot {
    success: u64,
    failure: u64,
}

/// Fixed-length circular window of success/failure counts.
#[derive(Debug)]
pub(crate) struct RollingWindow {
    slots: Box<[Slot]>,
    cursor: usize,
}

impl RollingWindow {
    /// Create a window with `len` slots (at least 1).
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: vec![Slot::default(); len.max(1)].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Record one outcome in the current slot.
    pub(crate) fn record(&mut self, healthy: bool) {
        let slot = &mut self.slots[self.cursor];
        if healthy {
            slot.success = slot.success.saturating_add(1);
        } else {
            slot.failure = slot.failure.saturating_add(1);
        }
    }

    /// Advance the cursor and clear the slot it lands on.
    pub(crate) fn rotate(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.slots[self.cursor] = Slot::default();
    }

    /// Clear every slot and rewind the cursor.
    pub(crate) fn reset(&mut self) {
        self.slots.fill(Slot::default());
        self.cursor = 0;
    }

    /// Sum of `(successes, failures)` across the whole window.
    pub(crate) fn totals(&self) -> (u64, u64) {
        self.slots.iter().fold((0, 0), |(s, f), slot| {
            (s + slot.success, f + slot.failure)
        })
    }

    /// Whether the window failure rate strictly exceeds `percentage`.
    ///
    /// A window with zero failures never exceeds any threshold, regardless
    /// of success volume.
    pub(crate) fn exceeds_failure_rate(&self, percentage: u8) -> bool {
        let (successes, failures) = self.totals();
        failures > 0 && failures * 100 > u64::from(percentage) * (successes + failures)
    }
}
