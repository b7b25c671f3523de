//! Drift-corrected tick cadence.
//!
//! Timer firings slip: a sleep asked to last one second lands a few
//! milliseconds late, and naive rescheduling accumulates that slip without
//! bound. `TickCadence` measures how far each firing landed from its expected
//! boundary and folds the error into the next delay, so ticks stay aligned to
//! true one-second boundaries using nothing but wall-clock reads.

/// Pure half of the tick driver. The runtime sleeps for whatever delay each
/// firing returns.
#[derive(Debug, Clone)]
pub struct TickCadence {
    period_ms: i64,
    expected_next_ms: Option<i64>,
}

impl TickCadence {
    pub fn new(period_ms: i64) -> Self {
        Self {
            period_ms,
            expected_next_ms: None,
        }
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Record a firing at `now_ms` and return the delay until the next tick.
    ///
    /// The first call simply schedules one full period out. Afterwards the
    /// delay is `period - drift`, where drift is how late (or early) this
    /// firing landed relative to the previous expectation; a firing so late
    /// that the next boundary already passed yields a zero delay.
    pub fn next_delay_ms(&mut self, now_ms: i64) -> i64 {
        let drift = match self.expected_next_ms {
            Some(expected) => now_ms - expected,
            None => 0,
        };
        let delay = (self.period_ms - drift).max(0);
        self.expected_next_ms = Some(now_ms + delay);
        delay
    }
}
