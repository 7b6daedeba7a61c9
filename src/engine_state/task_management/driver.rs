//! Fixed-rate tick driver.
//!
//! The scheduler owns no timer. `TickDriver` is the external clock that turns frame time
//! into a number of `tick()` calls at a configured rate, so the host can drive the
//! scheduler either once per frame or at a steady rate independent of frame rate.

use web_time::Duration;

/// Upper bound on ticks emitted for a single `advance` call, so a long stall (a debugger
/// pause, a backgrounded tab) does not turn into a burst of hundreds of tasks.
const MAX_TICKS_PER_ADVANCE: usize = 8;

/// Accumulates elapsed time and reports how many ticks are due.
#[derive(Debug, Clone)]
pub struct TickDriver {
    interval: Duration,
    accumulated: Duration,
}

impl TickDriver {
    /// Creates a driver emitting `rate` ticks per second. A non-positive or non-finite rate
    /// falls back to one tick per call.
    pub fn new(rate: f64) -> Self {
        let interval = if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        TickDriver {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    /// Time between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Adds `elapsed` to the accumulator and returns the number of ticks now due.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        if self.interval.is_zero() {
            return 1;
        }

        self.accumulated += elapsed;
        let mut due = 0;
        while self.accumulated >= self.interval && due < MAX_TICKS_PER_ADVANCE {
            self.accumulated -= self.interval;
            due += 1;
        }
        if due == MAX_TICKS_PER_ADVANCE && self.accumulated >= self.interval {
            self.accumulated = Duration::ZERO;
        }
        due
    }
}
