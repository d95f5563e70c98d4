use std::time::{Duration, Instant};

/// Batch timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct BatchTime {
    /// Time since the previous batch completed (or since the clock started).
    pub dt: Duration,

    /// Time since the clock started.
    pub elapsed: Duration,

    /// Monotonic batch counter, starting at 0.
    pub batch_index: u64,
}

impl BatchTime {
    /// Average rate of `work` units per second over `elapsed`.
    ///
    /// Returns 0 before any measurable time has passed.
    pub fn rate(&self, work: u64) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (work as f64 / secs).round() as u64
    }
}

/// Clock producing `BatchTime` snapshots.
///
/// Unlike a frame clock, deltas are not clamped: a stalled batch is exactly the
/// thing throughput lines should show.
#[derive(Debug, Clone)]
pub struct BatchClock {
    start: Instant,
    last: Instant,
    batch_index: u64,
}

impl BatchClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            batch_index: 0,
        }
    }

    /// Advances the clock and returns a new `BatchTime`.
    pub fn tick(&mut self) -> BatchTime {
        let now = Instant::now();

        let bt = BatchTime {
            dt: now.saturating_duration_since(self.last),
            elapsed: now.saturating_duration_since(self.start),
            batch_index: self.batch_index,
        };

        self.last = now;
        self.batch_index = self.batch_index.wrapping_add(1);

        bt
    }
}

impl Default for BatchClock {
    fn default() -> Self {
        Self::new()
    }
}
