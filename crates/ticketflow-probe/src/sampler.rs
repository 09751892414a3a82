//! Throughput sampler.
//!
//! Turns the pools' cumulative finished-operation counter into an
//! operations-per-second rate over the span since the previous successful
//! sample. The sampler only moves forward when `sample` is called, so a
//! cycle that never reaches it leaves the next sample spanning both
//! intervals.

use std::time::Duration;

use tokio::time::Instant;

/// Counter reading and timestamp of the last successful sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSampler {
    previous_finished: u64,
    previous_at: Instant,
}

/// One throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Completed operations per second. Never negative.
    pub ops_per_sec: f64,
    /// Operations completed during the span.
    pub delta: u64,
    /// Span the rate was computed over.
    pub elapsed: Duration,
    /// The counter went backwards since the previous sample.
    pub regressed: bool,
}

impl ThroughputSampler {
    pub fn new(finished: u64, at: Instant) -> Self {
        Self {
            previous_finished: finished,
            previous_at: at,
        }
    }

    pub fn previous_finished(&self) -> u64 {
        self.previous_finished
    }

    pub fn previous_at(&self) -> Instant {
        self.previous_at
    }

    /// Record a counter reading taken at `now`.
    ///
    /// A counter that went backwards contributes a zero delta and becomes
    /// the new reference point. `interval` stands in for the span when the
    /// clock has not moved.
    pub fn sample(&mut self, finished: u64, now: Instant, interval: Duration) -> ThroughputSample {
        let regressed = finished < self.previous_finished;
        let delta = finished.saturating_sub(self.previous_finished);

        let mut elapsed = now.saturating_duration_since(self.previous_at);
        if elapsed.is_zero() {
            elapsed = interval;
        }

        self.previous_finished = finished;
        self.previous_at = now;

        ThroughputSample {
            ops_per_sec: delta as f64 / elapsed.as_secs_f64(),
            delta,
            elapsed,
            regressed,
        }
    }
}
