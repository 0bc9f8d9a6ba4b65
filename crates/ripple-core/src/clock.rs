#![forbid(unsafe_code)]

//! Time sources consumed by [`Stream::zip_with_time`](crate::Stream::zip_with_time).
//!
//! In production, [`SystemClock`] reads `web_time::Instant::now()`.
//! In tests, [`ManualClock`] only moves when advanced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

use crate::event::Item;

/// A source of timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Timestamp type produced by this clock.
    type Time: Item;

    /// Current time.
    fn now(&self) -> Self::Time;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Time = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually-advanceable clock for deterministic tests.
///
/// All clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    type Time = Instant;

    fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }
}
