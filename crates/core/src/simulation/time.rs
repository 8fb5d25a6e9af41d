//! Monotonic clocks read by the controller.
//!
//! The controller needs the current time for epoch boundaries, decrease
//! cool-downs and timeout purges. [`RealTime`] reads `Instant`; [`VirtualTime`]
//! is a shared counter moved by hand, so tests and the link simulator decide
//! exactly when every epoch ends.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Abstraction over a monotonic clock supporting both real and virtual time.
///
/// The controller never sleeps or schedules timers; it only reads the clock
/// when the sender loop calls into it. Implementations therefore only need to
/// answer "what time is it now".
pub trait TimeSource: Send + Sync + Clone + 'static {
    /// Nanoseconds since the clock's epoch.
    fn now_nanos(&self) -> u64;

    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }

    /// Returns the current time in whole milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64 {
        self.now_nanos() / NANOS_PER_MILLI
    }
}

/// Wall-clock implementation. The epoch is the moment of construction.
#[derive(Clone)]
pub struct RealTime {
    epoch: std::time::Instant,
}

impl Default for RealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl TimeSource for RealTime {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock.
///
/// Only [`advance`](Self::advance), [`advance_ms`](Self::advance_ms) and
/// [`advance_to`](Self::advance_to) move it.
/// Clones share the same clock, so a test can hand one clone to the controller
/// and keep another to drive time forward.
#[derive(Clone, Debug)]
pub struct VirtualTime {
    current_nanos: Arc<AtomicU64>,
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTime {
    pub fn new() -> Self {
        Self::with_initial_time(0)
    }

    /// Clock starting at `initial_nanos`.
    pub fn with_initial_time(initial_nanos: u64) -> Self {
        Self {
            current_nanos: Arc::new(AtomicU64::new(initial_nanos)),
        }
    }

    /// Advances time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let delta = duration.as_nanos().min(u64::MAX as u128) as u64;
        self.current_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(delta))
            })
            .ok();
    }

    /// Advances time by the given number of milliseconds.
    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Advances time to the given absolute nanoseconds.
    ///
    /// Time never goes backwards: a target in the past is ignored.
    pub fn advance_to(&self, target_nanos: u64) {
        self.current_nanos.fetch_max(target_nanos, Ordering::SeqCst);
    }
}

impl TimeSource for VirtualTime {
    fn now_nanos(&self) -> u64 {
        self.current_nanos.load(Ordering::SeqCst)
    }
}
