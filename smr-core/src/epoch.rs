//! The epoch clock.
//!
//! A single monotone counter shared by every participant of an engine.
//! Allocations are stamped with the value the clock had when they were
//! made, retirements with the value it had when the node was unlinked.
//! The clock only ever moves forward; at 64 bits, overflow is ignored.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_utils::CachePadded;

/// A monotone scalar timestamp.
pub type Epoch = u64;

/// The value a thread announces while it is not inside an operation.
///
/// Doubles as "plus infinity" in minimum scans: an engine that sees only
/// idle threads is free to reclaim everything it holds.
pub const IDLE: Epoch = u64::MAX;

/// A process-wide monotone counter.
///
/// The clock is advanced either opportunistically (the interval-based
/// engine ticks it every few retirements) or by a background [`Ticker`].
pub struct EpochClock {
    epoch: CachePadded<AtomicU64>,
}

impl EpochClock {
    /// Creates a clock starting at epoch zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a clock starting at an arbitrary epoch.
    ///
    /// Useful for exercising behavior near the top of the epoch range.
    pub fn starting_at(epoch: Epoch) -> Self {
        EpochClock {
            epoch: CachePadded::new(AtomicU64::new(epoch)),
        }
    }

    /// Returns the current epoch.
    #[inline]
    pub fn now(&self) -> Epoch {
        self.epoch.load(Ordering::Acquire)
    }

    /// Advances the clock by one, returning the epoch it moved past.
    #[inline]
    pub fn tick(&self) -> Epoch {
        self.epoch.fetch_add(1, Ordering::Release)
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EpochClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochClock")
            .field("epoch", &self.now())
            .finish()
    }
}

/// Advances a clock on a coarse interval from a background thread.
///
/// The thread runs until the `Ticker` is dropped; dropping stops it and
/// joins it, so a ticker never outlives the clock it was spawned for.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    /// Spawns a thread that ticks `clock` every `interval`.
    pub fn spawn(clock: Arc<EpochClock>, interval: Duration) -> Ticker {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("smr-epoch-ticker".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::park_timeout(interval);
                    clock.tick();
                }
            })
            .expect("failed to spawn the epoch ticker thread");
        Ticker {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Ticker { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotone() {
        let clock = EpochClock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.now(), 2);
    }

    #[test]
    fn starts_anywhere() {
        let clock = EpochClock::starting_at(u64::MAX - 8);
        assert_eq!(clock.now(), u64::MAX - 8);
        clock.tick();
        assert_eq!(clock.now(), u64::MAX - 7);
    }

    #[test]
    fn ticker_advances_in_the_background() {
        let clock = Arc::new(EpochClock::new());
        let before = clock.now();
        {
            let _ticker = Ticker::spawn(Arc::clone(&clock), Duration::from_millis(1));
            while clock.now() == before {
                thread::yield_now();
            }
        }
        assert!(clock.now() > before);
    }
}
