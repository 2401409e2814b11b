//! Time sources
//!
//! Animations measure the wall-clock time between their ticks. The clock is
//! injectable so tests can drive time by hand with [`ManualClock`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source
pub trait Clock: Send + Sync {
    /// Time since an arbitrary, fixed epoch
    fn now(&self) -> Duration;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Real time, backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Hand-driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Measures time between successive reads
pub struct Stopwatch {
    clock: SharedClock,
    last: Mutex<Duration>,
}

impl Stopwatch {
    /// Start measuring from now
    pub fn start(clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            clock,
            last: Mutex::new(now),
        }
    }

    /// Time since the last restart
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(*self.last.lock())
    }

    /// Read the elapsed time and restart in one step
    pub fn restart_get(&self) -> Duration {
        let now = self.clock.now();
        let mut last = self.last.lock();
        let elapsed = now.saturating_sub(*last);
        *last = now;
        elapsed
    }
}

impl std::fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stopwatch")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance_ms(16);
        clock.advance(Duration::from_micros(500));
        assert_eq!(clock.now(), Duration::from_micros(16_500));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_stopwatch_restart_get() {
        let clock = ManualClock::new();
        let watch = Stopwatch::start(clock.clone());

        clock.advance_ms(30);
        assert_eq!(watch.elapsed(), Duration::from_millis(30));
        assert_eq!(watch.restart_get(), Duration::from_millis(30));
        assert_eq!(watch.elapsed(), Duration::ZERO);

        clock.advance_ms(10);
        assert_eq!(watch.restart_get(), Duration::from_millis(10));
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
