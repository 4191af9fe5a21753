//! Stall detection via a shared last-activity timestamp
//!
//! Workers call [`ProgressTracker::mark`] on every unit of meaningful
//! work; the pool lifecycle polls [`ProgressTracker::check_stalled`] to
//! distinguish a hung worker from a merely slow one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use velosync_types::{Error, Result};

/// Single "last activity" timestamp shared across a task's workers
#[derive(Debug)]
pub struct ProgressTracker {
    start: Instant,
    last_activity_ms: AtomicU64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a tracker; creation itself counts as activity
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    /// Record one unit of meaningful work
    pub fn mark(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Milliseconds since the last recorded activity
    pub fn idle_time(&self) -> Duration {
        let now = self.start.elapsed().as_millis() as u64;
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Fail with [`Error::Stalled`] when no progress was recorded within
    /// `timeout`. A zero timeout disables the check.
    pub fn check_stalled(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Ok(());
        }
        if self.idle_time() > timeout {
            return Err(Error::Stalled { timeout });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn zero_timeout_disables_detection() {
        let tracker = ProgressTracker::new();
        thread::sleep(Duration::from_millis(30));
        assert!(tracker.check_stalled(Duration::ZERO).is_ok());
    }

    #[test]
    fn silence_beyond_timeout_is_a_stall() {
        let tracker = ProgressTracker::new();
        thread::sleep(Duration::from_millis(250));
        assert!(matches!(
            tracker.check_stalled(Duration::from_millis(200)),
            Err(Error::Stalled { .. })
        ));
    }

    #[test]
    fn regular_heartbeats_never_false_positive() {
        let tracker = ProgressTracker::new();
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
            tracker.mark();
            assert!(tracker.check_stalled(Duration::from_millis(200)).is_ok());
        }
    }
}
