//! Run statistics shared across worker threads
//!
//! All counters are atomics so workers can record work without locking;
//! the error message list is behind a mutex and only touched on failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Statistics for one sync or watch run.
///
/// Mutated concurrently by all workers of a task, read once at the end of
/// the run (or on abort) for the summary report.
#[derive(Debug, Default)]
pub struct SyncStats {
    dirs_scanned: AtomicU64,
    files_scanned: AtomicU64,
    files_copied: AtomicU64,
    bytes_copied: AtomicU64,
    copy_nanos: AtomicU64,
    entries_deleted: AtomicU64,
    bytes_deleted: AtomicU64,
    delete_nanos: AtomicU64,
    errors: Mutex<Vec<String>>,
}

impl SyncStats {
    /// Create a zeroed statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one scanned directory
    pub fn record_dir_scanned(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one scanned source file or symlink
    pub fn record_file_scanned(&self) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed (or dry-run) copy of `bytes` taking `elapsed`
    pub fn record_copy(&self, bytes: u64, elapsed: Duration) {
        self.files_copied.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
        self.copy_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a completed (or dry-run) deletion of `bytes` taking `elapsed`
    pub fn record_delete(&self, bytes: u64, elapsed: Duration) {
        self.entries_deleted.fetch_add(1, Ordering::Relaxed);
        self.bytes_deleted.fetch_add(bytes, Ordering::Relaxed);
        self.delete_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record an error message for the end-of-run report
    pub fn record_error(&self, message: impl Into<String>) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message.into());
        }
    }

    /// Take a consistent snapshot of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_copied: self.files_copied.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            copy_duration: Duration::from_nanos(self.copy_nanos.load(Ordering::Relaxed)),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            bytes_deleted: self.bytes_deleted.load(Ordering::Relaxed),
            delete_duration: Duration::from_nanos(self.delete_nanos.load(Ordering::Relaxed)),
            errors: self
                .errors
                .lock()
                .map(|e| e.clone())
                .unwrap_or_default(),
        }
    }
}

/// Plain-data snapshot of [`SyncStats`] for reporting
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Number of directories scanned
    pub dirs_scanned: u64,
    /// Number of source files and symlinks examined
    pub files_scanned: u64,
    /// Number of files copied
    pub files_copied: u64,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Wall time spent copying, summed across workers
    pub copy_duration: Duration,
    /// Number of target entries deleted
    pub entries_deleted: u64,
    /// Total bytes deleted
    pub bytes_deleted: u64,
    /// Wall time spent deleting, summed across workers
    pub delete_duration: Duration,
    /// Collected error messages
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = SyncStats::new();
        stats.record_dir_scanned();
        stats.record_file_scanned();
        stats.record_copy(100, Duration::from_millis(5));
        stats.record_copy(50, Duration::from_millis(5));
        stats.record_delete(10, Duration::from_millis(1));
        stats.record_error("something failed");

        let snap = stats.snapshot();
        assert_eq!(snap.dirs_scanned, 1);
        assert_eq!(snap.files_scanned, 1);
        assert_eq!(snap.files_copied, 2);
        assert_eq!(snap.bytes_copied, 150);
        assert_eq!(snap.entries_deleted, 1);
        assert_eq!(snap.bytes_deleted, 10);
        assert_eq!(snap.errors.len(), 1);
    }
}
