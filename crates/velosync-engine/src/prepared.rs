//! Cache of target directories already materialized
//!
//! Used only in filtered mode to avoid redundant mkdir calls across
//! workers. Membership is an optimization hint, never a guarantee:
//! directories can disappear after being marked prepared (deletion pass,
//! external actors), so a cache hit must be revalidated against the live
//! filesystem before being trusted. The revalidation outcome is an
//! explicit tagged result to keep the race window auditable.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::fsops;

/// Outcome of revalidating a cache hit against the live filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedState {
    /// The target is still a directory (or directory symlink); trust it.
    Fresh,
    /// The cached entry went stale; evict and recreate the directory.
    StaleNeedsRebuild,
}

/// Per-task set of target-absolute directories known to be materialized
#[derive(Debug, Default)]
pub struct PreparedDirs {
    dirs: Mutex<HashSet<PathBuf>>,
}

impl PreparedDirs {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `abs` has been marked prepared before
    pub fn contains(&self, abs: &Path) -> bool {
        self.dirs.lock().unwrap().contains(abs)
    }

    /// Mark `abs` as materialized
    pub fn insert(&self, abs: &Path) {
        self.dirs.lock().unwrap().insert(abs.to_path_buf());
    }

    /// Drop a stale entry
    pub fn evict(&self, abs: &Path) {
        self.dirs.lock().unwrap().remove(abs);
    }

    /// Drop every entry at or below `abs`. Called when a directory-like
    /// target entry is deleted, forcing re-materialization on subsequent
    /// use.
    pub fn invalidate_below(&self, abs: &Path) {
        self.dirs
            .lock()
            .unwrap()
            .retain(|p| !p.starts_with(abs));
    }

    /// Revalidate a cache hit against the live filesystem.
    pub fn revalidate(&self, abs: &Path) -> PreparedState {
        match fsops::read_meta_opt(abs) {
            Ok(Some(meta)) if meta.kind.is_dir_like() => PreparedState::Fresh,
            _ => {
                self.evict(abs);
                PreparedState::StaleNeedsRebuild
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn revalidation_detects_vanished_directories() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let cache = PreparedDirs::new();
        cache.insert(&sub);
        assert_eq!(cache.revalidate(&sub), PreparedState::Fresh);

        std::fs::remove_dir(&sub).unwrap();
        assert_eq!(cache.revalidate(&sub), PreparedState::StaleNeedsRebuild);
        // The stale entry was evicted.
        assert!(!cache.contains(&sub));
    }

    #[test]
    fn invalidate_below_is_prefix_exhaustive() {
        let cache = PreparedDirs::new();
        cache.insert(Path::new("/t/a"));
        cache.insert(Path::new("/t/a/b"));
        cache.insert(Path::new("/t/ax"));

        cache.invalidate_below(Path::new("/t/a"));
        assert!(!cache.contains(Path::new("/t/a")));
        assert!(!cache.contains(Path::new("/t/a/b")));
        // Sibling with a shared name prefix is untouched.
        assert!(cache.contains(Path::new("/t/ax")));
    }
}
