//! Last-known content hashes for modify-event de-duplication
//!
//! Editors and build tools commonly rewrite a file without changing its
//! content, and most platforms coalesce metadata churn into modify
//! events. Comparing a fresh blake3 hash against the last-known one lets
//! the dispatcher downgrade such events to an attributes-only copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Absolute source path → last-known content hash.
///
/// Unbounded for the life of the watch session; entries are evicted
/// eagerly on delete events so rename sequences (delete + create) never
/// see a stale hash.
#[derive(Debug, Default)]
pub struct HashCache {
    hashes: Mutex<HashMap<PathBuf, blake3::Hash>>,
}

impl HashCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known hash for `abs`, if any
    pub fn get(&self, abs: &Path) -> Option<blake3::Hash> {
        self.hashes.lock().unwrap().get(abs).copied()
    }

    /// Record the current hash for `abs`
    pub fn update(&self, abs: &Path, hash: blake3::Hash) {
        self.hashes.lock().unwrap().insert(abs.to_path_buf(), hash);
    }

    /// Drop every entry at or below `abs`. Deleting a directory must
    /// evict the hashes of all files it contained, not just its own.
    pub fn evict_below(&self, abs: &Path) {
        self.hashes.lock().unwrap().retain(|p, _| !p.starts_with(abs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_covers_the_whole_subtree() {
        let cache = HashCache::new();
        let h = blake3::hash(b"x");
        cache.update(Path::new("/s/dir/a.txt"), h);
        cache.update(Path::new("/s/dir/sub/b.txt"), h);
        cache.update(Path::new("/s/dirx/c.txt"), h);

        cache.evict_below(Path::new("/s/dir"));
        assert!(cache.get(Path::new("/s/dir/a.txt")).is_none());
        assert!(cache.get(Path::new("/s/dir/sub/b.txt")).is_none());
        // Sibling sharing a name prefix survives.
        assert!(cache.get(Path::new("/s/dirx/c.txt")).is_some());
    }
}
