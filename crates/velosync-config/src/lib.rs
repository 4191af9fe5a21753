//! Task configuration for VeloSync
//!
//! A [`SyncTask`] describes one source→target mirror run: the roots, the
//! ordered filter specs, behavior flags, the modified-time window, and the
//! worker/stall settings. Tasks are built from YAML task files and/or CLI
//! flags, validated once with [`SyncTask::validated`], and are immutable
//! for the duration of the run.

#![deny(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use velosync_types::{Error, Result};

pub mod loader;

pub use loader::TaskFile;

fn default_threads() -> usize {
    num_cpus::get()
}

/// Immutable-after-validation configuration for one sync or watch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncTask {
    /// Optional task name for logs and summaries
    #[serde(default)]
    pub name: Option<String>,
    /// Source root directory
    pub source: PathBuf,
    /// Target root directory
    pub target: PathBuf,
    /// Ordered filter specs (`in:<glob>` / `ex:<glob>`)
    #[serde(default)]
    pub filters: Vec<String>,
    /// Log decisions without touching the filesystem
    #[serde(default)]
    pub dry_run: bool,
    /// Delete target entries with no source counterpart
    #[serde(default)]
    pub delete: bool,
    /// Also delete target entries matched by an exclude rule
    #[serde(default)]
    pub delete_excluded: bool,
    /// Skip copying when the source file is older than the target
    #[serde(default)]
    pub exclude_older_files: bool,
    /// Tolerate per-entry I/O errors and keep going
    #[serde(default)]
    pub ignore_errors: bool,
    /// Tolerate symlink-creation failures and keep going
    #[serde(default)]
    pub ignore_symlink_errors: bool,
    /// Copy permissions/ACL information along with file contents
    #[serde(default)]
    pub copy_acl: bool,
    /// Allow reading files opened by other processes where the platform
    /// supports it
    #[serde(default)]
    pub allow_reading_open_files: bool,
    /// Exclude hidden entries
    #[serde(default)]
    pub exclude_hidden_files: bool,
    /// Exclude system entries
    #[serde(default)]
    pub exclude_system_files: bool,
    /// Exclude entries that are both hidden and system
    #[serde(default)]
    pub exclude_hidden_system_files: bool,
    /// Exclude symlinks that resolve to neither file nor directory
    #[serde(default)]
    pub exclude_other_links: bool,
    /// Maximum directory depth below the source root, unlimited if unset
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// Only sync files modified at or after this instant
    #[serde(default)]
    pub modified_from: Option<DateTime<Utc>>,
    /// Only sync files modified at or before this instant (inclusive)
    #[serde(default)]
    pub modified_until: Option<DateTime<Utc>>,
    /// Only sync files modified strictly before this instant
    /// (mutually exclusive with `modified_until`)
    #[serde(default)]
    pub modified_before: Option<DateTime<Utc>>,
    /// Number of worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Stall timeout in milliseconds, 0 disables stall detection
    #[serde(default)]
    pub stall_timeout_ms: u64,
}

impl Default for SyncTask {
    fn default() -> Self {
        Self {
            name: None,
            source: PathBuf::new(),
            target: PathBuf::new(),
            filters: Vec::new(),
            dry_run: false,
            delete: false,
            delete_excluded: false,
            exclude_older_files: false,
            ignore_errors: false,
            ignore_symlink_errors: false,
            copy_acl: false,
            allow_reading_open_files: false,
            exclude_hidden_files: false,
            exclude_system_files: false,
            exclude_hidden_system_files: false,
            exclude_other_links: false,
            max_depth: None,
            modified_from: None,
            modified_until: None,
            modified_before: None,
            threads: default_threads(),
            stall_timeout_ms: 0,
        }
    }
}

impl SyncTask {
    /// Create a task for `source` → `target` with default options
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    /// Display name for logs: the configured name or the source path
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Stall timeout as a [`Duration`]; zero disables stall detection
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Lower bound of the modified-time window
    pub fn modified_from_sys(&self) -> Option<SystemTime> {
        self.modified_from.map(SystemTime::from)
    }

    /// Inclusive upper bound of the modified-time window
    pub fn modified_until_sys(&self) -> Option<SystemTime> {
        self.modified_until.map(SystemTime::from)
    }

    /// Exclusive upper bound of the modified-time window
    pub fn modified_before_sys(&self) -> Option<SystemTime> {
        self.modified_before.map(SystemTime::from)
    }

    /// Validate the task and resolve its roots to absolute paths.
    ///
    /// Runs exactly once per task; the returned task is immutable for the
    /// duration of the run. Failures are fatal configuration errors.
    pub fn validated(mut self) -> Result<Self> {
        if self.modified_until.is_some() && self.modified_before.is_some() {
            return Err(Error::config(
                "'modified_until' and 'modified_before' are mutually exclusive",
            ));
        }
        if self.threads == 0 {
            return Err(Error::config("'threads' must be at least 1"));
        }
        if self.source.as_os_str().is_empty() {
            return Err(Error::config("'source' must be set"));
        }
        if self.target.as_os_str().is_empty() {
            return Err(Error::config("'target' must be set"));
        }

        self.source = self.source.canonicalize().map_err(|e| {
            Error::config(format!(
                "source '{}' is not readable: {e}",
                self.source.display()
            ))
        })?;
        if !self.source.is_dir() {
            return Err(Error::config(format!(
                "source '{}' is not a directory",
                self.source.display()
            )));
        }

        self.target = absolutize(&self.target)?;
        if self.target == self.source {
            return Err(Error::config("source and target are the same directory"));
        }
        if self.target.starts_with(&self.source) {
            return Err(Error::config(format!(
                "target '{}' lies inside source '{}'",
                self.target.display(),
                self.source.display()
            )));
        }
        if self.source.starts_with(&self.target) {
            return Err(Error::config(format!(
                "source '{}' lies inside target '{}'",
                self.source.display(),
                self.target.display()
            )));
        }

        Ok(self)
    }
}

/// Make `path` absolute without requiring it to exist.
///
/// An existing path is canonicalized; a missing one is resolved against
/// the current working directory.
fn absolutize(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                let cwd = std::env::current_dir()
                    .map_err(|e| Error::config(format!("cannot resolve working directory: {e}")))?;
                Ok(cwd.join(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validation_rejects_conflicting_date_bounds() {
        let dir = TempDir::new().unwrap();
        let mut task = SyncTask::new(dir.path(), dir.path().join("out"));
        task.modified_until = Some(Utc::now());
        task.modified_before = Some(Utc::now());
        assert!(task.validated().is_err());
    }

    #[test]
    fn validation_rejects_missing_source() {
        let dir = TempDir::new().unwrap();
        let task = SyncTask::new(dir.path().join("absent"), dir.path().join("out"));
        assert!(task.validated().is_err());
    }

    #[test]
    fn validation_rejects_nested_roots() {
        let dir = TempDir::new().unwrap();
        let task = SyncTask::new(dir.path(), dir.path().join("inner"));
        assert!(task.validated().is_err());
    }

    #[test]
    fn validation_resolves_roots() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let task = SyncTask::new(src.path(), dst.path().join("mirror"))
            .validated()
            .unwrap();
        assert!(task.source.is_absolute());
        assert!(task.target.is_absolute());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let mut task = SyncTask::new(src.path(), dst.path());
        task.threads = 0;
        assert!(task.validated().is_err());
    }
}
