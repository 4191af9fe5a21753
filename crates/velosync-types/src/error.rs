//! Error types and handling for VeloSync
//!
//! The error taxonomy mirrors how failures are handled at runtime:
//! configuration and filter errors are fatal before any work starts,
//! per-entry I/O errors may be tolerated, symlink errors have their own
//! tolerance flag, and stall/interrupt conditions always abort a task.

use std::path::PathBuf;
use std::time::Duration;

/// Main error type for VeloSync operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration error, surfaced before any work starts
    #[error("configuration error: {message}")]
    Config {
        /// Description of the invalid configuration
        message: String,
    },

    /// Invalid filter specification
    #[error("invalid filter '{pattern}': {message}")]
    Filter {
        /// The offending filter spec as written by the user
        pattern: String,
        /// Description of what is wrong with it
        message: String,
    },

    /// I/O operation failed while processing an entry
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Symlink creation or inspection failed
    #[error("symlink error on '{}': {message}", path.display())]
    Symlink {
        /// Path of the symlink
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// No progress was recorded within the stall timeout
    #[error("no progress for {}ms, task stalled", timeout.as_millis())]
    Stalled {
        /// The configured stall timeout
        timeout: Duration,
    },

    /// Task was interrupted by SIGINT/SIGTERM
    #[error("interrupted by signal")]
    Interrupted,

    /// Filesystem watcher failure
    #[error("watch error: {message}")]
    Watch {
        /// Description of the watcher failure
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a filter error for `pattern`
    pub fn filter(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filter {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a symlink error for `path`
    pub fn symlink(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Symlink {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a watch error
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }

    /// Whether this error may be tolerated under the given tolerance flags.
    ///
    /// Stall, interrupt, and configuration errors are never tolerable.
    pub fn is_tolerable(&self, ignore_errors: bool, ignore_symlink_errors: bool) -> bool {
        match self {
            Self::Io { .. } => ignore_errors,
            Self::Symlink { .. } => ignore_symlink_errors || ignore_errors,
            Self::Config { .. }
            | Self::Filter { .. }
            | Self::Stalled { .. }
            | Self::Interrupted
            | Self::Watch { .. } => false,
        }
    }
}

/// Result type alias using the VeloSync [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_tolerable_only_with_ignore_errors() {
        let err = Error::io("/tmp/x", std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.is_tolerable(true, false));
        assert!(!err.is_tolerable(false, true));
    }

    #[test]
    fn symlink_errors_respect_both_flags() {
        let err = Error::symlink("/tmp/link", "unsupported");
        assert!(err.is_tolerable(false, true));
        assert!(err.is_tolerable(true, false));
        assert!(!err.is_tolerable(false, false));
    }

    #[test]
    fn stall_and_interrupt_are_never_tolerable() {
        let stalled = Error::Stalled {
            timeout: Duration::from_millis(200),
        };
        assert!(!stalled.is_tolerable(true, true));
        assert!(!Error::Interrupted.is_tolerable(true, true));
    }
}
