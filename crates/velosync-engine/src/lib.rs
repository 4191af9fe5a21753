//! Concurrent one-way sync engine
//!
//! The engine walks the source tree with a pool of worker threads fed by
//! a shared directory job queue, reconciles each directory against the
//! target with compare-then-act decisions, and supervises the pool with
//! a stall watchdog so a hung filesystem cannot wedge the whole run.
//!
//! Entry point for a bulk run is [`run_task`]; continuous watching is
//! layered on top by the `velosync-watch` crate, which reuses the same
//! [`SyncContext`] and per-entry reconciliation.

pub mod fsops;
pub mod pool;
pub mod prepared;
pub mod progress;
pub mod queue;
pub mod worker;

pub use fsops::CopyOptions;
pub use pool::{register_signal_flag, run_task, AbortState, SyncReport};
pub use prepared::{PreparedDirs, PreparedState};
pub use progress::ProgressTracker;
pub use queue::{DirJob, DirJobQueue};
pub use worker::{read_meta_filtered, FilteredMeta, SyncContext};
