//! Continuous watch mode
//!
//! A [`WatchSession`] mirrors the source tree once, registers
//! non-recursive filesystem watches on every directory the filter engine
//! cannot prove unreachable, and then keeps the mirror current by
//! re-running the engine's per-entry reconciliation for each event.
//! Modify events on regular files are de-duplicated with a blake3
//! content-hash cache so attribute churn does not trigger full copies.

pub mod hash_cache;
pub mod session;

pub use hash_cache::HashCache;
pub use session::{WatchChange, WatchSession};
