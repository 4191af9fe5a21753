//! Shared types for VeloSync
//!
//! This crate provides the types shared by every other VeloSync crate:
//! filesystem entry classification, sync decision causes, run statistics,
//! and the common error type.

#![deny(missing_docs)]

pub mod error;
pub mod stats;
pub mod types;

pub use error::{Error, Result};
pub use stats::{StatsSnapshot, SyncStats};
pub use types::{EntryKind, EntryMeta, SyncCause};
