//! Include/exclude filter engine for VeloSync
//!
//! This crate compiles the `in:<glob>` / `ex:<glob>` filter mini-language
//! into ordered rule lists per side (source/target) and answers three
//! questions for the sync and watch engines:
//!
//! - is this entry included ([`FilterContext::includes`]),
//! - is this directory explicitly included by name
//!   ([`FilterContext::explicitly_includes_dir`]),
//! - can this whole subtree be skipped
//!   ([`FilterContext::is_excluded_subtree_dir`]).
//!
//! Rules are evaluated in declaration order and the first matching rule
//! wins regardless of its kind. Glob matching is built on [`globset`].

#![deny(missing_docs)]

pub mod context;
pub mod prune;
pub mod rule;

pub use context::{slash_path, FilterContext, FilterSide};
pub use rule::{FilterKind, FilterRule};
