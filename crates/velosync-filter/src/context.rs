//! Ordered rule evaluation for one side of a sync task
//!
//! A [`FilterContext`] is built once per task per side and is read-only
//! afterwards, so it can be shared freely across worker threads. The two
//! sides differ in exactly one behavior: how a catch-all exclude treats
//! directories (see [`FilterSide`]).

use crate::prune::SimplePrefix;
use crate::rule::{FilterKind, FilterRule};
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;
use velosync_config::SyncTask;
use velosync_types::{EntryKind, EntryMeta, Result};

/// Which side of the sync a context evaluates.
///
/// On the source side a catch-all exclude (`**`, `**/*`) must not block
/// traversal into directories when include rules exist elsewhere in the
/// rule set, or whitelisted descendants would become unreachable. On the
/// target side the same catch-all is fully honored for directories, so
/// extraneous directories are not protected from the deletion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSide {
    /// Evaluating source entries for traversal and copying
    Source,
    /// Evaluating target entries for deletion decisions
    Target,
}

/// Compiled, ordered filter rules plus the flag- and date-based checks
#[derive(Debug)]
pub struct FilterContext {
    side: FilterSide,
    rules: Vec<FilterRule>,
    has_includes: bool,
    has_catch_all_exclude: bool,
    /// Per-segment prefixes of all include rules; `None` when some
    /// include is not simple, which disables catch-all pruning.
    simple_include_prefixes: Option<Vec<SimplePrefix>>,
    exclude_hidden: bool,
    exclude_system: bool,
    exclude_hidden_system: bool,
    exclude_other_links: bool,
    modified_from: Option<SystemTime>,
    modified_until: Option<SystemTime>,
    modified_before: Option<SystemTime>,
}

impl FilterContext {
    /// Compile the task's filter specs for the given side.
    ///
    /// Malformed specs are fatal configuration errors.
    pub fn new(task: &SyncTask, side: FilterSide) -> Result<Self> {
        let mut rules = Vec::with_capacity(task.filters.len());
        for spec in &task.filters {
            rules.push(FilterRule::parse(spec)?);
        }

        let has_includes = rules.iter().any(|r| r.kind() == FilterKind::Include);
        let has_catch_all_exclude = rules
            .iter()
            .any(|r| r.kind() == FilterKind::Exclude && r.is_catch_all());

        let all_includes_simple = rules
            .iter()
            .filter(|r| r.kind() == FilterKind::Include)
            .all(FilterRule::is_simple);
        let simple_include_prefixes = if all_includes_simple {
            let mut prefixes = Vec::new();
            for rule in &rules {
                if rule.kind() == FilterKind::Include {
                    prefixes.push(SimplePrefix::compile(rule.pattern())?);
                }
            }
            Some(prefixes)
        } else {
            None
        };

        Ok(Self {
            side,
            rules,
            has_includes,
            has_catch_all_exclude,
            simple_include_prefixes,
            exclude_hidden: task.exclude_hidden_files,
            exclude_system: task.exclude_system_files,
            exclude_hidden_system: task.exclude_hidden_system_files,
            exclude_other_links: task.exclude_other_links,
            modified_from: task.modified_from_sys(),
            modified_until: task.modified_until_sys(),
            modified_before: task.modified_before_sys(),
        })
    }

    /// Whether any glob rules are configured
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Whether any include rule is configured.
    ///
    /// Include rules switch the reconciler into whitelist mode, where
    /// target directories are materialized lazily.
    pub fn has_includes(&self) -> bool {
        self.has_includes
    }

    /// Whether this context can never exclude anything.
    ///
    /// Used as the deletion-pass fast path: when the target context is
    /// inert, removal depends only on source presence.
    pub fn is_inert(&self) -> bool {
        self.rules.is_empty()
            && !self.exclude_hidden
            && !self.exclude_system
            && !self.exclude_hidden_system
            && !self.exclude_other_links
            && self.modified_from.is_none()
            && self.modified_until.is_none()
            && self.modified_before.is_none()
    }

    /// Whether the entry at `rel` with metadata `meta` is included.
    ///
    /// Rules are tested in declaration order and the first matching rule
    /// wins regardless of kind; no match means include. The hidden/system
    /// flags and the modified-time window are checked before any glob
    /// rule; the time window applies to regular files only.
    pub fn includes(&self, rel: &Path, meta: &EntryMeta) -> bool {
        if rel.as_os_str().is_empty() {
            // The task root is always included.
            return true;
        }

        if self.excluded_by_flags(meta) || self.excluded_by_window(meta) {
            return false;
        }

        let rel_str = slash_path(rel);
        match self.first_match(&rel_str, meta.kind.is_dir_like()) {
            Some(rule) => {
                trace!(
                    "'{rel_str}' matched {:?} rule '{}'",
                    rule.kind(),
                    rule.pattern()
                );
                rule.kind() == FilterKind::Include
            }
            None => true,
        }
    }

    /// Whether a directory at `rel` is matched by an actual include rule
    /// (first matching rule is an include), as opposed to being included
    /// only by default.
    ///
    /// Explicitly included directories are materialized on the target
    /// even when no synced descendant forces their creation.
    pub fn explicitly_includes_dir(&self, rel: &Path) -> bool {
        if rel.as_os_str().is_empty() {
            return false;
        }
        let rel_str = slash_path(rel);
        matches!(
            self.first_match(&rel_str, true).map(FilterRule::kind),
            Some(FilterKind::Include)
        )
    }

    /// Whether every descendant of the directory at `rel` is provably
    /// unreachable, so the subtree can be skipped without further
    /// filesystem calls.
    ///
    /// Two certifications exist: an explicit literal-segment exclude
    /// covering the subtree, or a catch-all exclude combined with all
    /// simple include prefixes being incompatible with the path. Any
    /// ambiguity resolves to "do not prune".
    pub fn is_excluded_subtree_dir(&self, rel: &Path) -> bool {
        if rel.as_os_str().is_empty() {
            return false;
        }
        let rel_str = slash_path(rel);
        let segments: Vec<&str> = rel_str.split('/').collect();

        for rule in &self.rules {
            if rule.kind() == FilterKind::Exclude {
                if let Some(hint) = rule.prune_hint() {
                    if hint.matches(&segments) {
                        return true;
                    }
                }
            }
        }

        if self.has_catch_all_exclude {
            if let Some(prefixes) = &self.simple_include_prefixes {
                if prefixes.iter().all(|p| !p.compatible(&segments)) {
                    return true;
                }
            }
        }

        false
    }

    fn excluded_by_flags(&self, meta: &EntryMeta) -> bool {
        if self.exclude_hidden && meta.hidden {
            return true;
        }
        if self.exclude_system && meta.system {
            return true;
        }
        if self.exclude_hidden_system && meta.hidden && meta.system {
            return true;
        }
        if self.exclude_other_links
            && matches!(meta.kind, EntryKind::OtherSymlink | EntryKind::BrokenSymlink)
        {
            return true;
        }
        false
    }

    /// The modified-time window excludes regular files only; directories
    /// and symlinks are never excluded by mtime.
    fn excluded_by_window(&self, meta: &EntryMeta) -> bool {
        if meta.kind != EntryKind::File {
            return false;
        }
        if let Some(from) = self.modified_from {
            if meta.mtime < from {
                return true;
            }
        }
        if let Some(until) = self.modified_until {
            if meta.mtime > until {
                return true;
            }
        }
        if let Some(before) = self.modified_before {
            if meta.mtime >= before {
                return true;
            }
        }
        false
    }

    /// First rule matching `rel_str` in declaration order, honoring the
    /// source-side catch-all exception for directories.
    fn first_match(&self, rel_str: &str, is_dir_like: bool) -> Option<&FilterRule> {
        self.rules.iter().find(|rule| {
            if !rule.matches(rel_str) {
                return false;
            }
            if rule.kind() == FilterKind::Exclude
                && rule.is_catch_all()
                && is_dir_like
                && self.side == FilterSide::Source
                && self.has_includes
            {
                // A source-side catch-all must not block discovery of
                // whitelisted descendants.
                return false;
            }
            true
        })
    }
}

/// Render a relative path with forward slashes for glob matching
pub fn slash_path(rel: &Path) -> String {
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}
