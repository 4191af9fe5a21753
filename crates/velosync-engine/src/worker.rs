//! Per-directory reconciliation
//!
//! Workers drain the job queue; each job reconciles one source directory
//! against its target counterpart: an optional deletion pass for
//! extraneous target entries, then a compare-then-act decision per source
//! child. Subdirectories become new jobs unless the filter engine can
//! prove their subtree unreachable or `max_depth` is exceeded.
//!
//! Directory materialization has two modes. Without include rules the
//! target tree is mirrored eagerly as directories are scanned. With
//! include rules (whitelist syncs) directories are materialized lazily:
//! only when a copied file needs its parent chain, or when a directory is
//! explicitly included by name.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use velosync_config::SyncTask;
use velosync_filter::{FilterContext, FilterSide};
use velosync_types::{EntryKind, EntryMeta, Error, Result, SyncCause, SyncStats};

use crate::fsops::{self, CopyOptions};
use crate::pool::AbortState;
use crate::prepared::{PreparedDirs, PreparedState};
use crate::progress::ProgressTracker;
use crate::queue::{DirJob, DirJobQueue};

/// Shared, read-mostly state for one sync task.
///
/// The queue and the prepared-dirs cache are the only structures mutated
/// by multiple workers; everything else is read-only after construction.
#[derive(Debug)]
pub struct SyncContext {
    /// The validated task configuration
    pub task: SyncTask,
    /// Source-side filter context
    pub source_filter: FilterContext,
    /// Target-side filter context (deletion decisions)
    pub target_filter: FilterContext,
    /// Directory job queue
    pub queue: DirJobQueue,
    /// Target directories already materialized
    pub prepared: PreparedDirs,
    /// Run statistics
    pub stats: SyncStats,
    /// Stall watchdog input
    pub progress: ProgressTracker,
    /// Cooperative abort flag
    pub abort: AbortState,
}

impl SyncContext {
    /// Build the shared state for a validated task.
    ///
    /// Filter compilation failures surface here, before any work starts.
    pub fn new(task: SyncTask) -> Result<Arc<Self>> {
        let source_filter = FilterContext::new(&task, FilterSide::Source)?;
        let target_filter = FilterContext::new(&task, FilterSide::Target)?;
        let queue = DirJobQueue::new(task.threads);
        Ok(Arc::new(Self {
            task,
            source_filter,
            target_filter,
            queue,
            prepared: PreparedDirs::new(),
            stats: SyncStats::new(),
            progress: ProgressTracker::new(),
            abort: AbortState::new(),
        }))
    }

    /// Whether directories are materialized lazily (whitelist mode)
    pub fn lazy_dirs(&self) -> bool {
        self.source_filter.has_includes()
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            copy_acl: self.task.copy_acl,
            allow_reading_open_files: self.task.allow_reading_open_files,
        }
    }
}

/// One examined source child
#[derive(Debug)]
struct SourceEntry {
    name: OsString,
    abs: PathBuf,
    rel: PathBuf,
    meta: EntryMeta,
    included: bool,
}

/// Combined stat-and-filter outcome for one entry
#[derive(Debug)]
pub enum FilteredMeta {
    /// The entry exists and the filter includes it
    Included(EntryMeta),
    /// The entry exists but the filter excludes it
    Excluded(EntryMeta),
}

/// Stat `abs` exactly once and evaluate its relative path `rel` against
/// `filter`. The metadata is carried in either variant so callers never
/// need a second stat to act on the decision.
pub fn read_meta_filtered(
    filter: &FilterContext,
    abs: &Path,
    rel: &Path,
) -> Result<FilteredMeta> {
    let meta = fsops::read_meta(abs)?;
    if filter.includes(rel, &meta) {
        Ok(FilteredMeta::Included(meta))
    } else {
        Ok(FilteredMeta::Excluded(meta))
    }
}

/// Worker loop: drain jobs until the queue declares completion or the
/// abort flag is raised. Intolerable errors raise the abort flag so the
/// sibling workers stop promptly.
pub fn run_worker(ctx: &SyncContext) -> Result<()> {
    while let Some(job) = ctx.queue.poll_or_wait(|| !ctx.abort.is_aborted()) {
        ctx.progress.mark();
        if let Err(err) = process_dir(ctx, &job) {
            ctx.stats.record_error(err.to_string());
            if err.is_tolerable(ctx.task.ignore_errors, ctx.task.ignore_symlink_errors) {
                warn!("ignoring error in '{}': {err}", job.rel_dir.display());
                continue;
            }
            ctx.abort.abort();
            ctx.queue.shut_down();
            return Err(err);
        }
    }
    Ok(())
}

/// Reconcile one directory job.
pub fn process_dir(ctx: &SyncContext, job: &DirJob) -> Result<()> {
    ctx.stats.record_dir_scanned();
    trace!("scanning {}", job.source_dir.display());

    let target_dir = ctx.task.target.join(&job.rel_dir);
    let lazy = ctx.lazy_dirs();

    if !lazy {
        // Eager mode mirrors every scanned directory.
        materialize_dir(ctx, &job.source_dir, &target_dir)?;
        ctx.prepared.insert(&target_dir);
    } else if ctx.source_filter.explicitly_includes_dir(&job.rel_dir) {
        ensure_target_dir_prepared(ctx, &job.rel_dir)?;
    }

    let mut entries = Vec::new();
    for child in fsops::list_children(&job.source_dir)? {
        let Some(name) = child.file_name().map(OsString::from) else {
            continue;
        };
        let rel = job.rel_dir.join(&name);
        let (meta, included) = match read_meta_filtered(&ctx.source_filter, &child, &rel) {
            Ok(FilteredMeta::Included(meta)) => (meta, true),
            Ok(FilteredMeta::Excluded(meta)) => (meta, false),
            Err(err) => {
                handle_entry_error(ctx, &child, err)?;
                continue;
            }
        };
        if !meta.kind.is_dir_like() {
            ctx.stats.record_file_scanned();
        }
        entries.push(SourceEntry {
            name,
            abs: child,
            rel,
            meta,
            included,
        });
    }
    ctx.progress.mark();

    // Deletion results for this directory are computed before any
    // recursion decision for its children.
    if ctx.task.delete {
        deletion_pass(ctx, job, &target_dir, &entries)?;
    }

    for entry in &entries {
        if !entry.included {
            trace!("excluded: {}", entry.rel.display());
            continue;
        }
        if let Err(err) = sync_entry(ctx, job, entry, lazy) {
            handle_entry_error(ctx, &entry.abs, err)?;
        }
    }

    Ok(())
}

/// Record a per-entry error, tolerating it under the task's flags.
fn handle_entry_error(ctx: &SyncContext, path: &Path, err: Error) -> Result<()> {
    if err.is_tolerable(ctx.task.ignore_errors, ctx.task.ignore_symlink_errors) {
        ctx.stats.record_error(err.to_string());
        warn!("ignoring error on '{}': {err}", path.display());
        Ok(())
    } else {
        Err(err)
    }
}

/// Dispatch one included source entry by its classification.
fn sync_entry(ctx: &SyncContext, job: &DirJob, entry: &SourceEntry, lazy: bool) -> Result<()> {
    match entry.meta.kind {
        EntryKind::File | EntryKind::FileSymlink => {
            if lazy {
                ensure_target_dir_prepared(ctx, &job.rel_dir)?;
            }
            sync_file(ctx, &entry.abs, &entry.meta, &entry.rel)?;
        }
        EntryKind::BrokenSymlink | EntryKind::OtherSymlink => {
            if lazy {
                ensure_target_dir_prepared(ctx, &job.rel_dir)?;
            }
            sync_symlink_leaf(ctx, &entry.abs, &entry.rel, false)?;
        }
        EntryKind::DirectorySymlink => {
            // Shallow-copy the link itself; never descend through it.
            if lazy {
                ensure_target_dir_prepared(ctx, &job.rel_dir)?;
            }
            sync_symlink_leaf(ctx, &entry.abs, &entry.rel, true)?;
        }
        EntryKind::Directory => {
            sync_directory(ctx, entry, lazy)?;
        }
        EntryKind::Other => {
            debug!("skipping unsupported entry '{}'", entry.abs.display());
        }
    }
    Ok(())
}

/// Handle an included source subdirectory: enqueue a child job unless the
/// subtree is pruned or `max_depth` is exceeded.
fn sync_directory(ctx: &SyncContext, entry: &SourceEntry, lazy: bool) -> Result<()> {
    let pruned = ctx.source_filter.is_excluded_subtree_dir(&entry.rel);
    let beyond_depth = ctx
        .task
        .max_depth
        .is_some_and(|max| entry.rel.components().count() as u32 > max);

    if lazy && ctx.source_filter.explicitly_includes_dir(&entry.rel) {
        // Explicit by-name includes materialize even when empty.
        ensure_target_dir_prepared(ctx, &entry.rel)?;
    }

    if pruned {
        trace!("pruned subtree: {}", entry.rel.display());
        if !lazy {
            // Eager mode still mirrors the excluded-subtree root itself.
            let target = ctx.task.target.join(&entry.rel);
            materialize_dir(ctx, &entry.abs, &target)?;
            ctx.prepared.insert(&target);
        }
        return Ok(());
    }
    if beyond_depth {
        trace!("beyond max depth: {}", entry.rel.display());
        return Ok(());
    }

    ctx.queue.add(DirJob {
        source_dir: entry.abs.clone(),
        rel_dir: entry.rel.clone(),
    });
    Ok(())
}

/// Remove target entries with no source counterpart, honoring the
/// target-side filter and the delete-excluded flag.
fn deletion_pass(
    ctx: &SyncContext,
    job: &DirJob,
    target_dir: &Path,
    source_entries: &[SourceEntry],
) -> Result<()> {
    // Under lazy materialization the target directory may not exist yet;
    // nothing to delete then.
    let target_children = match fsops::read_meta_opt(target_dir)? {
        Some(meta) if meta.kind.is_dir_like() => fsops::list_children(target_dir)?,
        _ => return Ok(()),
    };

    let source_names: HashSet<&OsString> = source_entries.iter().map(|e| &e.name).collect();
    let inert = ctx.target_filter.is_inert();

    for child in target_children {
        let Some(name) = child.file_name().map(OsString::from) else {
            continue;
        };
        let present = source_names.contains(&name);

        let remove = if inert {
            // Fast path: target filters have no effect, removal depends
            // only on source presence.
            !present
        } else {
            let rel = job.rel_dir.join(&name);
            match read_meta_filtered(&ctx.target_filter, &child, &rel) {
                Ok(FilteredMeta::Included(_)) => !present,
                Ok(FilteredMeta::Excluded(meta)) => {
                    // A directory present in source and spared by the
                    // source-side catch-all carve-out sits on the path of
                    // whitelisted content; removing it here would undo
                    // the mirror on every run.
                    ctx.task.delete_excluded
                        && !(present
                            && meta.kind.is_dir_like()
                            && ctx.source_filter.includes(&rel, &meta))
                }
                Err(err) => {
                    handle_entry_error(ctx, &child, err)?;
                    continue;
                }
            }
        };

        if remove {
            if let Err(err) = delete_target_entry(ctx, &child) {
                handle_entry_error(ctx, &child, err)?;
            }
        }
    }
    Ok(())
}

/// Delete one target entry (recursively for directories), accounting the
/// removed bytes.
pub fn delete_target_entry(ctx: &SyncContext, path: &Path) -> Result<()> {
    let Some(meta) = fsops::read_meta_opt(path)? else {
        return Ok(());
    };
    let bytes = fsops::entry_size(path, meta.kind);
    info!("deleting '{}'", path.display());
    ctx.progress.mark();

    if ctx.task.dry_run {
        ctx.stats.record_delete(bytes, Duration::ZERO);
        return Ok(());
    }
    let started = Instant::now();
    fsops::remove_recursive(path, meta.kind)?;
    ctx.stats.record_delete(bytes, started.elapsed());

    if meta.kind.is_dir_like() {
        ctx.prepared.invalidate_below(path);
    }
    Ok(())
}

/// Compare-and-copy one source file (or file symlink) against the target.
///
/// Returns the cause of the copy, or `None` when the entries are in sync
/// (or an older source was skipped under `exclude_older_files`).
pub fn sync_file(
    ctx: &SyncContext,
    src_abs: &Path,
    src_meta: &EntryMeta,
    rel: &Path,
) -> Result<Option<SyncCause>> {
    let tgt_abs = ctx.task.target.join(rel);

    let cause = match fsops::read_meta_opt(&tgt_abs)? {
        None => Some(SyncCause::New),
        Some(tgt_meta) => {
            let comparable = src_meta.kind.is_symlink() == tgt_meta.kind.is_symlink()
                && tgt_meta.kind.is_file_like();
            if !comparable {
                // Symlink-ness or kind mismatch: replace wholesale.
                if !ctx.task.dry_run {
                    fsops::remove_recursive(&tgt_abs, tgt_meta.kind)?;
                    if tgt_meta.kind.is_dir_like() {
                        ctx.prepared.invalidate_below(&tgt_abs);
                    }
                }
                Some(SyncCause::Replace)
            } else if src_meta.mtime > tgt_meta.mtime {
                Some(SyncCause::Newer)
            } else if src_meta.mtime < tgt_meta.mtime {
                if ctx.task.exclude_older_files {
                    debug!("skipping older '{}'", rel.display());
                    None
                } else {
                    Some(SyncCause::Older)
                }
            } else if src_meta.len > tgt_meta.len {
                Some(SyncCause::Larger)
            } else if src_meta.len < tgt_meta.len {
                Some(SyncCause::Smaller)
            } else {
                trace!("in sync: {}", rel.display());
                None
            }
        }
    };

    if let Some(cause) = cause {
        copy_source_file(ctx, src_abs, src_meta, &tgt_abs, cause)?;
    }
    Ok(cause)
}

/// Execute (or dry-run) the copy decided by [`sync_file`].
fn copy_source_file(
    ctx: &SyncContext,
    src_abs: &Path,
    src_meta: &EntryMeta,
    tgt_abs: &Path,
    cause: SyncCause,
) -> Result<()> {
    info!("copying '{}' ({cause})", src_abs.display());
    ctx.progress.mark();

    if ctx.task.dry_run {
        ctx.stats.record_copy(src_meta.len, Duration::ZERO);
        return Ok(());
    }

    let started = Instant::now();
    let bytes = if src_meta.kind == EntryKind::FileSymlink {
        // Copy the link itself so repeat runs see matching symlink-ness.
        let link_target = fsops::read_link(src_abs)?;
        if fsops::read_meta_opt(tgt_abs)?.is_some() {
            std::fs::remove_file(tgt_abs).map_err(|e| Error::io(tgt_abs, e))?;
        }
        fsops::create_symlink(&link_target, tgt_abs, false)?;
        src_meta.len
    } else {
        fsops::copy_file(src_abs, tgt_abs, &ctx.copy_options())?
    };
    ctx.stats.record_copy(bytes, started.elapsed());
    Ok(())
}

/// Reconcile a symlink leaf (broken/other/directory symlink): a no-op
/// when both sides are symlinks with identical targets, otherwise any
/// conflicting target entry is removed and the link recreated.
pub fn sync_symlink_leaf(
    ctx: &SyncContext,
    src_abs: &Path,
    rel: &Path,
    dir_link: bool,
) -> Result<()> {
    let tgt_abs = ctx.task.target.join(rel);
    let link_target = fsops::read_link(src_abs)?;

    if let Some(tgt_meta) = fsops::read_meta_opt(&tgt_abs)? {
        if tgt_meta.kind.is_symlink() {
            if fsops::read_link(&tgt_abs)? == link_target {
                trace!("symlink in sync: {}", rel.display());
                return Ok(());
            }
        }
        if !ctx.task.dry_run {
            fsops::remove_recursive(&tgt_abs, tgt_meta.kind)?;
            if tgt_meta.kind.is_dir_like() {
                ctx.prepared.invalidate_below(&tgt_abs);
            }
        }
    }

    info!("recreating symlink '{}'", rel.display());
    ctx.progress.mark();
    if ctx.task.dry_run {
        ctx.stats.record_copy(0, Duration::ZERO);
        return Ok(());
    }
    let started = Instant::now();
    fsops::create_symlink(&link_target, &tgt_abs, dir_link)?;
    ctx.stats.record_copy(0, started.elapsed());
    Ok(())
}

/// Materialize every ancestor of `rel_dir` on the target, root to leaf,
/// memoized in the prepared-dirs cache. Cache hits are trusted only
/// after a live re-check; stale entries are evicted and rebuilt.
pub fn ensure_target_dir_prepared(ctx: &SyncContext, rel_dir: &Path) -> Result<()> {
    let mut rel = PathBuf::new();
    for component in rel_dir.components() {
        rel.push(component);
        let abs = ctx.task.target.join(&rel);

        if ctx.prepared.contains(&abs) {
            if ctx.task.dry_run {
                continue;
            }
            match ctx.prepared.revalidate(&abs) {
                PreparedState::Fresh => continue,
                PreparedState::StaleNeedsRebuild => {
                    debug!("re-materializing '{}'", abs.display());
                }
            }
        }

        let src = ctx.task.source.join(&rel);
        materialize_dir(ctx, &src, &abs)?;
        ctx.prepared.insert(&abs);
    }
    Ok(())
}

/// Create the target directory `abs` mirroring `src`, replacing any
/// non-directory entry occupying the slot.
fn materialize_dir(ctx: &SyncContext, src: &Path, abs: &Path) -> Result<()> {
    if ctx.task.dry_run {
        debug!("dry-run: would create '{}'", abs.display());
        return Ok(());
    }
    match fsops::read_meta_opt(abs)? {
        Some(meta) if meta.kind.is_dir_like() => Ok(()),
        Some(meta) => {
            fsops::remove_recursive(abs, meta.kind)?;
            fsops::copy_dir_shallow(src, abs, &ctx.copy_options())
        }
        None => fsops::copy_dir_shallow(src, abs, &ctx.copy_options()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filtered_stat_carries_the_inclusion_decision() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        std::fs::write(dir.path().join("skip.log"), b"s").unwrap();

        let mut task = SyncTask::new("/src", "/dst");
        task.filters = vec!["ex:*.log".into()];
        let filter = FilterContext::new(&task, FilterSide::Source).unwrap();

        assert!(matches!(
            read_meta_filtered(&filter, &dir.path().join("keep.txt"), Path::new("keep.txt")),
            Ok(FilteredMeta::Included(_))
        ));
        assert!(matches!(
            read_meta_filtered(&filter, &dir.path().join("skip.log"), Path::new("skip.log")),
            Ok(FilteredMeta::Excluded(_))
        ));
        assert!(read_meta_filtered(&filter, &dir.path().join("gone"), Path::new("gone")).is_err());
    }
}
