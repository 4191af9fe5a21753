//! Watch session: filtered watch registration and event dispatch
//!
//! A session reuses the sync engine's shared context and per-entry
//! reconciliation, but drives them from a filesystem-event stream
//! instead of a batch scan. Dispatch is separated from the OS watcher so
//! the event semantics are testable without platform event timing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use velosync_config::SyncTask;
use velosync_engine::worker::{
    delete_target_entry, ensure_target_dir_prepared, read_meta_filtered, sync_symlink_leaf,
    FilteredMeta, SyncContext,
};
use velosync_engine::{fsops, CopyOptions, SyncReport};
use velosync_types::{EntryKind, Error, Result};

use crate::hash_cache::HashCache;

/// Poll interval of the event-receive loop; bounds signal latency
const EVENT_POLL: Duration = Duration::from_millis(250);

/// One change reported by the watcher, reduced to the three semantic
/// categories the dispatcher distinguishes. Overflow is handled in the
/// receive loop and never reaches dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchChange {
    /// A new entry appeared
    Created,
    /// An existing entry changed
    Modified,
    /// An entry disappeared
    Removed,
}

/// Continuous mirror session for one task
#[derive(Debug)]
pub struct WatchSession {
    ctx: Arc<SyncContext>,
    hashes: HashCache,
}

impl WatchSession {
    /// Build a session for `task`.
    ///
    /// Event dispatch is inherently serial, so the session always runs
    /// the reconciler single-threaded regardless of the configured
    /// thread count.
    pub fn new(mut task: SyncTask) -> Result<Self> {
        task.threads = 1;
        let task = task.validated()?;
        Ok(Self {
            ctx: SyncContext::new(task)?,
            hashes: HashCache::new(),
        })
    }

    /// The shared engine context
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Mirror the source tree shallowly and return every reachable
    /// source directory, root first, for watch registration.
    ///
    /// Pruned subtrees are neither mirrored (beyond their root in eager
    /// mode) nor watched; events below them cannot produce included
    /// entries.
    pub fn initial_mirror(&self) -> Result<Vec<PathBuf>> {
        if !self.ctx.task.dry_run {
            std::fs::create_dir_all(&self.ctx.task.target)
                .map_err(|e| Error::io(&self.ctx.task.target, e))?;
        }
        self.mirror_subtree(Path::new(""))
    }

    /// Dispatch one change for the absolute source path `abs`, returning
    /// newly reachable source directories that need watches.
    pub fn dispatch(&self, change: WatchChange, abs: &Path) -> Result<Vec<PathBuf>> {
        let Ok(rel) = abs.strip_prefix(&self.ctx.task.source) else {
            trace!("event outside source root: {}", abs.display());
            return Ok(Vec::new());
        };
        if rel.as_os_str().is_empty() {
            return Ok(Vec::new());
        }
        // The watch API has no depth concept, so the limit is re-applied
        // per event.
        if self
            .ctx
            .task
            .max_depth
            .is_some_and(|max| rel.components().count() as u32 > max)
        {
            return Ok(Vec::new());
        }
        self.ctx.progress.mark();

        match change {
            WatchChange::Removed => {
                self.handle_removed(rel, abs)?;
                Ok(Vec::new())
            }
            WatchChange::Created | WatchChange::Modified => self.handle_upsert(rel, abs),
        }
    }

    fn handle_removed(&self, rel: &Path, abs: &Path) -> Result<()> {
        let tgt = self.ctx.task.target.join(rel);
        let Some(meta) = fsops::read_meta_opt(&tgt)? else {
            self.hashes.evict_below(abs);
            return Ok(());
        };
        if !self.ctx.task.delete_excluded && !self.ctx.target_filter.includes(rel, &meta) {
            debug!("keeping excluded target entry '{}'", rel.display());
            return Ok(());
        }
        delete_target_entry(&self.ctx, &tgt)?;
        self.hashes.evict_below(abs);
        Ok(())
    }

    fn handle_upsert(&self, rel: &Path, abs: &Path) -> Result<Vec<PathBuf>> {
        // The entry can vanish between the event and our stat; a trailing
        // remove event cleans up then.
        let Some(meta) = fsops::read_meta_opt(abs)? else {
            return Ok(Vec::new());
        };
        if !self.ctx.source_filter.includes(rel, &meta) {
            trace!("excluded: {}", rel.display());
            return Ok(Vec::new());
        }

        match meta.kind {
            EntryKind::Directory => {
                if self.ctx.source_filter.is_excluded_subtree_dir(rel) {
                    if !self.ctx.lazy_dirs() {
                        ensure_target_dir_prepared(&self.ctx, rel)?;
                    }
                    return Ok(Vec::new());
                }
                // A created directory may already hold entries written
                // before its watch existed, so mirror the whole subtree.
                self.mirror_subtree(rel)
            }
            EntryKind::DirectorySymlink => {
                self.prepare_parent(rel)?;
                sync_symlink_leaf(&self.ctx, abs, rel, true)?;
                Ok(Vec::new())
            }
            EntryKind::FileSymlink | EntryKind::BrokenSymlink | EntryKind::OtherSymlink => {
                self.prepare_parent(rel)?;
                sync_symlink_leaf(&self.ctx, abs, rel, false)?;
                Ok(Vec::new())
            }
            EntryKind::File => {
                self.prepare_parent(rel)?;
                self.sync_file_hashed(abs, rel, meta.len)?;
                Ok(Vec::new())
            }
            EntryKind::Other => {
                debug!("skipping unsupported entry '{}'", abs.display());
                Ok(Vec::new())
            }
        }
    }

    /// Copy a regular file, de-duplicated by content hash: unchanged
    /// content downgrades to an attributes-only copy.
    fn sync_file_hashed(&self, abs: &Path, rel: &Path, len: u64) -> Result<()> {
        let hash = fsops::hash_file(abs)?;
        let tgt = self.ctx.task.target.join(rel);
        let tgt_meta = fsops::read_meta_opt(&tgt)?;

        let unchanged = self.hashes.get(abs) == Some(hash)
            && tgt_meta.as_ref().is_some_and(|m| m.kind == EntryKind::File);
        if unchanged {
            debug!("content unchanged, copying attributes: {}", rel.display());
            if !self.ctx.task.dry_run {
                fsops::copy_attrs(abs, &tgt, &self.copy_options())?;
            }
            return Ok(());
        }

        info!("copying '{}'", rel.display());
        if self.ctx.task.dry_run {
            self.ctx.stats.record_copy(len, Duration::ZERO);
            self.hashes.update(abs, hash);
            return Ok(());
        }
        if let Some(tm) = tgt_meta {
            if tm.kind != EntryKind::File {
                fsops::remove_recursive(&tgt, tm.kind)?;
                if tm.kind.is_dir_like() {
                    self.ctx.prepared.invalidate_below(&tgt);
                }
            }
        }
        let started = Instant::now();
        let bytes = fsops::copy_file(abs, &tgt, &self.copy_options())?;
        self.ctx.stats.record_copy(bytes, started.elapsed());
        self.hashes.update(abs, hash);
        Ok(())
    }

    /// Shallow-mirror the subtree rooted at `rel_dir` and collect its
    /// reachable directories. No deletion pass; watch-mode deletes are
    /// event-driven.
    fn mirror_subtree(&self, rel_dir: &Path) -> Result<Vec<PathBuf>> {
        let lazy = self.ctx.lazy_dirs();
        let mut reachable = Vec::new();
        let mut stack = vec![rel_dir.to_path_buf()];

        while let Some(rel) = stack.pop() {
            let src_dir = self.ctx.task.source.join(&rel);
            self.ctx.stats.record_dir_scanned();
            self.ctx.progress.mark();

            if !lazy || self.ctx.source_filter.explicitly_includes_dir(&rel) {
                ensure_target_dir_prepared(&self.ctx, &rel)?;
            }
            reachable.push(src_dir.clone());

            for child in fsops::list_children(&src_dir)? {
                let Some(name) = child.file_name() else {
                    continue;
                };
                let child_rel = rel.join(name);
                let (meta, included) =
                    match read_meta_filtered(&self.ctx.source_filter, &child, &child_rel) {
                        Ok(FilteredMeta::Included(meta)) => (meta, true),
                        Ok(FilteredMeta::Excluded(meta)) => (meta, false),
                        Err(err) => {
                            self.tolerate(&child, err)?;
                            continue;
                        }
                    };
                if !meta.kind.is_dir_like() {
                    self.ctx.stats.record_file_scanned();
                }
                if !included {
                    continue;
                }

                let result = match meta.kind {
                    EntryKind::Directory => {
                        self.schedule_subdir(&child_rel, lazy, &mut stack);
                        Ok(())
                    }
                    EntryKind::DirectorySymlink => self
                        .prepare_parent(&child_rel)
                        .and_then(|()| sync_symlink_leaf(&self.ctx, &child, &child_rel, true)),
                    EntryKind::FileSymlink | EntryKind::BrokenSymlink | EntryKind::OtherSymlink => {
                        self.prepare_parent(&child_rel)
                            .and_then(|()| sync_symlink_leaf(&self.ctx, &child, &child_rel, false))
                    }
                    EntryKind::File => self
                        .prepare_parent(&child_rel)
                        .and_then(|()| self.sync_file_hashed(&child, &child_rel, meta.len)),
                    EntryKind::Other => Ok(()),
                };
                if let Err(err) = result {
                    self.tolerate(&child, err)?;
                }
            }
        }
        Ok(reachable)
    }

    fn schedule_subdir(&self, rel: &Path, lazy: bool, stack: &mut Vec<PathBuf>) {
        if lazy && self.ctx.source_filter.explicitly_includes_dir(rel) {
            if let Err(err) = ensure_target_dir_prepared(&self.ctx, rel) {
                self.ctx.stats.record_error(err.to_string());
                warn!("cannot materialize '{}': {err}", rel.display());
                return;
            }
        }
        if self.ctx.source_filter.is_excluded_subtree_dir(rel) {
            trace!("pruned subtree: {}", rel.display());
            if !lazy {
                if let Err(err) = ensure_target_dir_prepared(&self.ctx, rel) {
                    self.ctx.stats.record_error(err.to_string());
                    warn!("cannot materialize '{}': {err}", rel.display());
                }
            }
            return;
        }
        if self
            .ctx
            .task
            .max_depth
            .is_some_and(|max| rel.components().count() as u32 > max)
        {
            return;
        }
        stack.push(rel.to_path_buf());
    }

    fn prepare_parent(&self, rel: &Path) -> Result<()> {
        if self.ctx.lazy_dirs() {
            if let Some(parent) = rel.parent() {
                ensure_target_dir_prepared(&self.ctx, parent)?;
            }
        }
        Ok(())
    }

    fn tolerate(&self, path: &Path, err: Error) -> Result<()> {
        self.ctx.stats.record_error(err.to_string());
        if err.is_tolerable(
            self.ctx.task.ignore_errors,
            self.ctx.task.ignore_symlink_errors,
        ) {
            warn!("ignoring error on '{}': {err}", path.display());
            Ok(())
        } else {
            Err(err)
        }
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            copy_acl: self.ctx.task.copy_acl,
            allow_reading_open_files: self.ctx.task.allow_reading_open_files,
        }
    }

    /// Run the session until a signal (or a fatal error) stops it.
    ///
    /// Registers non-recursive watches on every reachable directory,
    /// mirrors the initial tree, then dispatches events as they arrive.
    pub fn run(self, signal: Option<Arc<AtomicBool>>) -> Result<SyncReport> {
        let (event_tx, event_rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<notify::Event>| {
                let _ = event_tx.send(event);
            },
            notify::Config::default(),
        )
        .map_err(|e| Error::watch(e.to_string()))?;

        let dirs = self.mirror_or_abort()?;
        for dir in &dirs {
            watch_dir(&mut watcher, dir, &self.ctx);
        }
        info!(
            "watching '{}' ({} directories)",
            self.ctx.task.source.display(),
            dirs.len()
        );

        let mut aborted_by: Option<Error> = None;
        loop {
            match event_rx.recv_timeout(EVENT_POLL) {
                Ok(Ok(event)) => {
                    if event.need_rescan() {
                        warn!("watch event queue overflowed, some changes may be missed");
                        continue;
                    }
                    let Some(change) = classify(&event.kind) else {
                        continue;
                    };
                    for path in &event.paths {
                        match self.dispatch(change, path) {
                            Ok(new_dirs) => {
                                if change == WatchChange::Removed {
                                    let _ = watcher.unwatch(path);
                                }
                                for dir in &new_dirs {
                                    watch_dir(&mut watcher, dir, &self.ctx);
                                }
                            }
                            Err(err) => {
                                self.ctx.stats.record_error(err.to_string());
                                if err.is_tolerable(
                                    self.ctx.task.ignore_errors,
                                    self.ctx.task.ignore_symlink_errors,
                                ) {
                                    warn!("ignoring error on '{}': {err}", path.display());
                                } else {
                                    aborted_by = Some(err);
                                }
                            }
                        }
                    }
                    if aborted_by.is_some() {
                        break;
                    }
                }
                Ok(Err(err)) => {
                    // Stream-level watcher errors are logged but do not
                    // stop the session; the OS watcher keeps running.
                    self.ctx.stats.record_error(err.to_string());
                    warn!("watcher error: {err}");
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(sig) = &signal {
                        if sig.load(Ordering::SeqCst) {
                            info!("signal received, stopping watch session");
                            self.ctx.abort.abort_by_signal();
                            aborted_by = Some(Error::Interrupted);
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    aborted_by = Some(Error::watch("watcher event stream closed"));
                    break;
                }
            }
        }

        Ok(SyncReport {
            stats: self.ctx.stats.snapshot(),
            aborted_by,
        })
    }

    /// Initial mirror, with fatal errors reported through stats first
    fn mirror_or_abort(&self) -> Result<Vec<PathBuf>> {
        match self.initial_mirror() {
            Ok(dirs) => Ok(dirs),
            Err(err) => {
                self.ctx.stats.record_error(err.to_string());
                Err(err)
            }
        }
    }
}

/// Map a notify event kind onto the dispatcher's categories. Access
/// events carry no mirrorable change; unclassified kinds are treated as
/// modifications so no change is missed.
fn classify(kind: &notify::EventKind) -> Option<WatchChange> {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => Some(WatchChange::Created),
        EventKind::Modify(_) => Some(WatchChange::Modified),
        EventKind::Remove(_) => Some(WatchChange::Removed),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(WatchChange::Modified),
    }
}

/// Register a non-recursive watch, recording (but tolerating) failures:
/// a directory can disappear between discovery and registration.
fn watch_dir(watcher: &mut RecommendedWatcher, dir: &Path, ctx: &SyncContext) {
    if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        ctx.stats.record_error(err.to_string());
        warn!("cannot watch '{}': {err}", dir.display());
    }
}
