//! Worker-pool lifecycle: spawn, supervise, abort, force-terminate
//!
//! The lifecycle spawns the configured number of worker threads, then
//! polls for completion with a bounded wait. Each wait timeout re-checks
//! the stall watchdog and the signal flag; any failure raises the shared
//! abort flag and shuts the queue down, and a grace period bounds how
//! long a worker stuck in uninterruptible I/O can delay shutdown.
//! Statistics are reported even when the run aborts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use velosync_config::SyncTask;
use velosync_types::{Error, Result, StatsSnapshot};

use crate::queue::DirJob;
use crate::worker::{run_worker, SyncContext};

/// Supervision poll interval
const COMPLETION_POLL: Duration = Duration::from_millis(100);
/// How long aborted workers get to exit before the pool detaches them
const FORCE_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Cooperative abort flag shared by a task's workers.
///
/// Signal-triggered aborts are tracked separately so the summary can
/// distinguish an interrupt from an operational failure.
#[derive(Debug, Default)]
pub struct AbortState {
    aborted: AtomicBool,
    signaled: AtomicBool,
}

impl AbortState {
    /// Create a clear abort state
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the abort flag
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Raise the abort flag due to SIGINT/SIGTERM
    pub fn abort_by_signal(&self) {
        self.signaled.store(true, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Whether the task should stop
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Whether the abort came from a signal
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }
}

/// Outcome of one task run: statistics plus the terminating condition,
/// if any. Stats are accumulated up to the abort point.
#[derive(Debug)]
pub struct SyncReport {
    /// Accumulated run statistics
    pub stats: StatsSnapshot,
    /// The condition that aborted the run, `None` on success
    pub aborted_by: Option<Error>,
}

impl SyncReport {
    /// Whether the run completed without aborting
    pub fn is_success(&self) -> bool {
        self.aborted_by.is_none()
    }
}

/// Install SIGINT/SIGTERM handlers that raise the returned flag.
///
/// Registered once per process; the flag is shared across tasks so a
/// signal interrupts whichever task is running.
pub fn register_signal_flag() -> std::io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
    Ok(flag)
}

/// Run one sync task to completion (or abort).
///
/// Fatal configuration problems surface as `Err` before any work starts;
/// everything after that is reported through the [`SyncReport`] so the
/// accumulated statistics survive an abort.
pub fn run_task(task: SyncTask, signal: Option<Arc<AtomicBool>>) -> Result<SyncReport> {
    let task = task.validated()?;
    let threads = task.threads;
    let stall_timeout = task.stall_timeout();
    let dry_run = task.dry_run;
    info!(
        "syncing '{}' -> '{}' with {threads} worker(s){}",
        task.source.display(),
        task.target.display(),
        if dry_run { " (dry run)" } else { "" }
    );

    let ctx = SyncContext::new(task)?;
    if !dry_run {
        std::fs::create_dir_all(&ctx.task.target)
            .map_err(|e| Error::io(&ctx.task.target, e))?;
    }
    ctx.queue.add(DirJob {
        source_dir: ctx.task.source.clone(),
        rel_dir: std::path::PathBuf::new(),
    });

    let (result_tx, result_rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(threads);
    for i in 0..threads {
        let ctx = Arc::clone(&ctx);
        let tx = result_tx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("sync-worker-{i}"))
            .spawn(move || {
                let result = run_worker(&ctx);
                let _ = tx.send(result);
            })
            .map_err(|e| Error::config(format!("cannot spawn worker thread: {e}")))?;
        handles.push(handle);
    }
    drop(result_tx);

    let mut finished = 0;
    let mut worker_error: Option<Error> = None;
    let mut stall_error: Option<Error> = None;
    let mut force_deadline: Option<Instant> = None;

    while finished < threads {
        match result_rx.recv_timeout(COMPLETION_POLL) {
            Ok(result) => {
                finished += 1;
                if let Err(err) = result {
                    worker_error.get_or_insert(err);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(sig) = &signal {
                    if sig.load(Ordering::SeqCst) && !ctx.abort.is_signaled() {
                        warn!("signal received, aborting task");
                        ctx.abort.abort_by_signal();
                        ctx.queue.shut_down();
                    }
                }
                if !ctx.abort.is_aborted() {
                    if let Err(err) = ctx.progress.check_stalled(stall_timeout) {
                        error!("{err}");
                        stall_error = Some(err);
                        ctx.abort.abort();
                        ctx.queue.shut_down();
                    }
                }
                if ctx.abort.is_aborted() {
                    let deadline =
                        *force_deadline.get_or_insert_with(|| Instant::now() + FORCE_SHUTDOWN_GRACE);
                    if Instant::now() > deadline {
                        warn!(
                            "{} worker(s) did not exit within the grace period, detaching",
                            threads - finished
                        );
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if finished == threads {
        for handle in handles {
            let _ = handle.join();
        }
    }
    // Otherwise stuck workers are detached by dropping their handles;
    // the queue is already shut down so they exit on their next poll.

    let stats = ctx.stats.snapshot();
    let aborted_by = if let Some(err) = stall_error {
        Some(err)
    } else if ctx.abort.is_signaled() {
        Some(Error::Interrupted)
    } else {
        worker_error
    };

    if let Some(err) = &aborted_by {
        warn!("task aborted: {err}");
    } else {
        info!(
            "task complete: {} dir(s) scanned, {} file(s) copied, {} entr(ies) deleted",
            stats.dirs_scanned, stats.files_copied, stats.entries_deleted
        );
    }

    Ok(SyncReport { stats, aborted_by })
}
