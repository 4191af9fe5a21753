//! VeloSync - one-way directory synchronizer
//!
//! Mirrors a source tree onto a target tree under an ordered
//! include/exclude glob filter language, either once (`sync`) or
//! continuously from filesystem events (`watch`).

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

use velosync_config::{SyncTask, TaskFile};
use velosync_engine::{register_signal_flag, run_task, SyncReport};
use velosync_types::Error;
use velosync_watch::WatchSession;

mod display;

use display::{display_error, display_report};

/// VeloSync - one-way directory synchronizer
#[derive(Parser)]
#[command(
    name = "velosync",
    version = env!("CARGO_PKG_VERSION"),
    about = "One-way directory synchronizer with filters and watch mode",
    long_about = "VeloSync mirrors a source directory onto a target directory.\n\
                  Entries are selected with ordered in:/ex: glob filters where\n\
                  the first matching rule wins. The sync command runs once;\n\
                  the watch command keeps the mirror current from filesystem\n\
                  events."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the source tree onto the target once
    Sync {
        #[command(flatten)]
        args: TaskArgs,
    },
    /// Mirror once, then keep the target current from filesystem events
    Watch {
        #[command(flatten)]
        args: TaskArgs,
    },
}

/// Task options shared by both subcommands. With `--tasks` the YAML file
/// supplies the task list and the flags below are applied on top of
/// every task in it.
#[derive(Args, Clone)]
struct TaskArgs {
    /// Source directory
    source: Option<PathBuf>,

    /// Target directory
    target: Option<PathBuf>,

    /// YAML task file; its tasks run sequentially
    #[arg(long, value_name = "FILE", conflicts_with_all = ["source", "target"])]
    tasks: Option<PathBuf>,

    /// Filter spec "in:<glob>" or "ex:<glob>"; repeatable, first match wins
    #[arg(short, long = "filter", value_name = "SPEC")]
    filters: Vec<String>,

    /// Log decisions without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Delete target entries with no source counterpart
    #[arg(long)]
    delete: bool,

    /// Also delete target entries matched by an exclude rule
    #[arg(long)]
    delete_excluded: bool,

    /// Skip copying when the source file is older than the target
    #[arg(long)]
    exclude_older_files: bool,

    /// Tolerate per-entry I/O errors and keep going
    #[arg(long)]
    ignore_errors: bool,

    /// Tolerate symlink-creation failures and keep going
    #[arg(long)]
    ignore_symlink_errors: bool,

    /// Copy permissions along with file contents
    #[arg(long)]
    copy_acl: bool,

    /// Allow reading files opened by other processes
    #[arg(long)]
    allow_reading_open_files: bool,

    /// Exclude hidden entries
    #[arg(long)]
    exclude_hidden_files: bool,

    /// Exclude system entries
    #[arg(long)]
    exclude_system_files: bool,

    /// Exclude entries that are both hidden and system
    #[arg(long)]
    exclude_hidden_system_files: bool,

    /// Exclude symlinks that resolve to neither file nor directory
    #[arg(long)]
    exclude_other_links: bool,

    /// Maximum directory depth below the source root
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Only sync files modified at or after this RFC 3339 instant
    #[arg(long, value_name = "WHEN")]
    modified_from: Option<DateTime<Utc>>,

    /// Only sync files modified at or before this RFC 3339 instant
    #[arg(long, value_name = "WHEN", conflicts_with = "modified_before")]
    modified_until: Option<DateTime<Utc>>,

    /// Only sync files modified strictly before this RFC 3339 instant
    #[arg(long, value_name = "WHEN")]
    modified_before: Option<DateTime<Utc>>,

    /// Number of worker threads (defaults to the CPU count)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Stall timeout in milliseconds, 0 disables stall detection
    #[arg(long, value_name = "MS")]
    stall_timeout: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.quiet, cli.verbose)?;
    info!("VeloSync v{} starting", env!("CARGO_PKG_VERSION"));

    let signal = register_signal_flag()?;

    let ok = match cli.command {
        Commands::Sync { args } => sync_command(&args, &signal)?,
        Commands::Watch { args } => watch_command(&args, &signal)?,
    };
    if !ok {
        bail!("one or more tasks did not complete");
    }
    Ok(())
}

fn init_logging(debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// Run the task list sequentially; returns whether every task completed.
fn sync_command(args: &TaskArgs, signal: &Arc<AtomicBool>) -> Result<bool> {
    let mut all_ok = true;
    for task in merged_tasks(args)? {
        let name = task.display_name();
        let dry_run = task.dry_run;
        let report = run_task(task, Some(Arc::clone(signal)))?;
        display_report(&name, &report, dry_run);
        let interrupted = matches!(report.aborted_by, Some(Error::Interrupted));
        all_ok &= report.is_success();
        if interrupted {
            // The signal applies to the whole run, not just this task.
            break;
        }
    }
    Ok(all_ok)
}

/// Run one watch session per task concurrently until a signal stops
/// them. A signal-stopped session counts as a clean exit.
fn watch_command(args: &TaskArgs, signal: &Arc<AtomicBool>) -> Result<bool> {
    let mut handles = Vec::new();
    for task in merged_tasks(args)? {
        let name = task.display_name();
        let dry_run = task.dry_run;
        let session = WatchSession::new(task)?;
        let signal = Arc::clone(signal);
        let handle = std::thread::spawn(move || session.run(Some(signal)));
        handles.push((name, dry_run, handle));
    }

    let mut all_ok = true;
    for (name, dry_run, handle) in handles {
        match handle.join() {
            Ok(Ok(report)) => {
                display_report(&name, &report, dry_run);
                all_ok &= watch_outcome_ok(&report);
            }
            Ok(Err(err)) => {
                display_error(&format!("task '{name}' failed: {err}"));
                all_ok = false;
            }
            Err(_) => {
                display_error(&format!("task '{name}' panicked"));
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

fn watch_outcome_ok(report: &SyncReport) -> bool {
    match &report.aborted_by {
        None | Some(Error::Interrupted) => true,
        Some(_) => false,
    }
}

/// Resolve the task list: the YAML file's tasks, or one ad-hoc task from
/// the positional roots; CLI flags are layered on top either way.
fn merged_tasks(args: &TaskArgs) -> Result<Vec<SyncTask>> {
    let mut tasks = if let Some(path) = &args.tasks {
        TaskFile::load(path)?.tasks
    } else {
        let (Some(source), Some(target)) = (args.source.clone(), args.target.clone()) else {
            bail!("either SOURCE and TARGET or --tasks <file> must be given");
        };
        vec![SyncTask::new(source, target)]
    };
    for task in &mut tasks {
        apply_overrides(task, args);
    }
    Ok(tasks)
}

/// Boolean flags accumulate, options override, filters append after the
/// task file's own filters.
fn apply_overrides(task: &mut SyncTask, args: &TaskArgs) {
    task.filters.extend(args.filters.iter().cloned());
    task.dry_run |= args.dry_run;
    task.delete |= args.delete;
    task.delete_excluded |= args.delete_excluded;
    task.exclude_older_files |= args.exclude_older_files;
    task.ignore_errors |= args.ignore_errors;
    task.ignore_symlink_errors |= args.ignore_symlink_errors;
    task.copy_acl |= args.copy_acl;
    task.allow_reading_open_files |= args.allow_reading_open_files;
    task.exclude_hidden_files |= args.exclude_hidden_files;
    task.exclude_system_files |= args.exclude_system_files;
    task.exclude_hidden_system_files |= args.exclude_hidden_system_files;
    task.exclude_other_links |= args.exclude_other_links;
    if args.max_depth.is_some() {
        task.max_depth = args.max_depth;
    }
    if args.modified_from.is_some() {
        task.modified_from = args.modified_from;
    }
    if args.modified_until.is_some() {
        task.modified_until = args.modified_until;
    }
    if args.modified_before.is_some() {
        task.modified_before = args.modified_before;
    }
    if let Some(threads) = args.threads {
        task.threads = threads;
    }
    if let Some(stall_timeout) = args.stall_timeout {
        task.stall_timeout_ms = stall_timeout;
    }
}
