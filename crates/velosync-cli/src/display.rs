//! Styled terminal output for run summaries

use console::style;
use std::time::Duration;
use velosync_engine::SyncReport;

/// Print the per-task summary. Printed even when the run aborted, so the
/// work done up to that point is visible.
pub fn display_report(name: &str, report: &SyncReport, dry_run: bool) {
    let stats = &report.stats;
    println!();
    if dry_run {
        println!(
            "{} {}",
            style(name).bold().underlined(),
            style("(dry run)").yellow()
        );
    } else {
        println!("{}", style(name).bold().underlined());
    }
    println!(
        "  Scanned: {} directories, {} files",
        style(stats.dirs_scanned).cyan(),
        style(stats.files_scanned).cyan()
    );
    println!(
        "  Copied: {} files, {} in {}",
        style(stats.files_copied).green(),
        style(format_bytes(stats.bytes_copied)).green(),
        style(format_duration(stats.copy_duration)).blue()
    );
    println!(
        "  Deleted: {} entries, {} in {}",
        style(stats.entries_deleted).yellow(),
        style(format_bytes(stats.bytes_deleted)).yellow(),
        style(format_duration(stats.delete_duration)).blue()
    );
    if !stats.errors.is_empty() {
        println!("  Errors: {}", style(stats.errors.len()).red());
        for message in &stats.errors {
            println!("    {} {}", style("✗").red(), style(message).red());
        }
    }
    match &report.aborted_by {
        Some(err) => println!(
            "  {} {}",
            style("✗ aborted:").red().bold(),
            style(err).red()
        ),
        None => println!("  {}", style("✓ complete").green().bold()),
    }
}

/// Display an error message with proper formatting
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled_to_the_right_unit() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn durations_use_coarser_units_as_they_grow() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
