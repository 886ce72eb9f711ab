//! Human-readable rendering of run, plan, snapshot and scan reports.

#![allow(missing_docs)]

use std::fmt::Write as _;

use colored::Colorize;

use crate::core::tier::{CleanupTier, PrivilegeLevel};
use crate::monitor::snapshot::{DiskUsageSnapshot, SnapshotDiff};
use crate::reclaim::large_files::LargeFileReport;
use crate::reclaim::matrix::{Disposition, PlannedTask};
use crate::reclaim::orchestrator::{RunReport, TaskOutcome, TaskResult};

/// Binary-prefixed size with one decimal, e.g. `1.5 GB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Current usage of every fixed volume.
#[must_use]
pub fn format_snapshot(snapshot: &DiskUsageSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Fixed volumes at {}:\n",
        snapshot.captured_at.format("%Y-%m-%d %H:%M:%S")
    );
    if snapshot.volumes.is_empty() {
        let _ = writeln!(out, "  (no fixed volumes reported)");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<24} {:<8} {:>12} {:>12} {:>7}",
        "Volume", "FS", "Total", "Free", "Free%"
    );
    for volume in &snapshot.volumes {
        let _ = writeln!(
            out,
            "  {:<24} {:<8} {:>12} {:>12} {:>6.1}%",
            volume.id,
            volume.file_system,
            format_bytes(volume.total_bytes),
            format_bytes(volume.free_bytes),
            volume.free_pct()
        );
    }
    out
}

/// Before/after table.
#[must_use]
pub fn format_diff(diff: &SnapshotDiff) -> String {
    let mut out = String::new();
    if diff.volumes.is_empty() {
        let _ = writeln!(out, "  (volume usage unavailable)");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<24} {:>12} {:>12} {:>12} {:>15}",
        "Volume", "Free before", "Free after", "Freed", "Free%"
    );
    for volume in &diff.volumes {
        let _ = writeln!(
            out,
            "  {:<24} {:>12} {:>12} {:>12} {:>6.1}% -> {:>4.1}%",
            volume.id,
            format_bytes(volume.free_before),
            format_bytes(volume.free_after),
            format_signed_bytes(volume.freed_bytes),
            volume.free_pct_before,
            volume.free_pct_after
        );
    }
    let _ = writeln!(out, "\n  Total freed: {}", format_signed_bytes(diff.total_freed_bytes));
    out
}

/// Task matrix with what a run at `tier` and `privilege` would do.
#[must_use]
pub fn format_plan(plan: &[PlannedTask<'_>], tier: CleanupTier, privilege: PrivilegeLevel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cleanup plan for tier {tier} ({privilege} privileges):\n");
    for planned in plan {
        let icon = match planned.disposition {
            Disposition::Run => "RUN ".green().bold(),
            Disposition::AboveTier => "TIER".dimmed(),
            Disposition::NeedsElevation => "ADMN".yellow(),
            Disposition::OptedOut => "ASK ".cyan(),
        };
        let task = planned.task;
        let _ = writeln!(
            out,
            "  [{icon}] {:<26} {:<8} {}",
            task.id,
            task.min_tier.as_str(),
            task.description
        );
        let _ = writeln!(out, "         {} {}", task.action.kind(), task.action.target());
    }
    let running = plan
        .iter()
        .filter(|p| p.disposition == Disposition::Run)
        .count();
    let _ = writeln!(out, "\n  {running} of {} task(s) would run.", plan.len());
    out
}

/// Summary of a completed run.
#[must_use]
pub fn format_run_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "reclaim run on {} (tier {}, {} privileges):\n",
        report.host_name, report.tier, report.privilege
    );

    for task in &report.tasks {
        if task.disposition == Disposition::AboveTier {
            continue;
        }
        let (icon, detail) = describe_task(task);
        let _ = writeln!(out, "  [{icon}] {:<26} {detail}", task.id);
    }

    if let Some(stop) = &report.service.stop {
        let _ = writeln!(out, "\n  Service {}: stop {stop:?}", report.service.name);
        if let Some(start) = &report.service.start {
            let _ = writeln!(out, "  Service {}: start {start:?}", report.service.name);
        }
    }

    let totals = &report.totals;
    let _ = writeln!(
        out,
        "\n  Removed {} entries ({}); {} skipped across {} task(s).",
        totals.entries_removed,
        format_bytes(totals.bytes_freed),
        totals.entries_skipped,
        totals.tasks_run
    );

    if let Some(large) = &report.large_files {
        out.push('\n');
        out.push_str(&format_large_files(large));
    }

    let _ = writeln!(out, "\nDisk usage:\n");
    out.push_str(&format_diff(&report.diff));
    let _ = writeln!(out, "\n  Elapsed: {:.1}s", report.elapsed_secs);
    let _ = writeln!(out, "  Log:     {}", report.log_path.display());
    out
}

/// Large-file scan listing.
#[must_use]
pub fn format_large_files(report: &LargeFileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Large files under {}:", report.root.display());
    if report.files.is_empty() {
        let _ = writeln!(out, "  (none found)");
        return out;
    }
    for file in &report.files {
        let _ = writeln!(out, "  {:>10}  {}", format_bytes(file.bytes), file.path.display());
    }
    if report.truncated > 0 {
        let _ = writeln!(out, "  ... and {} more", report.truncated);
    }
    let _ = writeln!(out, "  Total listed: {}", format_bytes(report.total_bytes()));
    out
}

fn describe_task(task: &TaskOutcome) -> (colored::ColoredString, String) {
    match (&task.result, task.disposition) {
        (Some(TaskResult::Removal(removal)), _) => {
            let hard_skips = removal.skipped.iter().filter(|s| !s.reason.is_benign()).count();
            let icon = if hard_skips > 0 {
                "WARN".yellow()
            } else {
                "DONE".green()
            };
            let detail = format!(
                "removed {} ({}), skipped {}",
                removal.removed.len(),
                format_bytes(removal.bytes_freed),
                removal.skipped.len()
            );
            (icon, detail)
        }
        (Some(TaskResult::Completed { program, .. }), _) => ("DONE".green(), format!("{program} completed")),
        (Some(TaskResult::NotPresent { program, .. }), _) => {
            ("SKIP".dimmed(), format!("{program}: nothing to manage"))
        }
        (Some(TaskResult::ToolMissing { program }), _) => {
            ("SKIP".dimmed(), format!("{program} not installed"))
        }
        (Some(TaskResult::ExitedWithError { program, exit_code, .. }), _) => (
            "FAIL".red(),
            format!(
                "{program} exited with {}",
                exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
            ),
        ),
        (Some(TaskResult::LaunchFailed { program, details }), _) => {
            ("FAIL".red(), format!("{program}: {details}"))
        }
        (None, Disposition::NeedsElevation) => ("ADMN".yellow(), "requires elevation".to_string()),
        (None, _) => ("SKIP".dimmed(), "left out".to_string()),
    }
}

/// [`format_bytes`] keeping the sign of a delta.
#[must_use]
pub fn format_signed_bytes(bytes: i64) -> String {
    let magnitude = format_bytes(bytes.unsigned_abs());
    if bytes < 0 {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::VolumeUsage;
    use crate::reclaim::matrix::{CleanupTask, TaskMatrix};
    use chrono::Local;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
        assert_eq!(format_signed_bytes(-1024), "-1.0 KB");
    }

    #[test]
    fn snapshot_table_lists_each_volume() {
        let snapshot = DiskUsageSnapshot {
            captured_at: Local::now(),
            volumes: vec![VolumeUsage {
                id: "/srv".to_string(),
                mount_point: "/srv".into(),
                file_system: "xfs".to_string(),
                total_bytes: 4096,
                free_bytes: 1024,
            }],
        };
        let text = format_snapshot(&snapshot);
        assert!(text.contains("/srv"));
        assert!(text.contains("25.0%"));
        assert!(format_snapshot(&DiskUsageSnapshot::empty()).contains("no fixed volumes"));
    }

    #[test]
    fn plan_counts_running_tasks() {
        let matrix = TaskMatrix::new(vec![
            CleanupTask::age_filtered("user-temp", "Temp", CleanupTier::Light, "{temp}"),
            CleanupTask::unconditional("crash", "Crash", CleanupTier::Standard, "{root}/crash")
                .elevated(),
        ])
        .unwrap();
        let plan = matrix.plan(CleanupTier::Deep, PrivilegeLevel::Standard, false);
        let text = format_plan(&plan, CleanupTier::Deep, PrivilegeLevel::Standard);
        assert!(text.contains("1 of 2 task(s) would run."));
        assert!(text.contains("unconditional {root}/crash"));
    }
}
