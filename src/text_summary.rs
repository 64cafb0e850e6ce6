//! Text summary builders for CLI output.
//!
//! Formats flow results, backups, installs and processes as human-readable lines.

use crate::backup::DeleteReport;
use crate::model::{BackupEntry, FlowResult, StepDetail, StepResult, TargetInstall, TargetProcess};
use crate::options::RunOptions;
use crate::orchestrator::DevTestOutcome;
use std::time::Duration;
use time::OffsetDateTime;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_age(created_at: OffsetDateTime, now: OffsetDateTime) -> String {
    let secs = (now - created_at).whole_seconds().max(0) as u64;
    // Minute resolution is plenty for a listing.
    let rounded = Duration::from_secs(secs - secs % 60);
    if rounded.is_zero() {
        "just now".to_string()
    } else {
        format!("{} ago", humantime::format_duration(rounded))
    }
}

fn detail_line(detail: &StepDetail) -> Option<String> {
    match detail {
        StepDetail::CloseTarget { closed_clients } if !closed_clients.is_empty() => {
            Some(format!("closed: {}", closed_clients.join(", ")))
        }
        StepDetail::Backup { entry, pruned, .. } => {
            let mut line = format!("snapshot {} ({})", entry.name, format_bytes(entry.size_bytes));
            if !pruned.is_empty() {
                line.push_str(&format!(", pruned {}", pruned.join(", ")));
            }
            Some(line)
        }
        StepDetail::SyncRepo { repo_path } => Some(format!("source: {}", repo_path.display())),
        StepDetail::Inject { locations } => Some(format!(
            "into: {}",
            locations
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        StepDetail::DownloadThemes { downloaded } => {
            Some(format!("themes: {}", downloaded.join(", ")))
        }
        StepDetail::ReopenTarget { restarted_clients } if !restarted_clients.is_empty() => {
            Some(format!("restarted: {}", restarted_clients.join(", ")))
        }
        _ => None,
    }
}

fn step_line(label: &str, result: &StepResult) -> String {
    let status = format!("{:?}", result.status);
    match &result.message {
        Some(msg) => format!("{label:<16} {status:<10} {msg}"),
        None => format!("{label:<16} {status}"),
    }
}

/// One line per step, in pipeline order, plus step details.
pub(crate) fn build_flow_summary(result: &FlowResult) -> TextSummary {
    let mut lines = Vec::new();
    for (step, step_result) in result.iter() {
        lines.push(step_line(step.as_str(), step_result));
        if let Some(detail) = step_result.detail.as_ref().and_then(detail_line) {
            lines.push(format!("{:<16} {detail}", ""));
        }
    }
    TextSummary { lines }
}

pub(crate) fn build_backup_list(entries: &[BackupEntry]) -> TextSummary {
    if entries.is_empty() {
        return TextSummary {
            lines: vec!["No backups.".to_string()],
        };
    }
    let now = OffsetDateTime::now_utc();
    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut lines: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{:<28} {:>10}  {}",
                e.name,
                format_bytes(e.size_bytes),
                format_age(e.created_at, now)
            )
        })
        .collect();
    lines.push(format!(
        "{} backup(s), {} total",
        entries.len(),
        format_bytes(total)
    ));
    TextSummary { lines }
}

pub(crate) fn build_delete_report(report: &DeleteReport) -> TextSummary {
    let mut lines: Vec<String> = report
        .deleted
        .iter()
        .map(|name| format!("deleted {name}"))
        .collect();
    lines.extend(
        report
            .failures
            .iter()
            .map(|f| format!("failed  {}: {}", f.name, f.error)),
    );
    TextSummary { lines }
}

pub(crate) fn build_install_list(installs: &[TargetInstall]) -> TextSummary {
    if installs.is_empty() {
        return TextSummary {
            lines: vec!["No client installs detected.".to_string()],
        };
    }
    TextSummary {
        lines: installs
            .iter()
            .map(|i| format!("{:<8} {:<16} {}", i.id, i.name, i.path.display()))
            .collect(),
    }
}

pub(crate) fn build_process_list(processes: &[TargetProcess]) -> TextSummary {
    if processes.is_empty() {
        return TextSummary {
            lines: vec!["No clients running.".to_string()],
        };
    }
    TextSummary {
        lines: processes
            .iter()
            .map(|p| {
                let exe = p
                    .executable_path
                    .as_ref()
                    .map(|e| e.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!("{:>7}  {:<16} {exe}", p.pid, p.name)
            })
            .collect(),
    }
}

pub(crate) fn build_options_summary(options: &RunOptions) -> TextSummary {
    let bound = |v: Option<String>| v.unwrap_or_else(|| "unlimited".to_string());
    let mut lines = vec![
        format!("Repository:          {}", options.repo_url),
        format!("Source directory:    {}", options.repo_dir.display()),
        format!("Close before backup: {}", options.close_before_backup),
        format!(
            "Selected installs:   {}",
            if options.selected_installs.is_empty() {
                "(none)".to_string()
            } else {
                options.selected_installs.join(", ")
            }
        ),
        format!(
            "Max backups:         {}",
            bound(options.max_backup_count.map(|n| n.to_string()))
        ),
        format!(
            "Max backup size:     {}",
            bound(options.max_backup_size_mb.map(|n| format!("{n} MB")))
        ),
    ];
    for url in options.plugin_repositories() {
        lines.push(format!("Plugin repository:   {url}"));
    }
    for theme in &options.themes {
        lines.push(format!("Theme:               {} ({})", theme.id, theme.url));
    }
    TextSummary { lines }
}

pub(crate) fn build_dev_test_summary(outcome: &DevTestOutcome) -> TextSummary {
    let label = outcome.step().as_str();
    let lines = match outcome {
        DevTestOutcome::CloseTarget {
            closed_clients,
            closing_skipped,
        } => {
            if *closing_skipped {
                vec![format!("{label}: skipped (closing disabled)")]
            } else {
                vec![format!("{label}: closed [{}]", closed_clients.join(", "))]
            }
        }
        DevTestOutcome::Backup {
            source_path,
            entry,
            pruned,
            closed_clients,
            restarted_clients,
            closing_skipped,
        } => {
            let mut lines = vec![
                format!(
                    "{label}: {} -> {} ({})",
                    source_path.display(),
                    entry.path.display(),
                    format_bytes(entry.size_bytes)
                ),
                if *closing_skipped {
                    "clients: not closed".to_string()
                } else {
                    format!(
                        "clients: closed [{}], restarted [{}]",
                        closed_clients.join(", "),
                        restarted_clients.join(", ")
                    )
                },
            ];
            if !pruned.is_empty() {
                lines.push(format!("pruned: {}", pruned.join(", ")));
            }
            lines
        }
        DevTestOutcome::SyncRepo { result }
        | DevTestOutcome::Build { result }
        | DevTestOutcome::Inject { result }
        | DevTestOutcome::DownloadThemes { result }
        | DevTestOutcome::ReopenTarget { result } => {
            let mut lines = vec![step_line(label, result)];
            if let Some(detail) = result.detail.as_ref().and_then(detail_line) {
                lines.push(detail);
            }
            lines
        }
    };
    TextSummary { lines }
}
