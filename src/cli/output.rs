use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::cleaner::{
    CleanEvent, DeletionMode, PurgeReport, RestoreReport, RunStatus, RunSummary, SessionSummary,
};
use crate::common::format::{self, format_path, format_size, format_versions};

const PROGRESS_STEPS: u64 = 1000;

/// Events collected from one clean, in the order they arrived
#[derive(Debug, Default)]
pub struct EventLog {
    pub cleaned: Vec<(String, String)>,
    pub errors: Vec<(PathBuf, String)>,
}

impl EventLog {
    pub fn record(&mut self, event: CleanEvent) {
        match event {
            CleanEvent::PackageCleaned { package, version } => {
                self.cleaned.push((package, version))
            }
            CleanEvent::Error { path, cause } => self.errors.push((path, cause.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cleaned.is_empty() && self.errors.is_empty()
    }

    /// Human-readable error lines
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|(path, cause)| format!("{}: {}", format_path(path), cause))
            .collect()
    }
}

/// Progress bar fed by the cleaner's fractional progress
pub struct CleanProgress {
    pb: Option<ProgressBar>,
}

impl CleanProgress {
    pub fn new(show: bool) -> Self {
        let pb = show.then(|| {
            let pb = ProgressBar::new(PROGRESS_STEPS);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:40.cyan/blue}] {percent:>3}% Sweeping... {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("━━░"),
            );
            pb
        });
        Self { pb }
    }

    pub fn set(&self, fraction: f64) {
        if let Some(ref pb) = self.pb {
            pb.set_position((fraction.clamp(0.0, 1.0) * PROGRESS_STEPS as f64) as u64);
        }
    }

    /// Print a line above the bar, or plainly when there is no bar
    pub fn cleaned(&self, package: &str, version: &str) {
        let line = format!("  {} {} {}", "✗".red(), package, version.dimmed());
        match self.pb {
            Some(ref pb) => {
                pb.set_message(format::truncate(package, 30));
                pb.println(line);
            }
            None => println!("{}", line),
        }
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }
    }
}

/// Print the outcome of a clean in human-readable form
pub fn print_clean_report(
    root: &Path,
    mode: DeletionMode,
    summary: &RunSummary,
    log: &EventLog,
    session_id: Option<&str>,
    duration_secs: f64,
) {
    println!();
    println!("  {}  nuget-sweep", "🧹");
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  {}  •  {} packages  •  accessed before {}",
        format_path(root).cyan(),
        summary.packages_total,
        format::format_time(summary.threshold).dimmed(),
    );
    println!("{}", "─".repeat(60).dimmed());
    println!();

    match summary.status {
        RunStatus::NothingToClean => {
            println!("  {} No packages folder, nothing to clean.", "✨");
        }
        RunStatus::Cancelled => {
            println!("  {} Cancelled after {} packages.", "✗".red(), summary.packages_processed);
        }
        RunStatus::Completed | RunStatus::Aborted if log.is_empty() => {
            println!("  {} Cache is already tidy.", "✨");
        }
        RunStatus::Completed | RunStatus::Aborted => {
            let verb = match mode {
                DeletionMode::Recoverable => "Staged",
                DeletionMode::Permanent => "Removed",
            };
            println!(
                "  {} {} {} in {}",
                "✓".green(),
                verb.bold(),
                format_versions(log.cleaned.len()).cyan(),
                format::format_duration(duration_secs),
            );
        }
    }

    if let Some(sid) = session_id {
        println!("  {} Session: {}", "💾", sid.cyan());
        println!(
            "  {} Undo with: {}",
            "💡",
            format!("nuget-sweep restore --session {}", sid).cyan()
        );
    }

    let errors = log.error_messages();
    if !errors.is_empty() {
        println!();
        println!("  {} {} errors:", "⚠".yellow(), errors.len());
        for (i, err) in errors.iter().enumerate().take(10) {
            println!("    {} {}", format!("{}.", i + 1).dimmed(), err.dimmed());
        }
        if errors.len() > 10 {
            println!("    ... and {} more", (errors.len() - 10).to_string().dimmed());
        }
    }
    println!();
}

/// Machine-readable clean report
pub fn clean_json(
    root: &Path,
    mode: DeletionMode,
    summary: &RunSummary,
    log: &EventLog,
    session_id: Option<&str>,
) -> serde_json::Value {
    let threshold: chrono::DateTime<chrono::Utc> = summary.threshold.into();
    serde_json::json!({
        "root": root,
        "mode": mode.to_string(),
        "status": summary.status.to_string(),
        "threshold": threshold.to_rfc3339(),
        "packages": summary.packages_total,
        "versions_inspected": summary.versions_inspected,
        "session_id": session_id,
        "cleaned": log.cleaned.iter().map(|(package, version)| {
            serde_json::json!({ "package": package, "version": version })
        }).collect::<Vec<_>>(),
        "errors": log.errors.iter().map(|(path, message)| {
            serde_json::json!({ "path": path, "message": message })
        }).collect::<Vec<_>>(),
    })
}

/// One line: cleaned count and error count
pub fn print_clean_quiet(log: &EventLog) {
    println!("{}  {}", log.cleaned.len(), log.errors.len());
}

/// Print the list of staging sessions
pub fn print_sessions(sessions: &[SessionSummary]) {
    println!();
    println!("  {} Staging Sessions", "📦");
    println!("{}", "─".repeat(80).dimmed());
    println!();

    if sessions.is_empty() {
        println!("  No sessions found in staging area.");
        println!();
        return;
    }

    println!(
        "  {:<24} {:>10} {:>10}  {}",
        "Session ID".dimmed(),
        "Size".dimmed(),
        "Versions".dimmed(),
        "Cache".dimmed(),
    );
    println!("  {}", "─".repeat(76).dimmed());

    for session in sessions {
        println!(
            "  {:<24} {:>10} {:>10}  {}",
            session.info.session_id.cyan(),
            format_size(session.staged_size),
            session.versions,
            format_path(&session.info.cache_root).dimmed(),
        );
    }
    println!();
}

pub fn print_restore_report(report: &RestoreReport) {
    println!();
    println!(
        "  {} Restored {}",
        "✓".green(),
        format_versions(report.restored.len()).cyan(),
    );
    println!("  {} Session: {}", "📦", report.session_id.cyan());

    if !report.errors.is_empty() {
        println!();
        println!(
            "  {} {} errors during restore:",
            "⚠".yellow(),
            report.errors.len()
        );
        for err in report.errors.iter().take(5) {
            println!("    {} {}", "→".dimmed(), err.dimmed());
        }
    }
    println!();
}

pub fn print_purge_report(report: &PurgeReport) {
    println!();
    if report.purged_sessions.is_empty() {
        println!("  {} No sessions to purge.", "✓".green());
    } else {
        println!(
            "  {} Purged {} sessions, freed {}",
            "🔥",
            report.purged_sessions.len().to_string().cyan(),
            format_size(report.bytes_freed),
        );
    }

    if !report.errors.is_empty() {
        println!();
        for err in &report.errors {
            println!("    {} {}", "→".dimmed(), err.dimmed());
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_event_log_keeps_arrival_order() {
        let mut log = EventLog::default();
        log.record(CleanEvent::PackageCleaned {
            package: "b".into(),
            version: "1.0".into(),
        });
        log.record(CleanEvent::Error {
            path: PathBuf::from("/cache/packages/c"),
            cause: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        log.record(CleanEvent::PackageCleaned {
            package: "a".into(),
            version: "2.0".into(),
        });

        assert_eq!(
            log.cleaned,
            vec![
                ("b".to_string(), "1.0".to_string()),
                ("a".to_string(), "2.0".to_string())
            ]
        );
        assert_eq!(log.error_messages(), vec!["/cache/packages/c: denied"]);
    }

    #[test]
    fn test_clean_json_shape() {
        let mut log = EventLog::default();
        log.record(CleanEvent::PackageCleaned {
            package: "serilog".into(),
            version: "2.10.0".into(),
        });
        let summary = RunSummary {
            status: RunStatus::Completed,
            threshold: UNIX_EPOCH,
            packages_total: 3,
            packages_processed: 3,
            versions_inspected: 5,
            cleaned: 1,
            errors: 0,
        };

        let json = clean_json(
            Path::new("/cache"),
            DeletionMode::Permanent,
            &summary,
            &log,
            None,
        );
        assert_eq!(json["status"], "completed");
        assert_eq!(json["mode"], "permanent");
        assert_eq!(json["packages"], 3);
        assert_eq!(json["threshold"], "1970-01-01T00:00:00+00:00");
        assert_eq!(json["cleaned"][0]["package"], "serilog");
        assert!(json["errors"].as_array().unwrap().is_empty());
    }
}
