//! `AGENT_SUMMARY.md` generation

use crate::capability::VerificationStatus;
use crate::report::RunReport;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "AGENT_SUMMARY.md";

/// Where and how to write the summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SummaryTarget {
    /// `<workspace root>/AGENT_SUMMARY.md`
    #[default]
    WorkspaceRoot,
    /// An explicit file
    Path(PathBuf),
    /// `<contexts dir>/<repo>/<KEY>/AGENT_SUMMARY.md`, keeping earlier versions
    Contexts { dir: PathBuf, repo: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    pub include_metadata: bool,
    pub target: SummaryTarget,
    /// Context file used for the run, listed in metadata
    pub context_file: Option<PathBuf>,
}

/// Render the markdown summary for `report`
#[must_use]
pub fn render(report: &RunReport, options: &SummaryOptions, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let summary = report.ticket.as_ref().map_or("", |t| t.summary.as_str());

    let _ = writeln!(out, "# Agent Summary: {}\n", report.ticket_key);
    let _ = writeln!(out, "## Ticket\n**{}**: {summary}\n", report.ticket_key);

    let implementation = report
        .implementation_summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("(no implementation summary)");
    let _ = writeln!(out, "## Implementation\n{implementation}\n");

    if !report.modified_files.is_empty() {
        let _ = writeln!(out, "## Files Changed ({})", report.modified_files.len());
        for file in &report.modified_files {
            let _ = writeln!(out, "- {}", file.display());
        }
        out.push('\n');
    }

    let status = match (&report.failure, report.verification_status) {
        (Some(_), _) => "Failed",
        (None, VerificationStatus::Complete) => "Complete",
        (None, VerificationStatus::Partial) => "Partial",
        (None, VerificationStatus::Incomplete) => "Incomplete",
        (None, VerificationStatus::Unknown) => "Done",
    };
    let _ = writeln!(out, "## Status\n{status}\n");

    out.push_str("## Remaining Work\n");
    if report.gaps.is_empty() {
        out.push_str("(none)\n");
    }
    for gap in &report.gaps {
        let _ = writeln!(out, "- {gap}");
    }

    if options.include_metadata {
        out.push_str("\n---\n## Metadata\n");
        let _ = writeln!(out, "- **Generated**: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "- **Duration**: {}s", report.duration.as_secs());
        if let Some(root) = &report.workspace_root {
            let _ = writeln!(out, "- **Worktree**: {}", root.display());
        }
        if let Some(branch) = &report.branch {
            let _ = writeln!(out, "- **Branch**: {branch}");
        }
        if let Some(ticket) = &report.ticket {
            let _ = writeln!(out, "- **Ticket Type**: {}", ticket.issue_type);
            let _ = writeln!(out, "- **Ticket Priority**: {}", ticket.priority);
        }
        if let Some(context) = &options.context_file {
            let _ = writeln!(out, "- **Context File**: {}", context.display());
        }
    }
    out
}

/// Resolve the output file for `report`
///
/// `None` when the summary belongs in a workspace that was never created.
#[must_use]
pub fn output_path(report: &RunReport, target: &SummaryTarget) -> Option<PathBuf> {
    match target {
        SummaryTarget::WorkspaceRoot => report.workspace_root.as_ref().map(|r| r.join(SUMMARY_FILE)),
        SummaryTarget::Path(path) => Some(path.clone()),
        SummaryTarget::Contexts { dir, repo } => {
            Some(dir.join(repo).join(&report.ticket_key).join(SUMMARY_FILE))
        }
    }
}

/// Move an existing `NAME.md` aside to the first free `NAME.<n>.md`
pub fn version_existing(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut version = 1;
    let versioned = loop {
        let candidate = parent.join(format!("{stem}.{version}.{ext}"));
        if !candidate.exists() {
            break candidate;
        }
        version += 1;
    };
    std::fs::rename(path, &versioned)?;
    Ok(Some(versioned))
}

/// Write the summary, returning where it went
pub fn write(report: &RunReport, options: &SummaryOptions) -> std::io::Result<Option<PathBuf>> {
    let Some(path) = output_path(report, &options.target) else {
        tracing::warn!(ticket = %report.ticket_key, "no workspace; summary not written");
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if matches!(options.target, SummaryTarget::Contexts { .. }) {
        if let Some(previous) = version_existing(&path)? {
            tracing::debug!(previous = %previous.display(), "previous summary kept");
        }
    }
    std::fs::write(&path, render(report, options, Utc::now()))?;
    tracing::info!(path = %path.display(), "summary written");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::PipelineRun;
    use crate::ticket::Ticket;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn report(root: Option<&Path>) -> RunReport {
        let mut run = PipelineRun::new("SPE-1");
        run.ticket = Some(Ticket::new("SPE-1", "Fix login"));
        run.record_modified([PathBuf::from("src/login.rs")]);
        run.verification_status = VerificationStatus::Partial;
        run.gaps = vec!["add a test".into()];
        let mut report = RunReport::from_run(run, false);
        report.workspace_root = root.map(Path::to_path_buf);
        report.implementation_summary = Some("Fixed redirect".into());
        report
    }

    #[test]
    fn renders_sections() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let text = render(&report(None), &SummaryOptions::default(), now);
        assert_eq!(
            text,
            "# Agent Summary: SPE-1\n\n\
             ## Ticket\n**SPE-1**: Fix login\n\n\
             ## Implementation\nFixed redirect\n\n\
             ## Files Changed (1)\n- src/login.rs\n\n\
             ## Status\nPartial\n\n\
             ## Remaining Work\n- add a test\n"
        );
    }

    #[test]
    fn metadata_is_optional() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let options = SummaryOptions {
            include_metadata: true,
            ..SummaryOptions::default()
        };
        let text = render(&report(Some(Path::new("/w/spe1"))), &options, now);
        assert!(text.contains("- **Generated**: 2026-01-02 03:04:05 UTC"));
        assert!(text.contains("- **Worktree**: /w/spe1"));
        assert!(text.contains("- **Ticket Priority**: Unknown"));
    }

    #[test]
    fn contexts_target_versions_previous_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let options = SummaryOptions {
            target: SummaryTarget::Contexts {
                dir: dir.path().to_path_buf(),
                repo: "app".into(),
            },
            ..SummaryOptions::default()
        };
        let report = report(None);

        let first = write(&report, &options).unwrap().unwrap();
        write(&report, &options).unwrap();
        write(&report, &options).unwrap();

        let folder = dir.path().join("app/SPE-1");
        assert_eq!(first, folder.join(SUMMARY_FILE));
        assert!(folder.join("AGENT_SUMMARY.1.md").exists());
        assert!(folder.join("AGENT_SUMMARY.2.md").exists());
        assert!(!folder.join("AGENT_SUMMARY.3.md").exists());
    }

    #[test]
    fn workspace_target_needs_a_workspace() {
        let report = report(None);
        assert_eq!(write(&report, &SummaryOptions::default()).unwrap(), None);
    }
}
