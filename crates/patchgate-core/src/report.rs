//! The run report
//!
//! The only output of a run that anyone outside the process sees. Produced
//! for every run, including ones that failed before touching anything.

use crate::capability::{BrowserVerificationResult, VerificationStatus};
use crate::error::PipelineError;
use crate::run::PipelineRun;
use crate::stage::{Stage, StageStatus};
use crate::ticket::Ticket;
use patchgate_workspace::WorkspaceKind;
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

/// Snapshot of a finished run
#[derive(Debug)]
pub struct RunReport {
    pub ticket_key: String,
    pub ticket: Option<Ticket>,
    pub stages: Vec<(Stage, StageStatus)>,
    /// Workspace-relative, sorted, deduplicated
    pub modified_files: Vec<PathBuf>,
    pub verification_status: VerificationStatus,
    pub gaps: Vec<String>,
    pub verification_summary: Option<String>,
    pub browser_result: Option<BrowserVerificationResult>,
    pub browser_note: Option<String>,
    pub plan_summary: Option<String>,
    pub implementation_summary: Option<String>,
    pub denied_operations: usize,
    pub workspace_root: Option<PathBuf>,
    pub workspace_kind: Option<WorkspaceKind>,
    pub branch: Option<String>,
    pub duration: Duration,
    pub failure: Option<PipelineError>,
    pub dry_run: bool,
}

impl RunReport {
    /// Freeze `run` into a report
    #[must_use]
    pub fn from_run(run: PipelineRun, dry_run: bool) -> Self {
        let stages = run.statuses().map(|(s, st)| (s, st.clone())).collect();
        let duration = run.started.elapsed();
        let (workspace_root, workspace_kind, branch) = match run.workspace {
            Some(ws) => (Some(ws.root), Some(ws.kind), Some(ws.branch)),
            None => (None, None, None),
        };
        Self {
            ticket_key: run.ticket_key,
            ticket: run.ticket,
            stages,
            modified_files: run.modified_files.into_iter().collect(),
            verification_status: run.verification_status,
            gaps: run.gaps,
            verification_summary: run.verification_summary,
            browser_result: run.browser_result,
            browser_note: run.browser_note,
            plan_summary: run.plan.map(|p| p.summary),
            implementation_summary: run.implementation.map(|i| i.summary),
            denied_operations: run.denied_operations,
            workspace_root,
            workspace_kind,
            branch,
            duration,
            failure: run.failure,
            dry_run,
        }
    }

    /// Process exit status
    ///
    /// 0 on success, 1 for a stage failure or an Incomplete verification,
    /// 2 for configuration errors, 3 for workspace conflicts.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.failure {
            Some(err) => err.exit_code(),
            None if self.verification_status == VerificationStatus::Incomplete => 1,
            None => 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code() == 0
    }

    #[must_use]
    pub fn stage_status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, st)| st)
    }

    /// Human-readable summary
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "== Run report: {} ==", self.ticket_key)?;
        if let Some(ticket) = &self.ticket {
            writeln!(out, "Ticket:        {}", ticket.summary)?;
        }
        if self.dry_run {
            writeln!(out, "Mode:          dry run")?;
        }
        if let Some(root) = &self.workspace_root {
            let kind = self.workspace_kind.map(|k| k.to_string()).unwrap_or_default();
            writeln!(out, "Workspace:     {} ({kind})", root.display())?;
        }
        if let Some(branch) = &self.branch {
            writeln!(out, "Branch:        {branch}")?;
        }

        writeln!(out, "\nStages:")?;
        for (stage, status) in &self.stages {
            writeln!(out, "  {:<17} {status}", stage.as_str())?;
        }

        if let Some(plan) = self.plan_summary.as_deref().filter(|s| !s.is_empty()) {
            writeln!(out, "\nPlan: {plan}")?;
        }
        if let Some(summary) = self.implementation_summary.as_deref().filter(|s| !s.is_empty()) {
            writeln!(out, "Implementation: {summary}")?;
        }

        writeln!(out, "\nModified files ({}):", self.modified_files.len())?;
        if self.modified_files.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for file in &self.modified_files {
            writeln!(out, "  {}", file.display())?;
        }
        if self.denied_operations > 0 {
            writeln!(out, "Denied operations: {}", self.denied_operations)?;
        }

        writeln!(out, "\nVerification:  {}", self.verification_status)?;
        for gap in &self.gaps {
            writeln!(out, "  - {gap}")?;
        }
        match (&self.browser_result, &self.browser_note) {
            (Some(result), _) => {
                writeln!(out, "Browser:       {} ({})", result.confidence, result.observed)?;
                writeln!(out, "  {}", result.reasoning)?;
            }
            (None, Some(note)) => writeln!(out, "Browser:       {note}")?,
            (None, None) => {}
        }

        if let Some(err) = &self.failure {
            writeln!(out, "\nStopped at {}: {err}", err.stage())?;
        }
        writeln!(
            out,
            "\nDuration: {:.1}s, exit status {}",
            self.duration.as_secs_f64(),
            self.exit_code()
        )
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
