//! In-memory state of one pipeline run

use crate::capability::{BrowserVerificationResult, ImplementSummary, Plan, VerificationStatus};
use crate::error::PipelineError;
use crate::stage::{Stage, StageStatus};
use crate::ticket::Ticket;
use patchgate_workspace::Workspace;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

/// Mutable run state, owned by the orchestrator
///
/// Never persisted; the [`crate::RunReport`] is the external snapshot.
#[derive(Debug)]
pub struct PipelineRun {
    pub ticket_key: String,
    pub current_stage: Stage,
    stages: BTreeMap<Stage, StageStatus>,
    pub modified_files: BTreeSet<PathBuf>,
    pub verification_status: VerificationStatus,
    pub gaps: Vec<String>,
    pub verification_summary: Option<String>,
    pub browser_result: Option<BrowserVerificationResult>,
    /// Why the browser step produced no result
    pub browser_note: Option<String>,
    pub ticket: Option<Ticket>,
    pub workspace: Option<Workspace>,
    pub plan: Option<Plan>,
    pub implementation: Option<ImplementSummary>,
    pub denied_operations: usize,
    pub failure: Option<PipelineError>,
    pub started: Instant,
}

impl PipelineRun {
    #[must_use]
    pub fn new(ticket_key: impl Into<String>) -> Self {
        Self {
            ticket_key: ticket_key.into(),
            current_stage: Stage::FetchTicket,
            stages: Stage::ALL.iter().map(|s| (*s, StageStatus::Pending)).collect(),
            modified_files: BTreeSet::new(),
            verification_status: VerificationStatus::Unknown,
            gaps: Vec::new(),
            verification_summary: None,
            browser_result: None,
            browser_note: None,
            ticket: None,
            workspace: None,
            plan: None,
            implementation: None,
            denied_operations: 0,
            failure: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn status(&self, stage: Stage) -> &StageStatus {
        const PENDING: &StageStatus = &StageStatus::Pending;
        self.stages.get(&stage).unwrap_or(PENDING)
    }

    /// Status of every stage in order
    pub fn statuses(&self) -> impl Iterator<Item = (Stage, &StageStatus)> {
        self.stages.iter().map(|(s, st)| (*s, st))
    }

    /// Move `stage` to `to`
    ///
    /// Returns the previous status. An illegal move is logged and applied
    /// anyway so the report reflects what actually happened.
    pub fn set(&mut self, stage: Stage, to: StageStatus) -> StageStatus {
        let from = self.status(stage).clone();
        if !from.can_transition(&to) {
            tracing::error!(stage = %stage, from = %from, to = %to, "illegal stage transition");
        }
        if to == StageStatus::Running {
            self.current_stage = stage;
        }
        self.stages.insert(stage, to);
        from
    }

    /// Add workspace-relative paths to the modified set
    pub fn record_modified(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        self.modified_files.extend(files);
    }

    /// First failure wins; later ones are logged only
    pub fn fail(&mut self, error: PipelineError) {
        if let Some(existing) = &self.failure {
            tracing::warn!(error = %error, first = %existing, "additional failure after run already failed");
            return;
        }
        self.failure = Some(error);
    }

    #[inline]
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Stages still pending
    #[must_use]
    pub fn pending(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, st)| **st == StageStatus::Pending)
            .map(|(s, _)| *s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_all_pending() {
        let run = PipelineRun::new("SPE-1");
        assert_eq!(run.pending(), Stage::ALL.to_vec());
        assert_eq!(run.verification_status, VerificationStatus::Unknown);
    }

    #[test]
    fn running_moves_current_stage() {
        let mut run = PipelineRun::new("SPE-1");
        run.set(Stage::FetchTicket, StageStatus::Running);
        run.set(Stage::FetchTicket, StageStatus::Completed);
        run.set(Stage::PrepareWorkspace, StageStatus::Running);
        assert_eq!(run.current_stage, Stage::PrepareWorkspace);
        assert_eq!(run.status(Stage::FetchTicket), &StageStatus::Completed);
    }

    #[test]
    fn modified_files_are_deduplicated() {
        let mut run = PipelineRun::new("SPE-1");
        run.record_modified([PathBuf::from("b.rs"), PathBuf::from("a.rs")]);
        run.record_modified([PathBuf::from("a.rs")]);
        assert_eq!(
            run.modified_files.iter().collect::<Vec<_>>(),
            vec![&PathBuf::from("a.rs"), &PathBuf::from("b.rs")]
        );
    }

    #[test]
    fn first_failure_is_kept() {
        let mut run = PipelineRun::new("SPE-1");
        run.fail(PipelineError::stage_failure(Stage::Plan, "first"));
        run.fail(PipelineError::stage_failure(Stage::Verify, "second"));
        assert_eq!(run.failure.as_ref().map(PipelineError::stage), Some(Stage::Plan));
    }
}
