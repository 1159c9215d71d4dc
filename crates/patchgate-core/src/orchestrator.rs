//! The pipeline orchestrator
//!
//! Runs `FetchTicket -> PrepareWorkspace -> Plan -> Implement -> Verify ->
//! BrowserVerify -> Report` strictly in order, one stage at a time.
//!
//! Failure handling:
//! - a configuration error or workspace conflict stops the run before anything
//!   is mutated
//! - any other stage failure stops later stages, keeping partial results
//! - a denied tool call fails only that call
//! - `Report` always runs

use crate::browser::{BrowserOutcome, BrowserVerificationCoordinator, DeployListener};
use crate::capability::{
    Capabilities, ImplementRequest, Plan, PlanRequest, VerificationStatus, VerifyRequest,
};
use crate::error::PipelineError;
use crate::report::RunReport;
use crate::run::PipelineRun;
use crate::stage::{Stage, StageStatus};
use crate::ticket::Ticket;
use crate::tools::GatedTools;
use crate::validation::validate_ticket_key;
use patchgate_audit::{AuditLog, AuditOutcome, AuditSubject};
use patchgate_policy::{SecurityPolicyEngine, SecurityRuleSet};
use patchgate_workspace::{Workspace, WorkspaceKind, WorkspaceManager, WorkspaceRequest};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for each gated shell command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Browser verification request for one run
pub struct BrowserOptions {
    pub base_url: String,
    pub listener: DeployListener,
    /// Where the deploy prompt is printed
    pub prompt: Box<dyn Write + Send>,
}

impl BrowserOptions {
    /// Prompt on stderr
    #[must_use]
    pub fn new(base_url: impl Into<String>, listener: DeployListener) -> Self {
        Self {
            base_url: base_url.into(),
            listener,
            prompt: Box::new(std::io::stderr()),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn Write + Send>) -> Self {
        self.prompt = prompt;
        self
    }
}

impl fmt::Debug for BrowserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserOptions")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Parameters of one run
#[derive(Debug)]
pub struct RunOptions {
    pub ticket_key: String,
    pub kind: WorkspaceKind,
    pub branch_name: Option<String>,
    pub base_commit: Option<String>,
    /// Fetch the ticket, then go straight to Report
    pub dry_run: bool,
    pub browser: Option<BrowserOptions>,
    pub additional_info: Option<String>,
    pub codebase_context: Option<String>,
    pub command_timeout: Duration,
}

impl RunOptions {
    /// Worktree run with defaults
    #[must_use]
    pub fn new(ticket_key: impl Into<String>) -> Self {
        Self {
            ticket_key: ticket_key.into(),
            kind: WorkspaceKind::Worktree,
            branch_name: None,
            base_commit: None,
            dry_run: false,
            browser: None,
            additional_info: None,
            codebase_context: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: WorkspaceKind) -> Self {
        self.kind = kind;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_branch_name(mut self, name: impl Into<String>) -> Self {
        self.branch_name = Some(name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_base_commit(mut self, commit: impl Into<String>) -> Self {
        self.base_commit = Some(commit.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserOptions) -> Self {
        self.browser = Some(browser);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_codebase_context(mut self, context: impl Into<String>) -> Self {
        self.codebase_context = Some(context.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Composes workspace, policy, audit and capabilities into a run
#[derive(Debug)]
pub struct PipelineOrchestrator {
    capabilities: Capabilities,
    workspaces: WorkspaceManager,
    rules: Arc<SecurityRuleSet>,
    audit: Arc<AuditLog>,
}

impl PipelineOrchestrator {
    #[must_use]
    pub fn new(
        capabilities: Capabilities,
        workspaces: WorkspaceManager,
        rules: Arc<SecurityRuleSet>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            capabilities,
            workspaces,
            rules,
            audit,
        }
    }

    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    #[inline]
    #[must_use]
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run the pipeline to its Report
    pub async fn run(&self, mut options: RunOptions) -> RunReport {
        let mut run = PipelineRun::new(options.ticket_key.clone());
        let browser = options.browser.take();
        tracing::info!(ticket = %run.ticket_key, kind = %options.kind, dry_run = options.dry_run, "run started");

        if let Some(ticket) = self.fetch_ticket(&mut run).await {
            if options.dry_run {
                tracing::info!(ticket = %run.ticket_key, "dry run: skipping to report");
                for stage in run.pending() {
                    if stage != Stage::Report {
                        self.transition(&mut run, stage, StageStatus::Skipped("dry run".into()));
                    }
                }
            } else {
                self.execute(&mut run, &options, ticket, browser).await;
            }
        }

        for stage in run.pending() {
            if stage != Stage::Report {
                self.transition(&mut run, stage, StageStatus::Skipped("not reached".into()));
            }
        }
        self.transition(&mut run, Stage::Report, StageStatus::Running);
        self.transition(&mut run, Stage::Report, StageStatus::Completed);

        let report = RunReport::from_run(run, options.dry_run);
        tracing::info!(
            ticket = %report.ticket_key,
            files = report.modified_files.len(),
            verification = %report.verification_status,
            exit = report.exit_code(),
            "run finished"
        );
        report
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        options: &RunOptions,
        ticket: Ticket,
        browser: Option<BrowserOptions>,
    ) {
        let Some(workspace) = self.prepare_workspace(run, options, &ticket).await else {
            return;
        };

        let engine = SecurityPolicyEngine::new(
            Arc::clone(&self.rules),
            &workspace.root,
            Arc::clone(&self.audit),
        );
        let tools = GatedTools::new(engine, options.command_timeout);

        let Some(plan) = self.plan(run, options, &ticket, &workspace).await else {
            return;
        };
        if !self.implement(run, options, &ticket, &plan, &tools).await {
            return;
        }
        if !self.verify(run, &ticket, &plan, &workspace).await {
            return;
        }
        self.browser_verify(run, &ticket, &plan, &workspace, browser).await;
    }

    /// Move `stage` to `status`, recording the transition
    fn transition(&self, run: &mut PipelineRun, stage: Stage, status: StageStatus) {
        let outcome = match &status {
            StageStatus::Pending | StageStatus::Running => AuditOutcome::Started,
            StageStatus::Completed => AuditOutcome::Completed,
            StageStatus::Failed(_) => AuditOutcome::Failed,
            StageStatus::Skipped(_) => AuditOutcome::Skipped,
            StageStatus::Aborted(_) => AuditOutcome::Aborted,
        };
        let reason = status.reason().unwrap_or_default().to_string();
        match &status {
            StageStatus::Failed(reason) => tracing::error!(stage = %stage, reason = %reason, "stage failed"),
            StageStatus::Aborted(reason) => tracing::warn!(stage = %stage, reason = %reason, "stage aborted"),
            _ => tracing::info!(stage = %stage, status = %status, "stage"),
        }
        self.audit.record(AuditSubject::stage(stage.as_str()), outcome, reason);
        run.set(stage, status);
    }

    /// Complete the stage on `Ok`; fail it and the run on `Err`
    fn settle<T>(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        result: Result<T, PipelineError>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.transition(run, stage, StageStatus::Completed);
                Some(value)
            }
            Err(err) => {
                let reason = match &err {
                    PipelineError::StageFailure { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.transition(run, stage, StageStatus::Failed(reason));
                run.fail(err);
                None
            }
        }
    }

    async fn fetch_ticket(&self, run: &mut PipelineRun) -> Option<Ticket> {
        self.transition(run, Stage::FetchTicket, StageStatus::Running);
        let key = run.ticket_key.clone();
        let result = match validate_ticket_key(&key) {
            Err(e) => Err(PipelineError::from(e)),
            Ok(()) => self
                .capabilities
                .tickets
                .fetch(&key)
                .await
                .map_err(|e| PipelineError::stage_failure(Stage::FetchTicket, e)),
        };
        let ticket = self.settle(run, Stage::FetchTicket, result)?;
        tracing::info!(ticket = %ticket.key, summary = %ticket.summary, "ticket fetched");
        run.ticket = Some(ticket.clone());
        Some(ticket)
    }

    async fn prepare_workspace(
        &self,
        run: &mut PipelineRun,
        options: &RunOptions,
        ticket: &Ticket,
    ) -> Option<Workspace> {
        self.transition(run, Stage::PrepareWorkspace, StageStatus::Running);
        let mut request =
            WorkspaceRequest::new(ticket.key.clone(), options.kind).with_summary(ticket.summary.clone());
        if let Some(commit) = &options.base_commit {
            request = request.with_base_commit(commit.clone());
        }
        if let Some(name) = &options.branch_name {
            request = request.with_branch_name(name.clone());
        }

        let manager = self.workspaces.clone();
        let result = match tokio::task::spawn_blocking(move || manager.create(&request)).await {
            Ok(created) => created.map_err(PipelineError::from_workspace),
            Err(join) => Err(PipelineError::stage_failure(Stage::PrepareWorkspace, join)),
        };
        let workspace = self.settle(run, Stage::PrepareWorkspace, result)?;
        tracing::info!(root = %workspace.root.display(), branch = %workspace.branch, "workspace ready");
        run.workspace = Some(workspace.clone());
        Some(workspace)
    }

    async fn plan(
        &self,
        run: &mut PipelineRun,
        options: &RunOptions,
        ticket: &Ticket,
        workspace: &Workspace,
    ) -> Option<Plan> {
        self.transition(run, Stage::Plan, StageStatus::Running);
        let request = PlanRequest {
            ticket: ticket.clone(),
            workspace_root: workspace.root.clone(),
            codebase_context: options.codebase_context.clone(),
            additional_info: options.additional_info.clone(),
        };
        let result = self
            .capabilities
            .planner
            .plan(&request)
            .await
            .map_err(|e| PipelineError::stage_failure(Stage::Plan, e));
        let plan = self.settle(run, Stage::Plan, result)?;
        run.plan = Some(plan.clone());
        Some(plan)
    }

    async fn implement(
        &self,
        run: &mut PipelineRun,
        options: &RunOptions,
        ticket: &Ticket,
        plan: &Plan,
        tools: &GatedTools,
    ) -> bool {
        self.transition(run, Stage::Implement, StageStatus::Running);
        let request = ImplementRequest {
            ticket: ticket.clone(),
            plan: plan.clone(),
            workspace_root: tools.root().to_path_buf(),
            codebase_context: options.codebase_context.clone(),
            additional_info: options.additional_info.clone(),
        };
        let result = self.capabilities.implementer.implement(&request, tools).await;

        // Partial writes count even when the agent failed.
        run.record_modified(tools.modified_files());
        run.denied_operations = tools.denied_count();

        let result = result.map_err(|e| PipelineError::stage_failure(Stage::Implement, e));
        match self.settle(run, Stage::Implement, result) {
            Some(summary) => {
                run.implementation = Some(summary);
                true
            }
            None => false,
        }
    }

    async fn verify(
        &self,
        run: &mut PipelineRun,
        ticket: &Ticket,
        plan: &Plan,
        workspace: &Workspace,
    ) -> bool {
        self.transition(run, Stage::Verify, StageStatus::Running);
        let request = VerifyRequest {
            ticket: ticket.clone(),
            plan: plan.clone(),
            workspace_root: workspace.root.clone(),
            modified_files: run.modified_files.iter().cloned().collect(),
        };
        let result = match self.capabilities.verifier.verify(&request).await {
            Ok(report) if report.status == VerificationStatus::Unknown => Err(
                PipelineError::stage_failure(Stage::Verify, "verifier returned no classification"),
            ),
            Ok(report) => Ok(report),
            Err(e) => Err(PipelineError::stage_failure(Stage::Verify, e)),
        };
        let Some(report) = self.settle(run, Stage::Verify, result) else {
            return false;
        };
        tracing::info!(status = %report.status, gaps = report.gaps.len(), "verification classified");
        run.verification_status = report.status;
        run.gaps = report.gaps;
        run.verification_summary = Some(report.summary).filter(|s| !s.is_empty());
        true
    }

    async fn browser_verify(
        &self,
        run: &mut PipelineRun,
        ticket: &Ticket,
        plan: &Plan,
        workspace: &Workspace,
        browser: Option<BrowserOptions>,
    ) {
        let Some(options) = browser else {
            self.transition(run, Stage::BrowserVerify, StageStatus::Skipped("not requested".into()));
            return;
        };
        if workspace.kind != WorkspaceKind::Branch {
            let reason = "browser verification needs a branch workspace; the dev server does not serve worktrees";
            run.browser_note = Some(reason.to_string());
            self.transition(run, Stage::BrowserVerify, StageStatus::Skipped(reason.into()));
            return;
        }

        self.transition(run, Stage::BrowserVerify, StageStatus::Running);
        let Some(agent) = self.capabilities.browser.as_deref() else {
            self.settle::<()>(
                run,
                Stage::BrowserVerify,
                Err(PipelineError::stage_failure(
                    Stage::BrowserVerify,
                    "no browser capability configured",
                )),
            );
            return;
        };

        let coordinator = BrowserVerificationCoordinator::new(agent, options.prompt);
        let outcome = coordinator
            .run(ticket, &options.base_url, &plan.summary, options.listener)
            .await;
        match outcome {
            BrowserOutcome::Classified(result) => {
                tracing::info!(confidence = %result.confidence, "browser verification classified");
                run.browser_result = Some(result);
                self.transition(run, Stage::BrowserVerify, StageStatus::Completed);
            }
            BrowserOutcome::Aborted { reason } => {
                run.browser_note = Some(format!("aborted: {reason}"));
                self.transition(run, Stage::BrowserVerify, StageStatus::Aborted(reason));
            }
            BrowserOutcome::Failed { reason } => {
                self.settle::<()>(
                    run,
                    Stage::BrowserVerify,
                    Err(PipelineError::stage_failure(Stage::BrowserVerify, reason)),
                );
            }
        }
    }
}
