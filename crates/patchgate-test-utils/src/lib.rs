//! Testing utilities for the Patchgate workspace
//!
//! Fakes for git and every delegated capability, plus a [`Fixture`] that lays
//! out a throwaway repository and worktrees root.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use patchgate_core::{
    BrowserAgent, BrowserRequest, BrowserVerificationResult, CapabilityError, Capabilities,
    Confidence, GatedTools, ImplementRequest, ImplementSummary, Implementer, Plan, PlanRequest,
    Planner, Ticket, TicketSource, VerificationReport, VerificationStatus, Verifier,
    VerifyRequest,
};
use patchgate_workspace::{GitOutput, GitRunner, WorkspaceError, WorkspaceManager};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Git runner that records calls and answers from a script
///
/// Unscripted commands succeed with empty output. `worktree add` and
/// `worktree remove` also create and delete the target directory.
#[derive(Debug, Default)]
pub struct RecordingGit {
    calls: Mutex<Vec<Vec<String>>>,
    responses: Mutex<Vec<(Vec<String>, GitOutput)>>,
}

impl RecordingGit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`
    pub fn respond(&self, prefix: &[&str], output: GitOutput) {
        let prefix = prefix.iter().map(|s| (*s).to_string()).collect();
        self.responses.lock().push((prefix, output));
    }

    /// Every call so far, as argument vectors
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Calls whose arguments start with `prefix`
    #[must_use]
    pub fn calls_starting_with(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b))
            .collect()
    }
}

impl GitRunner for RecordingGit {
    fn run(&self, _cwd: &Path, args: &[&str]) -> Result<GitOutput, WorkspaceError> {
        let call: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
        self.calls.lock().push(call.clone());

        let scripted = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b))
            .map(|(_, out)| out.clone());
        let output = scripted.unwrap_or_else(|| GitOutput::ok(""));

        if output.success {
            match args {
                ["worktree", "add", "-b", _, root, ..] => std::fs::create_dir_all(root)?,
                ["worktree", "remove", "--force", root] if Path::new(root).exists() => {
                    std::fs::remove_dir_all(root)?;
                }
                _ => {}
            }
        }
        Ok(output)
    }
}

/// Serves tickets from memory
#[derive(Debug, Default)]
pub struct StaticTicketSource {
    tickets: HashMap<String, Ticket>,
    fetches: AtomicUsize,
}

impl StaticTicketSource {
    #[must_use]
    pub fn new(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        Self {
            tickets: tickets.into_iter().map(|t| (t.key.clone(), t)).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketSource for StaticTicketSource {
    async fn fetch(&self, key: &str) -> Result<Ticket, CapabilityError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tickets
            .get(key)
            .cloned()
            .ok_or_else(|| CapabilityError::TicketNotFound(key.to_string()))
    }
}

/// Returns a fixed plan, or fails
#[derive(Debug)]
pub struct ScriptedPlanner {
    result: Result<Plan, String>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    #[must_use]
    pub fn returning(plan: Plan) -> Self {
        Self {
            result: Ok(plan),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<Plan, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(|m| CapabilityError::failed("planner", m))
    }
}

/// One scripted implementer step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Read(PathBuf),
    Write(PathBuf, String),
    Run(String),
}

impl Step {
    #[must_use]
    pub fn write(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self::Write(path.into(), contents.into())
    }

    #[must_use]
    pub fn run(command: impl Into<String>) -> Self {
        Self::Run(command.into())
    }
}

/// Performs its steps through the gated tools, then succeeds or fails
///
/// A denied or failed step is noted and the next step still runs, the way an
/// agent would try something else.
#[derive(Debug, Default)]
pub struct ScriptedImplementer {
    steps: Vec<Step>,
    fail_with: Option<String>,
    outcomes: Mutex<Vec<Result<(), String>>>,
}

impl ScriptedImplementer {
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Fail after all steps ran
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Result of each step, in order
    #[must_use]
    pub fn outcomes(&self) -> Vec<Result<(), String>> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl Implementer for ScriptedImplementer {
    async fn implement(
        &self,
        _request: &ImplementRequest,
        tools: &GatedTools,
    ) -> Result<ImplementSummary, CapabilityError> {
        for step in &self.steps {
            let result = match step {
                Step::Read(path) => tools.read_file(path).await.map(drop),
                Step::Write(path, contents) => tools.write_file(path, contents).await,
                Step::Run(command) => tools.run_command(command).await.map(drop),
            };
            self.outcomes.lock().push(result.map_err(|e| e.to_string()));
        }
        match &self.fail_with {
            Some(message) => Err(CapabilityError::failed("implementer", message.clone())),
            None => Ok(ImplementSummary {
                summary: format!("ran {} steps", self.steps.len()),
            }),
        }
    }
}

/// Returns a fixed classification and remembers what it was shown
#[derive(Debug)]
pub struct ScriptedVerifier {
    result: Result<VerificationReport, String>,
    seen: Mutex<Vec<Vec<PathBuf>>>,
}

impl ScriptedVerifier {
    #[must_use]
    pub fn returning(status: VerificationStatus, gaps: &[&str]) -> Self {
        Self {
            result: Ok(VerificationReport {
                status,
                gaps: gaps.iter().map(|g| (*g).to_string()).collect(),
                summary: String::new(),
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Modified-file lists passed to each call
    #[must_use]
    pub fn seen(&self) -> Vec<Vec<PathBuf>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerificationReport, CapabilityError> {
        self.seen.lock().push(request.modified_files.clone());
        self.result
            .clone()
            .map_err(|m| CapabilityError::failed("verifier", m))
    }
}

/// Returns a fixed browser classification
#[derive(Debug)]
pub struct ScriptedBrowser {
    confidence: Confidence,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    #[must_use]
    pub fn new(confidence: Confidence) -> Self {
        Self {
            confidence,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Target URLs visited
    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BrowserAgent for ScriptedBrowser {
    async fn observe(
        &self,
        request: &BrowserRequest,
    ) -> Result<BrowserVerificationResult, CapabilityError> {
        self.calls.lock().push(request.target_url.clone());
        Ok(BrowserVerificationResult {
            confidence: self.confidence,
            observed: format!("page at {}", request.target_url),
            reasoning: "scripted".to_string(),
            url_visited: None,
        })
    }
}

/// Ticket with a summary and nothing else
#[must_use]
pub fn ticket(key: &str, summary: &str) -> Ticket {
    Ticket::new(key, summary)
}

/// Capabilities built from the given fakes
#[must_use]
pub fn capabilities(
    tickets: Arc<StaticTicketSource>,
    planner: Arc<ScriptedPlanner>,
    implementer: Arc<ScriptedImplementer>,
    verifier: Arc<ScriptedVerifier>,
) -> Capabilities {
    Capabilities::new(tickets, planner, implementer, verifier)
}

/// Temporary repository and worktrees root with a recording git
#[derive(Debug)]
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub repo: PathBuf,
    pub worktrees: PathBuf,
    pub git: Arc<RecordingGit>,
}

impl Fixture {
    /// # Panics
    ///
    /// If the temporary directories cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = dir.path().join("app");
        let worktrees = dir.path().join("worktrees");
        std::fs::create_dir_all(repo.join(".git")).expect("repo dir");
        Self {
            dir,
            repo,
            worktrees,
            git: Arc::new(RecordingGit::new()),
        }
    }

    #[must_use]
    pub fn manager(&self) -> WorkspaceManager {
        WorkspaceManager::new(&self.repo, &self.worktrees, Arc::clone(&self.git) as Arc<dyn GitRunner>)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
