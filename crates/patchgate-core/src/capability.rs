//! Delegated capabilities
//!
//! The pipeline never plans, edits or judges code itself. It hands those jobs
//! to the capabilities below and records what they return. Each is invoked
//! once per run and awaited to completion before the next stage starts.
//!
//! - [`Planner`]: read-only, turns a ticket into a [`Plan`]
//! - [`Implementer`]: full capability, but every effect goes through [`GatedTools`]
//! - [`Verifier`]: read-only, classifies the result
//! - [`BrowserAgent`]: visits the deployed change and classifies what it sees

use crate::error::CapabilityError;
use crate::ticket::{Ticket, TicketSource};
use crate::tools::GatedTools;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Structured plan produced by the planner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<String>,
    /// Files the plan expects to touch
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub ticket: Ticket,
    pub workspace_root: PathBuf,
    /// Contents of the repository's AGENT.md, if present
    pub codebase_context: Option<String>,
    /// Operator-supplied notes (`--info-file`, `--info-text`)
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementRequest {
    pub ticket: Ticket,
    pub plan: Plan,
    pub workspace_root: PathBuf,
    pub codebase_context: Option<String>,
    pub additional_info: Option<String>,
}

/// What the implementer says it did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplementSummary {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub ticket: Ticket,
    pub plan: Plan,
    pub workspace_root: PathBuf,
    /// Workspace-relative paths written during Implement
    pub modified_files: Vec<PathBuf>,
}

/// Verifier classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Complete,
    Partial,
    Incomplete,
    /// Verify never ran, or could not classify
    #[default]
    Unknown,
}

impl VerificationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    /// Remaining work the verifier found
    pub gaps: Vec<String>,
    pub summary: String,
}

/// Confidence that an observed change matches the intended fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Verified,
    LikelyWorking,
    Uncertain,
    Broken,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::LikelyWorking => "likely-working",
            Self::Uncertain => "uncertain",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserRequest {
    pub ticket: Ticket,
    pub base_url: String,
    /// Full URL derived from the ticket
    pub target_url: String,
    /// What the change should look like, from the plan summary
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserVerificationResult {
    pub confidence: Confidence,
    pub observed: String,
    pub reasoning: String,
    #[serde(default)]
    pub url_visited: Option<String>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<Plan, CapabilityError>;
}

/// Full-capability agent
///
/// Any file or command effect must go through `tools`; a denied call comes
/// back as an error the agent can react to.
#[async_trait]
pub trait Implementer: Send + Sync {
    async fn implement(
        &self,
        request: &ImplementRequest,
        tools: &GatedTools,
    ) -> Result<ImplementSummary, CapabilityError>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerificationReport, CapabilityError>;
}

/// Navigates to the deployed change and captures what it sees
#[async_trait]
pub trait BrowserAgent: Send + Sync {
    async fn observe(
        &self,
        request: &BrowserRequest,
    ) -> Result<BrowserVerificationResult, CapabilityError>;
}

/// Every capability a run may call
#[derive(Clone)]
pub struct Capabilities {
    pub tickets: Arc<dyn TicketSource>,
    pub planner: Arc<dyn Planner>,
    pub implementer: Arc<dyn Implementer>,
    pub verifier: Arc<dyn Verifier>,
    pub browser: Option<Arc<dyn BrowserAgent>>,
}

impl Capabilities {
    #[must_use]
    pub fn new(
        tickets: Arc<dyn TicketSource>,
        planner: Arc<dyn Planner>,
        implementer: Arc<dyn Implementer>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            tickets,
            planner,
            implementer,
            verifier,
            browser: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_browser(mut self, browser: Arc<dyn BrowserAgent>) -> Self {
        self.browser = Some(browser);
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("browser", &self.browser.is_some())
            .finish_non_exhaustive()
    }
}
