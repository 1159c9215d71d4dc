//! Patchgate Core - the guarded execution pipeline
//!
//! Turns a ticket into an isolated, audited code-change attempt:
//!
//! ```text
//! FetchTicket -> PrepareWorkspace -> Plan -> Implement -> Verify -> BrowserVerify -> Report
//! ```
//!
//! - [`PipelineOrchestrator`] drives the stages in order and always ends in a
//!   [`RunReport`], however far the run got
//! - [`GatedTools`] is the only way the implementer touches the workspace;
//!   every call is decided and recorded by the security policy engine
//! - [`BrowserVerificationCoordinator`] runs the optional human-gated browser
//!   check, suspending on a single-slot channel until the operator confirms
//!   the deploy or interrupts
//! - planning, implementing, verifying and browsing are delegated to the
//!   [`capability`] traits; [`external`] backs them with child processes

#![allow(missing_docs)]

pub mod browser;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod health;
pub mod orchestrator;
pub mod report;
pub mod run;
pub mod stage;
pub mod summary;
pub mod ticket;
pub mod tools;
pub mod validation;

pub use browser::{
    listener_from, BrowserOutcome, BrowserVerificationCoordinator, CoordinatorState,
    DeployListener, DeploySignal,
};
pub use capability::{
    BrowserAgent, BrowserRequest, BrowserVerificationResult, Capabilities, Confidence,
    ImplementRequest, ImplementSummary, Implementer, Plan, PlanRequest, Planner,
    VerificationReport, VerificationStatus, Verifier, VerifyRequest,
};
pub use config::Settings;
pub use error::{CapabilityError, ConfigError, PipelineError, ToolError};
pub use external::{
    ExternalBrowser, ExternalCommand, ExternalImplementer, ExternalPlanner, ExternalVerifier,
};
pub use orchestrator::{BrowserOptions, PipelineOrchestrator, RunOptions};
pub use report::RunReport;
pub use run::PipelineRun;
pub use stage::{Stage, StageStatus};
pub use summary::{SummaryOptions, SummaryTarget};
pub use ticket::{FileTicketSource, Ticket, TicketSource};
pub use tools::{CommandOutput, GatedTools};
pub use validation::validate_ticket_key;
