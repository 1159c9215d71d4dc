//! Error types for the pipeline
//!
//! Failure classes and how far they propagate:
//! - [`ConfigError`]: missing or invalid settings, fatal before any mutation
//! - [`WorkspaceError`] conflicts: fatal before any mutation
//! - [`ToolError::Denied`]: one blocked operation, reported to the agent only
//! - [`PipelineError::StageFailure`]: halts later stages, never the Report
//! - [`CapabilityError`]: a delegated capability misbehaved; becomes a stage failure

use crate::stage::Stage;
use patchgate_policy::{PolicyDenied, PolicyError};
use patchgate_workspace::WorkspaceError;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration problems
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("missing required setting `{setting}` (set {env} or add it to the config file)")]
    Missing {
        setting: &'static str,
        env: &'static str,
    },

    /// The config file could not be read
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::Settings`]
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Ticket key does not look like `PROJECT-123`
    #[error("invalid ticket key {key:?}: expected PROJECT-123 (uppercase letters, hyphen, number)")]
    InvalidTicketKey { key: String },

    /// Any other invalid value
    #[error("{0}")]
    Invalid(String),

    /// Policy rules in the config are unusable
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Failures of delegated capabilities (ticket source, planner, implementer, verifier, browser)
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The capability reported a failure of its own
    #[error("{capability} failed: {message}")]
    Failed {
        capability: &'static str,
        message: String,
    },

    /// No ticket with that key
    #[error("ticket {0} not found")]
    TicketNotFound(String),

    /// A ticket or response document could not be parsed
    #[error("malformed {what}: {message}")]
    Malformed { what: String, message: String },

    /// External command could not be started
    #[error("cannot start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// External command exited unsuccessfully
    #[error("{command} exited with {status}: {stderr}")]
    Exited {
        command: String,
        status: String,
        stderr: String,
    },

    /// External command broke the exchange protocol
    #[error("protocol error from {command}: {message}")]
    Protocol { command: String, message: String },

    /// I/O error talking to a capability
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    /// Capability-reported failure
    #[must_use]
    pub fn failed(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            capability,
            message: message.into(),
        }
    }
}

/// Failures of a single gated tool call
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The security policy blocked the operation
    #[error(transparent)]
    Denied(#[from] PolicyDenied),

    /// Allowed, but the filesystem operation failed
    #[error("cannot {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Allowed, but the command could not be started
    #[error("cannot run command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Allowed, but the command ran past its deadline
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

impl ToolError {
    /// Whether the policy, not the environment, refused the call
    #[inline]
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Errors that end a pipeline run early
///
/// None of these prevent the Report: the orchestrator records the error and
/// still produces a report with whatever partial state exists.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Fatal before any mutation
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Fatal before any mutation
    #[error("workspace conflict: {0}")]
    WorkspaceConflict(#[source] WorkspaceError),

    /// A stage could not produce its output
    #[error("{stage} failed: {reason}")]
    StageFailure { stage: Stage, reason: String },
}

impl PipelineError {
    /// Stage failure with a displayable reason
    #[must_use]
    pub fn stage_failure(stage: Stage, reason: impl Display) -> Self {
        Self::StageFailure {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort before any side effect
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::WorkspaceConflict(_))
    }

    /// Process exit status for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::WorkspaceConflict(_) => 3,
            Self::StageFailure { .. } => 1,
        }
    }

    /// Stage the error is attributed to
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::FetchTicket,
            Self::WorkspaceConflict(_) => Stage::PrepareWorkspace,
            Self::StageFailure { stage, .. } => *stage,
        }
    }

    /// Map a workspace error raised while preparing the workspace
    #[must_use]
    pub fn from_workspace(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::Conflict { .. } | WorkspaceError::SlugTaken { .. } => {
                Self::WorkspaceConflict(err)
            }
            WorkspaceError::InvalidKey(_) | WorkspaceError::InvalidRef(_) => {
                Self::Configuration(ConfigError::Invalid(err.to_string()))
            }
            other => Self::stage_failure(Stage::PrepareWorkspace, other),
        }
    }
}
