//! Gated operations and the decisions made about them

use patchgate_audit::{AuditOutcome, AuditSubject, OperationKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a file is accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

/// An operation an agent proposes to perform
///
/// Constructed per request and never persisted beyond the audit entry it
/// produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Read or write a file
    FileAccess { path: PathBuf, mode: AccessMode },
    /// Run command text through a shell
    ShellCommand { command: String },
}

impl Operation {
    /// Read access to `path`
    #[inline]
    #[must_use]
    pub fn read(path: impl Into<PathBuf>) -> Self {
        Self::FileAccess {
            path: path.into(),
            mode: AccessMode::Read,
        }
    }

    /// Write access to `path`
    #[inline]
    #[must_use]
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self::FileAccess {
            path: path.into(),
            mode: AccessMode::Write,
        }
    }

    /// Shell command
    #[inline]
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::ShellCommand {
            command: command.into(),
        }
    }

    /// Audit subject describing this operation
    #[must_use]
    pub fn audit_subject(&self) -> AuditSubject {
        match self {
            Self::FileAccess { path, mode } => {
                let kind = match mode {
                    AccessMode::Read => OperationKind::FileRead,
                    AccessMode::Write => OperationKind::FileWrite,
                };
                AuditSubject::operation(kind, path.display().to_string())
            }
            Self::ShellCommand { command } => {
                AuditSubject::operation(OperationKind::ShellCommand, command.clone())
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileAccess { path, mode } => {
                let verb = match mode {
                    AccessMode::Read => "read",
                    AccessMode::Write => "write",
                };
                write!(f, "{verb} {}", path.display())
            }
            Self::ShellCommand { command } => write!(f, "run {command:?}"),
        }
    }
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
}

impl From<Verdict> for AuditOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => Self::Allow,
            Verdict::Deny => Self::Deny,
        }
    }
}

/// The single decision produced for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub operation: Operation,
    pub outcome: Verdict,
    pub reason: String,
}

impl PolicyDecision {
    /// Allow decision
    #[must_use]
    pub fn allow(operation: Operation, reason: impl Into<String>) -> Self {
        Self {
            operation,
            outcome: Verdict::Allow,
            reason: reason.into(),
        }
    }

    /// Deny decision
    #[must_use]
    pub fn deny(operation: Operation, reason: impl Into<String>) -> Self {
        Self {
            operation,
            outcome: Verdict::Deny,
            reason: reason.into(),
        }
    }

    /// Whether the operation may proceed
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.outcome == Verdict::Allow
    }

    /// Convert a deny into an error the requesting agent can be shown
    pub fn into_result(self) -> Result<Operation, PolicyDenied> {
        match self.outcome {
            Verdict::Allow => Ok(self.operation),
            Verdict::Deny => Err(PolicyDenied {
                operation: self.operation,
                reason: self.reason,
            }),
        }
    }
}

/// A single operation was blocked
///
/// Local to the operation: it is reported back to the agent and never aborts
/// the stage or the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("policy denied {operation}: {reason}")]
pub struct PolicyDenied {
    pub operation: Operation,
    pub reason: String,
}
