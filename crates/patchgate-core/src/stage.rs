//! Pipeline stages and their status state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ordered phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    FetchTicket,
    PrepareWorkspace,
    Plan,
    Implement,
    Verify,
    BrowserVerify,
    Report,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Self; 7] = [
        Self::FetchTicket,
        Self::PrepareWorkspace,
        Self::Plan,
        Self::Implement,
        Self::Verify,
        Self::BrowserVerify,
        Self::Report,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchTicket => "FetchTicket",
            Self::PrepareWorkspace => "PrepareWorkspace",
            Self::Plan => "Plan",
            Self::Implement => "Implement",
            Self::Verify => "Verify",
            Self::BrowserVerify => "BrowserVerify",
            Self::Report => "Report",
        }
    }

    /// The stage after this one
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stage is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed(String),
    Skipped(String),
    /// Cancelled by a human; non-fatal
    Aborted(String),
}

impl StageStatus {
    /// Whether `self -> to` is legal
    #[must_use]
    pub fn can_transition(&self, to: &Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running | Self::Skipped(_))
                | (
                    Self::Running,
                    Self::Completed | Self::Failed(_) | Self::Skipped(_) | Self::Aborted(_)
                )
        )
    }

    /// No further transition is possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Short lower-case label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
            Self::Aborted(_) => "aborted",
        }
    }

    /// Reason attached to failed, skipped or aborted stages
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed(r) | Self::Skipped(r) | Self::Aborted(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.label()),
            None => f.write_str(self.label()),
        }
    }
}
