//! Workspace data types and the status state machine

use crate::error::WorkspaceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a ticket's changes are isolated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    /// Separate checkout under the worktrees root
    Worktree,
    /// Dedicated branch inside the main checkout
    Branch,
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Worktree => "worktree",
            Self::Branch => "branch",
        })
    }
}

/// Lifecycle of one workspace instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    NotCreated,
    Active,
    Cleaned,
}

impl WorkspaceStatus {
    /// Whether `self -> to` is legal
    pub fn validate_transition(self, to: Self) -> Result<(), WorkspaceError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(WorkspaceError::IllegalTransition { from: self, to })
        }
    }

    /// Statuses reachable from `self` in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::NotCreated => &[Self::Active],
            Self::Active => &[Self::Cleaned],
            Self::Cleaned => &[],
        }
    }

    /// No further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// An isolated working copy for one ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub ticket_key: String,
    pub kind: WorkspaceKind,
    /// Directory the agent works in
    pub root: PathBuf,
    pub branch: String,
    pub base_commit: Option<String>,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Move to `to`, rejecting illegal transitions
    pub fn transition(&mut self, to: WorkspaceStatus) -> Result<(), WorkspaceError> {
        self.status.validate_transition(to)?;
        self.status = to;
        Ok(())
    }
}

/// Parameters for [`crate::WorkspaceManager::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRequest {
    pub ticket_key: String,
    pub kind: WorkspaceKind,
    pub base_commit: Option<String>,
    /// Explicit branch name (Branch kind only)
    pub branch_name: Option<String>,
    /// Ticket summary used to derive a Branch-kind branch name
    pub summary: Option<String>,
}

impl WorkspaceRequest {
    /// Request of the given kind
    #[must_use]
    pub fn new(ticket_key: impl Into<String>, kind: WorkspaceKind) -> Self {
        Self {
            ticket_key: ticket_key.into(),
            kind,
            base_commit: None,
            branch_name: None,
            summary: None,
        }
    }

    /// Isolated worktree request
    #[must_use]
    pub fn worktree(ticket_key: impl Into<String>) -> Self {
        Self::new(ticket_key, WorkspaceKind::Worktree)
    }

    /// In-checkout branch request
    #[must_use]
    pub fn branch(ticket_key: impl Into<String>) -> Self {
        Self::new(ticket_key, WorkspaceKind::Branch)
    }

    /// Start from a specific commit
    #[inline]
    #[must_use]
    pub fn with_base_commit(mut self, commit: impl Into<String>) -> Self {
        self.base_commit = Some(commit.into());
        self
    }

    /// Use an explicit branch name
    #[inline]
    #[must_use]
    pub fn with_branch_name(mut self, name: impl Into<String>) -> Self {
        self.branch_name = Some(name.into());
        self
    }

    /// Summary to derive the branch name from
    #[inline]
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}
