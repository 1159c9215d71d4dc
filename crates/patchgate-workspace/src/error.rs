//! Error types for workspace management
//!
//! Conflicts and invalid keys are raised before anything is touched on disk;
//! git failures are raised by the command that failed.

use crate::types::WorkspaceStatus;
use std::path::PathBuf;

/// Workspace management error
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The ticket already has an Active workspace
    #[error("workspace for {ticket_key} already active at {}", location.display())]
    Conflict {
        ticket_key: String,
        location: PathBuf,
    },

    /// Another ticket's key reduces to the same slug and holds the workspace
    #[error("workspace {} for {ticket_key} is held by {owner}", location.display())]
    SlugTaken {
        ticket_key: String,
        owner: String,
        location: PathBuf,
    },

    /// The ticket key yields no usable slug
    #[error("invalid ticket key: {0:?}")]
    InvalidKey(String),

    /// A commit or branch name that git would misread
    #[error("invalid git ref: {0:?}")]
    InvalidRef(String),

    /// Branch mode needs a clean main checkout
    #[error("uncommitted changes in {}; commit or stash them first", .0.display())]
    DirtyCheckout(PathBuf),

    /// A git command exited unsuccessfully
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// git could not be started at all
    #[error("cannot run git: {0}")]
    GitUnavailable(#[source] std::io::Error),

    /// A lock record could not be read or written
    #[error("bad workspace record {}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Illegal status transition
    #[error("illegal workspace transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: WorkspaceStatus,
        to: WorkspaceStatus,
    },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Another run already owns this ticket's workspace
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::SlugTaken { .. })
    }

    /// Raised before any git or filesystem mutation happened
    #[inline]
    #[must_use]
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::SlugTaken { .. }
                | Self::InvalidKey(_)
                | Self::InvalidRef(_)
                | Self::DirtyCheckout(_)
        )
    }
}
