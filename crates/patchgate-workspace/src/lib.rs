//! Patchgate Workspace - isolated working copies per ticket
//!
//! Two kinds of workspace are supported:
//! - **Worktree**: a separate `git worktree` under the worktrees root, on
//!   branch `fix/<slug>`, so several tickets can be worked concurrently
//! - **Branch**: a dedicated branch inside the main checkout, for flows where
//!   a running dev server must observe the changes
//!
//! At most one workspace per ticket key is Active at a time. Separate runs are
//! separate processes, so the invariant is enforced by a durable lock record on
//! disk rather than an in-memory lock.

#![allow(missing_docs)]

pub mod error;
pub mod git;
pub mod manager;
pub mod naming;
pub mod types;

pub use error::WorkspaceError;
pub use git::{GitOutput, GitRunner, SystemGit};
pub use manager::{WorkspaceManager, RECORD_DIR};
pub use naming::{branch_name_for, slugify_summary, ticket_slug, worktree_branch};
pub use types::{Workspace, WorkspaceKind, WorkspaceRequest, WorkspaceStatus};
