//! Creating, tracking and removing per-ticket workspaces
//!
//! A workspace is Active exactly while its lock record exists at
//! `<worktrees_root>/.patchgate/<slug>.json`. The record is created with
//! create-new semantics, so two processes racing for the same ticket cannot
//! both succeed.

use crate::error::WorkspaceError;
use crate::git::{GitRunner, SystemGit};
use crate::naming::{branch_name_for, check_ref, ticket_slug, worktree_branch};
use crate::types::{Workspace, WorkspaceKind, WorkspaceRequest, WorkspaceStatus};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory under the worktrees root holding lock records
pub const RECORD_DIR: &str = ".patchgate";

/// Owner of every workspace created from one repository
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    repo_root: PathBuf,
    worktrees_root: PathBuf,
    git: Arc<dyn GitRunner>,
}

impl WorkspaceManager {
    /// Manager driving `git` through `git`
    #[must_use]
    pub fn new(
        repo_root: impl Into<PathBuf>,
        worktrees_root: impl Into<PathBuf>,
        git: Arc<dyn GitRunner>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktrees_root: worktrees_root.into(),
            git,
        }
    }

    /// Manager using the system `git` binary
    #[must_use]
    pub fn with_system_git(repo_root: impl Into<PathBuf>, worktrees_root: impl Into<PathBuf>) -> Self {
        Self::new(repo_root, worktrees_root, Arc::new(SystemGit))
    }

    /// Main checkout
    #[inline]
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Parent directory of Worktree-kind workspaces
    #[inline]
    #[must_use]
    pub fn worktrees_root(&self) -> &Path {
        &self.worktrees_root
    }

    /// Where the Worktree-kind workspace for `ticket_key` lives
    pub fn worktree_path(&self, ticket_key: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(self.worktrees_root.join(ticket_slug(ticket_key)?))
    }

    fn record_path(&self, slug: &str) -> PathBuf {
        self.worktrees_root
            .join(RECORD_DIR)
            .join(format!("{slug}.json"))
    }

    /// Create the workspace described by `request`
    ///
    /// Fails with [`WorkspaceError::Conflict`] when the ticket already has an
    /// Active workspace.
    pub fn create(&self, request: &WorkspaceRequest) -> Result<Workspace, WorkspaceError> {
        let slug = ticket_slug(&request.ticket_key)?;
        if let Some(commit) = &request.base_commit {
            check_ref(commit)?;
        }

        let (root, branch) = match request.kind {
            WorkspaceKind::Worktree => (self.worktrees_root.join(&slug), worktree_branch(&slug)),
            WorkspaceKind::Branch => {
                let branch = request.branch_name.clone().unwrap_or_else(|| {
                    branch_name_for(&request.ticket_key, request.summary.as_deref())
                });
                (self.repo_root.clone(), branch)
            }
        };
        check_ref(&branch)?;

        // A half-written record belongs to a racing claim for this slug
        let location = match self.find(&request.ticket_key) {
            Ok(Some(existing)) => Some(existing.root),
            Ok(None) => None,
            Err(WorkspaceError::Record { path, .. }) => Some(path),
            Err(e) => return Err(e),
        };
        if let Some(location) = location {
            return Err(WorkspaceError::Conflict {
                ticket_key: request.ticket_key.clone(),
                location,
            });
        }
        if request.kind == WorkspaceKind::Worktree && root.exists() {
            return Err(WorkspaceError::Conflict {
                ticket_key: request.ticket_key.clone(),
                location: root,
            });
        }

        let mut workspace = Workspace {
            ticket_key: request.ticket_key.clone(),
            kind: request.kind,
            root,
            branch,
            base_commit: request.base_commit.clone(),
            status: WorkspaceStatus::NotCreated,
            created_at: Utc::now(),
        };
        workspace.transition(WorkspaceStatus::Active)?;
        self.claim(&slug, &workspace)?;

        let prepared = match workspace.kind {
            WorkspaceKind::Worktree => self.add_worktree(&workspace),
            WorkspaceKind::Branch => self.switch_branch(&workspace),
        };
        if let Err(e) = prepared {
            self.release(&slug);
            return Err(e);
        }

        tracing::info!(
            ticket = %workspace.ticket_key,
            kind = %workspace.kind,
            root = %workspace.root.display(),
            branch = %workspace.branch,
            "workspace active"
        );
        Ok(workspace)
    }

    /// Write the lock record, failing if one already exists
    fn claim(&self, slug: &str, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let path = self.record_path(slug);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(match read_record(&path) {
                    Ok(existing) if existing.ticket_key != workspace.ticket_key => {
                        WorkspaceError::SlugTaken {
                            ticket_key: workspace.ticket_key.clone(),
                            owner: existing.ticket_key,
                            location: existing.root,
                        }
                    }
                    Ok(existing) => WorkspaceError::Conflict {
                        ticket_key: workspace.ticket_key.clone(),
                        location: existing.root,
                    },
                    Err(_) => WorkspaceError::Conflict {
                        ticket_key: workspace.ticket_key.clone(),
                        location: path,
                    },
                });
            }
            Err(e) => return Err(e.into()),
        };
        let json = serde_json::to_vec_pretty(workspace).map_err(|source| WorkspaceError::Record {
            path: path.clone(),
            source,
        })?;
        file.write_all(&json)?;
        file.sync_all()?;
        Ok(())
    }

    fn release(&self, slug: &str) {
        let path = self.record_path(slug);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(record = %path.display(), error = %e, "cannot remove workspace record");
            }
        }
    }

    fn fetch_origin(&self) -> Result<(), WorkspaceError> {
        let out = self.git.run(&self.repo_root, &["fetch", "origin"])?;
        if !out.success {
            tracing::warn!(stderr = %out.stderr.trim(), "git fetch origin failed; using local refs");
        }
        Ok(())
    }

    /// `base_commit`, else `origin/<default>`, else `HEAD`
    fn start_point(&self, base_commit: Option<&str>) -> Result<String, WorkspaceError> {
        if let Some(commit) = base_commit {
            return Ok(commit.to_string());
        }
        let out = self
            .git
            .run(&self.repo_root, &["symbolic-ref", "refs/remotes/origin/HEAD"])?;
        if out.success {
            if let Some(remote) = out.text().strip_prefix("refs/remotes/") {
                if !remote.is_empty() {
                    return Ok(remote.to_string());
                }
            }
        }
        Ok("HEAD".to_string())
    }

    fn add_worktree(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        fs::create_dir_all(&self.worktrees_root)?;
        self.fetch_origin()?;
        let start = self.start_point(workspace.base_commit.as_deref())?;
        let root = workspace.root.to_string_lossy();
        self.git.run_checked(
            &self.repo_root,
            &["worktree", "add", "-b", &workspace.branch, &root, &start],
        )?;
        Ok(())
    }

    fn switch_branch(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let status = self
            .git
            .run_checked(&self.repo_root, &["status", "--porcelain"])?;
        if !status.text().is_empty() {
            return Err(WorkspaceError::DirtyCheckout(self.repo_root.clone()));
        }
        self.fetch_origin()?;

        let name = workspace.branch.as_str();
        let local_ref = format!("refs/heads/{name}");
        let local = self
            .git
            .run(&self.repo_root, &["rev-parse", "--verify", "--quiet", &local_ref])?;
        if local.success {
            tracing::info!(branch = name, "checking out existing branch");
            self.git.run_checked(&self.repo_root, &["checkout", name])?;
            return Ok(());
        }

        let remote = self
            .git
            .run(&self.repo_root, &["ls-remote", "--heads", "origin", name])?;
        if remote.success && !remote.text().is_empty() {
            let tracking = format!("origin/{name}");
            tracing::info!(branch = name, "tracking existing remote branch");
            self.git
                .run_checked(&self.repo_root, &["checkout", "-b", name, &tracking])?;
            return Ok(());
        }

        let start = self.start_point(workspace.base_commit.as_deref())?;
        self.git
            .run_checked(&self.repo_root, &["checkout", "-b", name, &start])?;
        Ok(())
    }

    /// Tear down the workspace for `ticket_key`
    ///
    /// Worktree kind removes the checkout and its `fix/<slug>` branch. Branch
    /// kind leaves the checkout and branch untouched. Either way the lock
    /// record is dropped. Returns `None` when there was nothing to clean.
    ///
    /// Refuses with [`WorkspaceError::SlugTaken`] when the record belongs to
    /// a different ticket whose key reduces to the same slug.
    pub fn cleanup(&self, ticket_key: &str) -> Result<Option<Workspace>, WorkspaceError> {
        let slug = ticket_slug(ticket_key)?;
        let Some(mut workspace) = self.find(ticket_key)?.or_else(|| self.orphan(ticket_key, &slug)) else {
            tracing::info!(ticket = ticket_key, "no workspace to clean up");
            return Ok(None);
        };

        match workspace.kind {
            WorkspaceKind::Worktree => self.remove_worktree(&workspace)?,
            WorkspaceKind::Branch => tracing::info!(
                ticket = ticket_key,
                branch = %workspace.branch,
                "branch workspace preserved for inspection"
            ),
        }
        self.release(&slug);
        workspace.transition(WorkspaceStatus::Cleaned)?;
        tracing::info!(ticket = ticket_key, "workspace cleaned");
        Ok(Some(workspace))
    }

    /// Worktree directory left behind without a record
    fn orphan(&self, ticket_key: &str, slug: &str) -> Option<Workspace> {
        let root = self.worktrees_root.join(slug);
        root.exists().then(|| Workspace {
            ticket_key: ticket_key.to_string(),
            kind: WorkspaceKind::Worktree,
            root,
            branch: worktree_branch(slug),
            base_commit: None,
            status: WorkspaceStatus::Active,
            created_at: Utc::now(),
        })
    }

    fn remove_worktree(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let root = workspace.root.to_string_lossy();
        if workspace.root.exists() {
            let out = self
                .git
                .run(&self.repo_root, &["worktree", "remove", "--force", &root])?;
            if !out.success {
                tracing::warn!(stderr = %out.stderr.trim(), "git worktree remove failed");
            }
        }
        self.git.run(&self.repo_root, &["worktree", "prune"])?;
        let deleted = self
            .git
            .run(&self.repo_root, &["branch", "-D", &workspace.branch])?;
        if !deleted.success {
            tracing::debug!(branch = %workspace.branch, "branch already gone");
        }
        if workspace.root.exists() {
            fs::remove_dir_all(&workspace.root)?;
        }
        Ok(())
    }

    /// Lock record for `ticket_key`, if Active
    ///
    /// A record written for another ticket sharing the slug is an error, not
    /// a match.
    pub fn find(&self, ticket_key: &str) -> Result<Option<Workspace>, WorkspaceError> {
        let path = self.record_path(&ticket_slug(ticket_key)?);
        let workspace: Workspace = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| WorkspaceError::Record { path, source })?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if workspace.ticket_key != ticket_key {
            return Err(WorkspaceError::SlugTaken {
                ticket_key: ticket_key.to_string(),
                owner: workspace.ticket_key,
                location: workspace.root,
            });
        }
        Ok(Some(workspace))
    }

    /// Current status of the ticket's workspace
    ///
    /// A leftover worktree directory without a record counts as Active, since
    /// it blocks creation just the same.
    pub fn status(&self, ticket_key: &str) -> Result<WorkspaceStatus, WorkspaceError> {
        let slug = ticket_slug(ticket_key)?;
        let active = self.record_path(&slug).exists() || self.worktrees_root.join(&slug).exists();
        Ok(if active {
            WorkspaceStatus::Active
        } else {
            WorkspaceStatus::NotCreated
        })
    }

    /// Every Active workspace, ordered by ticket key
    pub fn active(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let dir = self.worktrees_root.join(RECORD_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut workspaces = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match read_record(&path) {
                    Ok(ws) => workspaces.push(ws),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable workspace record"),
                }
            }
        }
        workspaces.sort_by(|a, b| a.ticket_key.cmp(&b.ticket_key));
        Ok(workspaces)
    }
}

fn read_record(path: &Path) -> Result<Workspace, WorkspaceError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| WorkspaceError::Record {
        path: path.to_path_buf(),
        source,
    })
}
