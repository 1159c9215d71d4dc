//! Thin seam over the `git` executable

use crate::error::WorkspaceError;
use std::path::Path;
use std::process::Command;

/// Captured result of one git invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Successful output with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stdout
    #[must_use]
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs git commands
///
/// `run` returns `Err` only when git could not be started; a non-zero exit is
/// reported through [`GitOutput::success`].
pub trait GitRunner: Send + Sync + std::fmt::Debug {
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput, WorkspaceError>;

    /// Run and turn a non-zero exit into [`WorkspaceError::Git`]
    fn run_checked(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput, WorkspaceError> {
        let out = self.run(cwd, args)?;
        if out.success {
            Ok(out)
        } else {
            Err(WorkspaceError::Git {
                command: args.join(" "),
                stderr: out.stderr.trim().to_string(),
            })
        }
    }
}

/// The system `git` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl GitRunner for SystemGit {
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput, WorkspaceError> {
        tracing::debug!(cwd = %cwd.display(), args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(WorkspaceError::GitUnavailable)?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
