//! Policy-gated tool calls for the implementer
//!
//! Every call builds an [`Operation`], has the engine decide on it (which
//! also records the decision) and only performs the effect on Allow. A deny
//! fails that one call and nothing else.

use crate::error::ToolError;
use parking_lot::Mutex;
use patchgate_policy::{Operation, SecurityPolicyEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// Result of a gated shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// File and command access for one workspace
#[derive(Debug)]
pub struct GatedTools {
    engine: SecurityPolicyEngine,
    modified: Mutex<BTreeSet<PathBuf>>,
    denied: AtomicUsize,
    command_timeout: Duration,
}

impl GatedTools {
    #[must_use]
    pub fn new(engine: SecurityPolicyEngine, command_timeout: Duration) -> Self {
        Self {
            engine,
            modified: Mutex::new(BTreeSet::new()),
            denied: AtomicUsize::new(0),
            command_timeout,
        }
    }

    /// Workspace root all calls are confined to
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        self.engine.root()
    }

    #[inline]
    #[must_use]
    pub fn engine(&self) -> &SecurityPolicyEngine {
        &self.engine
    }

    fn gate(&self, operation: Operation) -> Result<(), ToolError> {
        self.engine.evaluate(operation).into_result().map(drop).map_err(|denied| {
            self.denied.fetch_add(1, Ordering::Relaxed);
            ToolError::Denied(denied)
        })
    }

    /// Read a file inside the workspace
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String, ToolError> {
        let path = path.as_ref();
        self.gate(Operation::read(path))?;
        let resolved = self.engine.resolve(path);
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| ToolError::Io {
                op: "read",
                path: resolved,
                source,
            })
    }

    /// Write a file inside the workspace, creating parent directories
    ///
    /// The workspace-relative path joins the modified set once the write succeeds.
    pub async fn write_file(&self, path: impl AsRef<Path>, contents: &str) -> Result<(), ToolError> {
        let path = path.as_ref();
        self.gate(Operation::write(path))?;
        let resolved = self.engine.resolve(path);
        let io_err = |source| ToolError::Io {
            op: "write",
            path: resolved.clone(),
            source,
        };
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&resolved, contents).await.map_err(io_err)?;

        let recorded = self
            .engine
            .relative(&resolved)
            .unwrap_or_else(|| resolved.clone());
        tracing::debug!(path = %recorded.display(), "file written");
        self.modified.lock().insert(recorded);
        Ok(())
    }

    /// Run `command` with `sh -c` in the workspace root
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput, ToolError> {
        self.gate(Operation::shell(command))?;
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.engine.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ToolError::Spawn)?;

        let output = tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(self.command_timeout))?
            .map_err(ToolError::Spawn)?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Workspace-relative paths written so far, sorted and deduplicated
    #[must_use]
    pub fn modified_files(&self) -> Vec<PathBuf> {
        self.modified.lock().iter().cloned().collect()
    }

    /// Calls the policy refused
    #[must_use]
    pub fn denied_count(&self) -> usize {
        self.denied.load(Ordering::Relaxed)
    }
}
