//! Capabilities backed by external commands
//!
//! Planner, verifier and browser agents get one JSON request on stdin and
//! answer with one JSON document on stdout.
//!
//! The implementer speaks JSON lines instead: it receives the request as its
//! first input line, then emits one tool call per line and reads one result
//! line back for each:
//!
//! ```text
//! -> {"op":"read","path":"src/lib.rs"}
//! <- {"ok":true,"content":"..."}
//! -> {"op":"write","path":".env","content":"X=1"}
//! <- {"ok":false,"denied":true,"error":"policy denied write .env: ..."}
//! -> {"op":"run","command":"cargo fmt"}
//! <- {"ok":true,"status":0,"stdout":"","stderr":""}
//! -> {"op":"done","summary":"fixed the login redirect"}
//! ```
//!
//! The child never touches the workspace except through these calls, which
//! all go through [`GatedTools`].

use crate::capability::{
    BrowserAgent, BrowserRequest, BrowserVerificationResult, ImplementRequest, ImplementSummary,
    Implementer, Plan, PlanRequest, Planner, VerificationReport, Verifier, VerifyRequest,
};
use crate::error::{CapabilityError, ToolError};
use crate::tools::GatedTools;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// First element is the program; `None` for an empty argv
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn spawn(&self, cwd: Option<&std::path::Path>) -> Result<Child, CapabilityError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.spawn().map_err(|source| CapabilityError::Spawn {
            command: self.display(),
            source,
        })
    }

    fn protocol(&self, message: impl Into<String>) -> CapabilityError {
        CapabilityError::Protocol {
            command: self.display(),
            message: message.into(),
        }
    }

    /// Send `request`, wait for exit, parse stdout as `R`
    pub async fn exchange<Q, R>(&self, request: &Q) -> Result<R, CapabilityError>
    where
        Q: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(|e| self.protocol(e.to_string()))?;
        let mut child = self.spawn(None)?;
        let stdin = child.stdin.take();
        // Feed stdin while draining stdout so a large request cannot fill both pipes
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
        if !output.status.success() {
            return Err(CapabilityError::Exited {
                command: self.display(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        serde_json::from_slice(&output.stdout).map_err(|e| CapabilityError::Malformed {
            what: format!("response from {}", self.program),
            message: e.to_string(),
        })
    }
}

/// Planner run as an external command
#[derive(Debug, Clone)]
pub struct ExternalPlanner(pub ExternalCommand);

#[async_trait]
impl Planner for ExternalPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<Plan, CapabilityError> {
        self.0.exchange(request).await
    }
}

/// Verifier run as an external command
#[derive(Debug, Clone)]
pub struct ExternalVerifier(pub ExternalCommand);

#[async_trait]
impl Verifier for ExternalVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerificationReport, CapabilityError> {
        self.0.exchange(request).await
    }
}

/// Browser agent run as an external command
#[derive(Debug, Clone)]
pub struct ExternalBrowser(pub ExternalCommand);

#[async_trait]
impl BrowserAgent for ExternalBrowser {
    async fn observe(
        &self,
        request: &BrowserRequest,
    ) -> Result<BrowserVerificationResult, CapabilityError> {
        self.0.exchange(request).await
    }
}

/// One tool call from the implementer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ToolCall {
    Read { path: PathBuf },
    Write { path: PathBuf, content: String },
    Run { command: String },
    Done {
        #[serde(default)]
        summary: String,
    },
}

/// Answer to one tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub denied: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stderr: Option<String>,
}

impl ToolReply {
    fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    fn failure(err: &ToolError) -> Self {
        Self {
            ok: false,
            denied: err.is_denied(),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Carry out one call through the gate
pub async fn dispatch(tools: &GatedTools, call: ToolCall) -> ToolReply {
    let result = match call {
        ToolCall::Read { path } => tools.read_file(&path).await.map(|content| ToolReply {
            content: Some(content),
            ..ToolReply::success()
        }),
        ToolCall::Write { path, content } => tools
            .write_file(&path, &content)
            .await
            .map(|()| ToolReply::success()),
        ToolCall::Run { command } => tools.run_command(&command).await.map(|out| ToolReply {
            ok: out.success(),
            status: out.status,
            stdout: Some(out.stdout),
            stderr: Some(out.stderr),
            ..ToolReply::default()
        }),
        ToolCall::Done { .. } => Ok(ToolReply::success()),
    };
    result.unwrap_or_else(|err| ToolReply::failure(&err))
}

/// Implementer run as an external command speaking the tool protocol
#[derive(Debug, Clone)]
pub struct ExternalImplementer(pub ExternalCommand);

#[async_trait]
impl Implementer for ExternalImplementer {
    async fn implement(
        &self,
        request: &ImplementRequest,
        tools: &GatedTools,
    ) -> Result<ImplementSummary, CapabilityError> {
        let command = &self.0;
        let mut child = command.spawn(Some(tools.root()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| command.protocol("stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| command.protocol("stdout unavailable"))?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                if stderr.read_to_string(&mut text).await.is_err() {
                    text.clear();
                }
            }
            text
        });

        let mut first = serde_json::to_string(request).map_err(|e| command.protocol(e.to_string()))?;
        first.push('\n');
        stdin.write_all(first.as_bytes()).await?;
        stdin.flush().await?;

        let mut lines = BufReader::new(stdout).lines();
        let mut summary = None;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let call: ToolCall = serde_json::from_str(&line)
                .map_err(|e| command.protocol(format!("bad tool call {line:?}: {e}")))?;
            if let ToolCall::Done { summary: text } = call {
                summary = Some(text);
                break;
            }
            tracing::debug!(call = ?call, "implementer tool call");
            let reply = dispatch(tools, call).await;
            let mut out = serde_json::to_string(&reply).map_err(|e| command.protocol(e.to_string()))?;
            out.push('\n');
            stdin.write_all(out.as_bytes()).await?;
            stdin.flush().await?;
        }
        drop(stdin);

        let status = child.wait().await?;
        let err_text = stderr_task.await.unwrap_or_default();

        match summary {
            Some(summary) if status.success() => Ok(ImplementSummary { summary }),
            Some(_) => Err(CapabilityError::Exited {
                command: command.display(),
                status: status.to_string(),
                stderr: err_text.trim().to_string(),
            }),
            None => Err(command.protocol(format!(
                "output ended before \"done\" ({status}): {}",
                err_text.trim()
            ))),
        }
    }
}
