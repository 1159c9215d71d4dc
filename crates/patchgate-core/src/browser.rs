//! Human-gated browser verification
//!
//! `Idle -> AwaitingDeploy -> Observing -> Classified`, with `Aborted` reachable
//! from `AwaitingDeploy` and `Failed` from `Observing`.
//!
//! `AwaitingDeploy` is the one unbounded wait in a run: it blocks on a
//! single-slot channel until the operator confirms the deploy or interrupts.

use crate::capability::{BrowserAgent, BrowserRequest, BrowserVerificationResult};
use crate::ticket::Ticket;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::sync::mpsc;

/// Operator input while waiting for a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploySignal {
    Confirmed,
    Interrupted,
}

/// Opens the deploy signal channel
///
/// Called only when the coordinator enters `AwaitingDeploy`, so interrupt
/// handling is not installed for runs that never get there.
pub type DeployListener = Box<dyn FnOnce() -> mpsc::Receiver<DeploySignal> + Send>;

/// Listener fed by a closure that sends one signal
pub fn listener_from<F>(source: F) -> DeployListener
where
    F: FnOnce(mpsc::Sender<DeploySignal>) + Send + 'static,
{
    Box::new(move || {
        let (tx, rx) = mpsc::channel(1);
        source(tx);
        rx
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    AwaitingDeploy,
    Observing,
    Classified,
    Aborted,
    Failed,
}

impl CoordinatorState {
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::AwaitingDeploy)
                | (Self::AwaitingDeploy, Self::Observing | Self::Aborted)
                | (Self::Observing, Self::Classified | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Classified | Self::Aborted | Self::Failed)
    }
}

/// How the browser step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    Classified(BrowserVerificationResult),
    /// The operator interrupted the deploy wait
    Aborted { reason: String },
    /// The browser agent errored
    Failed { reason: String },
}

/// Drives one browser verification
pub struct BrowserVerificationCoordinator<'a> {
    agent: &'a dyn BrowserAgent,
    prompt: Box<dyn Write + Send>,
    state: CoordinatorState,
}

impl<'a> BrowserVerificationCoordinator<'a> {
    /// Coordinator printing its deploy prompt to `prompt`
    #[must_use]
    pub fn new(agent: &'a dyn BrowserAgent, prompt: Box<dyn Write + Send>) -> Self {
        Self {
            agent,
            prompt,
            state: CoordinatorState::Idle,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    fn enter(&mut self, to: CoordinatorState) {
        if !self.state.can_transition(to) {
            tracing::error!(from = ?self.state, to = ?to, "illegal browser coordinator transition");
        }
        tracing::debug!(from = ?self.state, to = ?to, "browser coordinator");
        self.state = to;
    }

    /// Prompt, wait for the deploy, observe and classify
    pub async fn run(
        mut self,
        ticket: &Ticket,
        base_url: &str,
        expected: &str,
        listener: DeployListener,
    ) -> BrowserOutcome {
        let target = target_url(base_url, ticket);
        self.enter(CoordinatorState::AwaitingDeploy);
        let prompt = format!(
            "\nDeploy the changes for {} so they are served at {base_url}.\n\
             Press Enter once deployed (Ctrl-C to skip browser verification)...\n",
            ticket.key
        );
        if let Err(e) = self
            .prompt
            .write_all(prompt.as_bytes())
            .and_then(|()| self.prompt.flush())
        {
            tracing::warn!(error = %e, "cannot print deploy prompt");
        }

        let mut signals = listener();
        match signals.recv().await {
            Some(DeploySignal::Confirmed) => {}
            Some(DeploySignal::Interrupted) | None => {
                self.enter(CoordinatorState::Aborted);
                return BrowserOutcome::Aborted {
                    reason: "deploy wait interrupted by operator".to_string(),
                };
            }
        }

        self.enter(CoordinatorState::Observing);
        let request = BrowserRequest {
            ticket: ticket.clone(),
            base_url: base_url.to_string(),
            target_url: target,
            expected: expected.to_string(),
        };
        match self.agent.observe(&request).await {
            Ok(mut result) => {
                self.enter(CoordinatorState::Classified);
                result.url_visited.get_or_insert(request.target_url);
                BrowserOutcome::Classified(result)
            }
            Err(e) => {
                self.enter(CoordinatorState::Failed);
                BrowserOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// `base_url` joined with the first `/path` mentioned in the ticket
///
/// Falls back to `base_url` itself when the ticket names no path.
#[must_use]
pub fn target_url(base_url: &str, ticket: &Ticket) -> String {
    let base = base_url.trim_end_matches('/');
    let path = [ticket.summary.as_str(), ticket.description.as_str()]
        .into_iter()
        .flat_map(str::split_whitespace)
        .map(|word| word.trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | ',' | '.' | '(' | ')')))
        .find(|word| {
            word.len() > 1
                && word.starts_with('/')
                && !word.starts_with("//")
                && word[1..]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_/.?=&#".contains(c))
        });
    match path {
        Some(path) => format!("{base}{path}"),
        None => format!("{base}/"),
    }
}
