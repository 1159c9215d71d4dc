//! Capabilities from `[agents]`

use async_trait::async_trait;
use patchgate_core::{
    CapabilityError, Capabilities, ConfigError, ExternalBrowser, ExternalCommand,
    ExternalImplementer, ExternalPlanner, ExternalVerifier, FileTicketSource, GatedTools,
    ImplementRequest, ImplementSummary, Implementer, Plan, PlanRequest, Planner,
    VerificationReport, Verifier, VerifyRequest,
};
use patchgate_core::config::Settings;
use std::sync::Arc;

/// Stand-in for an agent a dry run never calls
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn error(self) -> CapabilityError {
        CapabilityError::failed(self.0, "not configured")
    }
}

#[async_trait]
impl Planner for Unconfigured {
    async fn plan(&self, _request: &PlanRequest) -> Result<Plan, CapabilityError> {
        Err(self.error())
    }
}

#[async_trait]
impl Implementer for Unconfigured {
    async fn implement(
        &self,
        _request: &ImplementRequest,
        _tools: &GatedTools,
    ) -> Result<ImplementSummary, CapabilityError> {
        Err(self.error())
    }
}

#[async_trait]
impl Verifier for Unconfigured {
    async fn verify(&self, _request: &VerifyRequest) -> Result<VerificationReport, CapabilityError> {
        Err(self.error())
    }
}

fn agent(
    name: &'static str,
    argv: Option<&[String]>,
    required: bool,
) -> Result<Option<ExternalCommand>, ConfigError> {
    match argv.map(ExternalCommand::from_argv) {
        Some(Some(command)) => Ok(Some(command)),
        Some(None) => Err(ConfigError::Invalid(format!("agents.{name} is an empty command"))),
        None if required => Err(ConfigError::Invalid(format!(
            "agents.{name} is not configured"
        ))),
        None => Ok(None),
    }
}

/// Build the capability set for a run
///
/// Planner, implementer and verifier are required unless `dry_run`; the
/// browser agent only when `browser` is requested.
pub fn capabilities(
    settings: &Settings,
    dry_run: bool,
    browser: bool,
) -> Result<Capabilities, ConfigError> {
    let agents = &settings.agents;
    let tickets = Arc::new(FileTicketSource::new(settings.tickets_dir()?));

    let planner: Arc<dyn Planner> = match agent("planner", agents.planner.as_deref(), !dry_run)? {
        Some(command) => Arc::new(ExternalPlanner(command)),
        None => Arc::new(Unconfigured("planner")),
    };
    let implementer: Arc<dyn Implementer> =
        match agent("implementer", agents.implementer.as_deref(), !dry_run)? {
            Some(command) => Arc::new(ExternalImplementer(command)),
            None => Arc::new(Unconfigured("implementer")),
        };
    let verifier: Arc<dyn Verifier> = match agent("verifier", agents.verifier.as_deref(), !dry_run)? {
        Some(command) => Arc::new(ExternalVerifier(command)),
        None => Arc::new(Unconfigured("verifier")),
    };

    let mut capabilities = Capabilities::new(tickets, planner, implementer, verifier);
    if let Some(command) = agent("browser", agents.browser.as_deref(), browser && !dry_run)? {
        capabilities = capabilities.with_browser(Arc::new(ExternalBrowser(command)));
    }
    Ok(capabilities)
}
