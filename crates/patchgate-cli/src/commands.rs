//! Command handlers
//!
//! Each handler returns the process exit status. Errors that escape a handler
//! are mapped by [`exit_code_for`]: configuration problems exit 2, anything
//! else 1.

use crate::deploy;
use crate::wiring;
use anyhow::{anyhow, Context as _, Result};
use clap::ArgMatches;
use patchgate_audit::{verify_file, AuditLog, ConsoleSink, FileSink};
use patchgate_core::config::{Settings, CONFIG_ENV};
use patchgate_core::{
    context, health, summary, validate_ticket_key, BrowserOptions, ConfigError,
    FileTicketSource, PipelineOrchestrator, RunOptions, RunReport, SummaryOptions, SummaryTarget,
    TicketSource,
};
use patchgate_workspace::{WorkspaceKind, WorkspaceManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exit status for an error that ended a command early
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<ConfigError>()) {
        2
    } else {
        1
    }
}

/// `--config`, else `$PATCHGATE_CONFIG`
fn config_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    explicit.cloned().or_else(|| {
        std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
}

/// Load settings and run the selected subcommand
pub async fn dispatch(matches: &ArgMatches) -> Result<i32> {
    let path = config_path(matches.get_one::<PathBuf>("config"));
    let settings = Settings::load(path.as_deref())?;
    tracing::debug!(config = ?path, "settings loaded");
    execute(&settings, matches).await
}

/// Run the selected subcommand against `settings`
pub async fn execute(settings: &Settings, matches: &ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        Some(("run", args)) => run(settings, args).await,
        Some(("cleanup", args)) => cleanup(settings, args),
        Some(("ticket", args)) => ticket(settings, args).await,
        Some(("context", args)) => context_command(settings, args),
        Some(("health", _)) => Ok(health_command(settings)),
        Some(("audit", args)) => audit(args),
        Some((name, _)) => Err(anyhow!("unknown command {name}")),
        None => Err(anyhow!("no command given")),
    }
}

fn ticket_key(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("ticket")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing ticket key"))
}

fn manager(settings: &Settings) -> Result<WorkspaceManager> {
    Ok(WorkspaceManager::with_system_git(
        settings.repo_path()?,
        settings.worktrees_path()?,
    ))
}

fn audit_log(key: &str, args: &ArgMatches) -> Result<AuditLog> {
    let mut log = AuditLog::new(key);
    if let Some(path) = args.get_one::<PathBuf>("audit-log") {
        let sink = FileSink::open(path)
            .with_context(|| format!("cannot open audit log {}", path.display()))?;
        log = log.with_sink(sink);
    }
    if args.get_flag("audit-stderr") {
        log = log.with_sink(ConsoleSink::stderr());
    }
    Ok(log)
}

fn run_options(settings: &Settings, args: &ArgMatches, key: &str) -> Result<RunOptions> {
    let dry_run = args.get_flag("dry-run");
    let mut options = RunOptions::new(key)
        .dry_run(dry_run)
        .with_command_timeout(settings.command_timeout());

    if args.contains_id("branch") {
        options = options.with_kind(WorkspaceKind::Branch);
        if let Some(name) = args.get_one::<String>("branch") {
            options = options.with_branch_name(name.clone());
        }
    }
    if let Some(commit) = args.get_one::<String>("base-commit") {
        options = options.with_base_commit(commit.clone());
    }
    if args.get_flag("verify") {
        let url = args
            .get_one::<String>("verify-url")
            .map_or(crate::cli::DEFAULT_VERIFY_URL, String::as_str);
        options = options.with_browser(BrowserOptions::new(url, deploy::stdin_listener()));
    }

    let files: Vec<PathBuf> = args
        .get_many::<PathBuf>("info-file")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let texts: Vec<String> = args
        .get_many::<String>("info-text")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if let Some(info) = context::additional_info(&files, &texts)? {
        options = options.with_additional_info(info);
    }
    Ok(options)
}

fn summary_options(
    settings: &Settings,
    args: &ArgMatches,
    context_file: Option<PathBuf>,
) -> Result<Option<SummaryOptions>> {
    let target = if let Some(path) = args.get_one::<PathBuf>("summary-path") {
        SummaryTarget::Path(path.clone())
    } else if args.get_flag("summary-to-contexts") {
        SummaryTarget::Contexts {
            dir: settings.contexts_dir(),
            repo: settings.repo_name()?,
        }
    } else if args.get_flag("summary") {
        SummaryTarget::WorkspaceRoot
    } else {
        return Ok(None);
    };
    Ok(Some(SummaryOptions {
        include_metadata: args.get_flag("summary-metadata"),
        target,
        context_file,
    }))
}

async fn run(settings: &Settings, args: &ArgMatches) -> Result<i32> {
    let key = ticket_key(args)?;
    let dry_run = args.get_flag("dry-run");

    let rules = Arc::new(settings.rule_set()?);
    let workspaces = manager(settings)?;
    let capabilities = wiring::capabilities(settings, dry_run, args.get_flag("verify"))?;
    let mut options = run_options(settings, args, key)?;

    let explicit_context = args.get_one::<PathBuf>("context").map(PathBuf::as_path);
    let context_path = context::resolve_path(settings, explicit_context)?;
    let context_file = match context::load(&context_path)? {
        Some(text) => {
            tracing::info!(path = %context_path.display(), "codebase context loaded");
            options = options.with_codebase_context(text);
            Some(context_path)
        }
        None => None,
    };
    let summary = summary_options(settings, args, context_file)?;

    let audit = Arc::new(audit_log(key, args)?);
    let orchestrator = PipelineOrchestrator::new(capabilities, workspaces, rules, Arc::clone(&audit));
    let report = orchestrator.run(options).await;

    if let Some(summary) = summary {
        write_summary(&report, &summary);
    }
    if audit.sink_failures() > 0 {
        tracing::warn!(failures = audit.sink_failures(), "some audit entries were not persisted");
    }

    println!("{}", report.render());
    Ok(report.exit_code())
}

fn write_summary(report: &RunReport, options: &SummaryOptions) {
    match summary::write(report, options) {
        Ok(Some(path)) => println!("Summary written to {}", path.display()),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "cannot write summary"),
    }
}

fn cleanup(settings: &Settings, args: &ArgMatches) -> Result<i32> {
    let key = ticket_key(args)?;
    validate_ticket_key(key)?;
    match manager(settings)?.cleanup(key)? {
        Some(workspace) => println!(
            "Cleaned up {} workspace for {key} at {}",
            workspace.kind,
            workspace.root.display()
        ),
        None => println!("No workspace for {key}"),
    }
    Ok(0)
}

async fn ticket(settings: &Settings, args: &ArgMatches) -> Result<i32> {
    let key = ticket_key(args)?;
    validate_ticket_key(key)?;
    let source = FileTicketSource::new(settings.tickets_dir()?);
    let ticket = source.fetch(key).await?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&ticket)?);
    } else {
        println!("{}: {}", ticket.key, ticket.summary);
        println!("{}", ticket.headline());
        if !ticket.description.is_empty() {
            println!();
            println!("{}", ticket.description.trim_end());
        }
    }
    Ok(0)
}

fn context_command(settings: &Settings, args: &ArgMatches) -> Result<i32> {
    let path = settings.context_path()?;
    match args.subcommand_name() {
        Some("path") => {
            println!("{}", path.display());
            Ok(0)
        }
        Some("show") => show_context(&path),
        _ => Err(anyhow!("expected `context show` or `context path`")),
    }
}

fn show_context(path: &Path) -> Result<i32> {
    match context::load(path)? {
        Some(text) => {
            print!("{text}");
            Ok(0)
        }
        None => {
            eprintln!("No context document at {}", path.display());
            Ok(1)
        }
    }
}

fn health_command(settings: &Settings) -> i32 {
    let checks = health::run_checks(settings);
    for check in &checks {
        println!("{check}");
    }
    let failed = checks.iter().filter(|c| !c.is_ok()).count();
    if failed == 0 {
        println!("All {} checks passed", checks.len());
        0
    } else {
        println!("{failed} of {} checks failed", checks.len());
        1
    }
}

fn audit(args: &ArgMatches) -> Result<i32> {
    let Some(("verify", verify)) = args.subcommand() else {
        return Err(anyhow!("expected `audit verify <FILE>`"));
    };
    let path = verify
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("missing audit log file"))?;
    match verify_file(path) {
        Ok(count) => {
            println!("{}: {count} entries, chain intact", path.display());
            Ok(0)
        }
        Err(e) => {
            println!("{}: {e}", path.display());
            Ok(1)
        }
    }
}
