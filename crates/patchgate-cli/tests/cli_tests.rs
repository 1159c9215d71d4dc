//! Commands driven through the real argument parser

use patchgate_audit::{AuditLog, AuditOutcome, AuditSubject, FileSink};
use patchgate_cli::{cli, commands};
use patchgate_core::config::Settings;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

struct Env {
    dir: tempfile::TempDir,
    settings: Settings,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("app");
        let tickets = dir.path().join("tickets");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::create_dir_all(&tickets).unwrap();
        std::fs::write(
            tickets.join("SPE-1.yaml"),
            "key: SPE-1\nsummary: Fix login\npriority: High\n",
        )
        .unwrap();

        let settings = Settings {
            repo_path: Some(repo),
            worktrees_path: Some(dir.path().join("worktrees")),
            tickets_dir: Some(tickets),
            contexts_dir: Some(dir.path().join("contexts")),
            ..Settings::default()
        };
        Self { dir, settings }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn exec(&self, args: &[&str]) -> anyhow::Result<i32> {
        let argv = std::iter::once("patchgate").chain(args.iter().copied());
        let matches = cli::command().try_get_matches_from(argv)?;
        commands::execute(&self.settings, &matches).await
    }
}

fn write_log(path: &Path) {
    let log = AuditLog::new("SPE-1").with_sink(FileSink::open(path).unwrap());
    log.record(AuditSubject::stage("FetchTicket"), AuditOutcome::Started, "");
    log.record(AuditSubject::stage("FetchTicket"), AuditOutcome::Completed, "");
    assert_eq!(log.sink_failures(), 0);
}

#[tokio::test]
async fn dry_run_needs_no_agents_and_creates_nothing() {
    let env = Env::new();
    let code = env.exec(&["run", "SPE-1", "--dry-run"]).await.unwrap();
    assert_eq!(code, 0);
    assert!(!env.path("worktrees").join("spe1").exists());
}

#[tokio::test]
async fn run_without_agents_is_a_configuration_error() {
    let env = Env::new();
    let err = env.exec(&["run", "SPE-1"]).await.unwrap_err();
    assert_eq!(commands::exit_code_for(&err), 2);
    assert!(err.to_string().contains("agents.planner"));
}

#[tokio::test]
async fn missing_repo_path_is_a_configuration_error() {
    let mut env = Env::new();
    env.settings.repo_path = None;
    let err = env.exec(&["run", "SPE-1", "--dry-run"]).await.unwrap_err();
    assert_eq!(commands::exit_code_for(&err), 2);
}

#[tokio::test]
async fn malformed_key_exits_two_through_the_report() {
    let env = Env::new();
    let code = env.exec(&["run", "spe-1", "--dry-run"]).await.unwrap();
    assert_eq!(code, 2);
}

#[tokio::test]
async fn dry_run_audit_log_verifies() {
    let env = Env::new();
    let log = env.path("audit/run.jsonl");
    let log_arg = log.to_string_lossy().into_owned();
    let code = env
        .exec(&["run", "SPE-1", "--dry-run", "--audit-log", &log_arg])
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert!(log.is_file());
    assert_eq!(env.exec(&["audit", "verify", &log_arg]).await.unwrap(), 0);
}

#[tokio::test]
async fn tampered_audit_log_fails_verification() {
    let env = Env::new();
    let log = env.path("audit.jsonl");
    write_log(&log);
    let log_arg = log.to_string_lossy().into_owned();
    assert_eq!(env.exec(&["audit", "verify", &log_arg]).await.unwrap(), 0);

    let text = std::fs::read_to_string(&log).unwrap();
    std::fs::write(&log, text.replacen("completed", "failed", 1)).unwrap();
    assert_eq!(env.exec(&["audit", "verify", &log_arg]).await.unwrap(), 1);
}

#[tokio::test]
async fn ticket_command_reads_the_ticket_dir() {
    let env = Env::new();
    assert_eq!(env.exec(&["ticket", "SPE-1"]).await.unwrap(), 0);
    assert_eq!(env.exec(&["ticket", "SPE-1", "--json"]).await.unwrap(), 0);

    let err = env.exec(&["ticket", "SPE-2"]).await.unwrap_err();
    assert_eq!(commands::exit_code_for(&err), 1);
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn context_show_reports_missing_document() {
    let env = Env::new();
    assert_eq!(env.exec(&["context", "path"]).await.unwrap(), 0);
    assert_eq!(env.exec(&["context", "show"]).await.unwrap(), 1);

    let doc = env.path("contexts/app/AGENT.md");
    std::fs::create_dir_all(doc.parent().unwrap()).unwrap();
    std::fs::write(&doc, "# App\n").unwrap();
    assert_eq!(env.exec(&["context", "show"]).await.unwrap(), 0);
}

#[tokio::test]
async fn cleanup_without_workspace_succeeds() {
    let env = Env::new();
    assert_eq!(env.exec(&["cleanup", "SPE-1"]).await.unwrap(), 0);

    let err = env.exec(&["cleanup", "nope"]).await.unwrap_err();
    assert_eq!(commands::exit_code_for(&err), 2);
}

#[tokio::test]
async fn health_fails_without_settings() {
    let mut env = Env::new();
    env.settings = Settings::default();
    assert_eq!(env.exec(&["health"]).await.unwrap(), 1);
}
