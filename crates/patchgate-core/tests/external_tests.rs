//! External implementer protocol against a shell-script agent

use patchgate_audit::AuditLog;
use patchgate_core::{
    CapabilityError, ExternalCommand, ExternalImplementer, ExternalPlanner, GatedTools,
    ImplementRequest, Implementer, Plan, PlanRequest, Planner, Ticket,
};
use patchgate_policy::{SecurityPolicyEngine, SecurityRuleSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn tools(root: &Path) -> GatedTools {
    let engine = SecurityPolicyEngine::new(
        Arc::new(SecurityRuleSet::standard()),
        root,
        Arc::new(AuditLog::new("SPE-1")),
    );
    GatedTools::new(engine, Duration::from_secs(10))
}

fn request(root: &Path) -> ImplementRequest {
    ImplementRequest {
        ticket: Ticket::new("SPE-1", "Fix login"),
        plan: Plan::default(),
        workspace_root: root.to_path_buf(),
        codebase_context: None,
        additional_info: None,
    }
}

fn agent(script: &str) -> ExternalImplementer {
    ExternalImplementer(ExternalCommand::new("sh").arg("-c").arg(script))
}

#[tokio::test]
async fn tool_calls_go_through_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tools(dir.path());
    let script = r#"
read request
echo '{"op":"write","path":"notes/ok.txt","content":"hello"}'
read first
echo '{"op":"write","path":".env","content":"X=1"}'
read second
case "$second" in *'"denied":true'*) denied=yes ;; *) denied=no ;; esac
echo '{"op":"read","path":"notes/ok.txt"}'
read third
case "$third" in *hello*) seen=yes ;; *) seen=no ;; esac
echo "{\"op\":\"done\",\"summary\":\"denied=$denied seen=$seen\"}"
"#;

    let summary = agent(script)
        .implement(&request(dir.path()), &tools)
        .await
        .unwrap();

    assert_eq!(summary.summary, "denied=yes seen=yes");
    assert_eq!(tools.modified_files(), vec![PathBuf::from("notes/ok.txt")]);
    assert_eq!(tools.denied_count(), 1);
    assert!(!dir.path().join(".env").exists());
}

#[tokio::test]
async fn exiting_without_done_is_a_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tools(dir.path());
    let script = r#"
read request
echo '{"op":"write","path":"a.txt","content":"a"}'
read reply
exit 0
"#;

    let err = agent(script)
        .implement(&request(dir.path()), &tools)
        .await
        .unwrap_err();

    assert!(matches!(err, CapabilityError::Protocol { .. }));
    assert_eq!(tools.modified_files(), vec![PathBuf::from("a.txt")]);
}

#[tokio::test]
async fn garbage_output_is_a_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tools(dir.path());

    let err = agent("read request; echo 'not json'")
        .implement(&request(dir.path()), &tools)
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Protocol { .. }));
}

#[tokio::test]
async fn large_request_does_not_stall_a_chatty_agent() {
    let dir = tempfile::tempdir().unwrap();
    // Answers before reading, then drains whatever it was sent
    let planner = ExternalPlanner(
        ExternalCommand::new("sh")
            .arg("-c")
            .arg(r#"echo '{"summary":"ok","steps":[]}'; cat > /dev/null"#),
    );
    let request = PlanRequest {
        ticket: Ticket::new("SPE-1", "Fix login"),
        workspace_root: dir.path().to_path_buf(),
        codebase_context: Some("x".repeat(1 << 20)),
        additional_info: None,
    };

    let plan = tokio::time::timeout(Duration::from_secs(30), planner.plan(&request))
        .await
        .expect("planner exchange stalled")
        .unwrap();
    assert_eq!(plan.summary, "ok");
    assert!(plan.steps.is_empty());
}

#[tokio::test]
async fn agent_ignoring_its_input_still_answers() {
    let dir = tempfile::tempdir().unwrap();
    let planner = ExternalPlanner(
        ExternalCommand::new("sh")
            .arg("-c")
            .arg(r#"echo '{"summary":"skipped input"}'"#),
    );
    let request = PlanRequest {
        ticket: Ticket::new("SPE-1", "Fix login"),
        workspace_root: dir.path().to_path_buf(),
        codebase_context: Some("y".repeat(1 << 20)),
        additional_info: None,
    };

    let plan = planner.plan(&request).await.unwrap();
    assert_eq!(plan.summary, "skipped input");
}
