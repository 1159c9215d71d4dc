//! Workspace manager behaviour against a recording git and, when available, real git

use patchgate_test_utils::Fixture;
use patchgate_workspace::{
    GitOutput, WorkspaceError, WorkspaceKind, WorkspaceManager, WorkspaceRequest, WorkspaceStatus,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Barrier};

#[test]
fn second_create_conflicts_until_cleanup() {
    let fx = Fixture::new();
    let manager = fx.manager();

    let first = manager.create(&WorkspaceRequest::worktree("SPE-1")).unwrap();
    assert_eq!(first.status, WorkspaceStatus::Active);
    assert_eq!(first.root, fx.worktrees.join("spe1"));
    assert_eq!(first.branch, "fix/spe1");
    assert!(first.root.is_dir());

    let err = manager.create(&WorkspaceRequest::worktree("SPE-1")).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_pre_mutation());

    let cleaned = manager.cleanup("SPE-1").unwrap().unwrap();
    assert_eq!(cleaned.status, WorkspaceStatus::Cleaned);
    assert!(!first.root.exists());
    assert_eq!(manager.status("SPE-1").unwrap(), WorkspaceStatus::NotCreated);

    let again = manager.create(&WorkspaceRequest::worktree("SPE-1")).unwrap();
    assert_eq!(again.status, WorkspaceStatus::Active);
}

#[test]
fn worktree_starts_from_base_commit() {
    let fx = Fixture::new();
    fx.manager()
        .create(&WorkspaceRequest::worktree("SPE-2").with_base_commit("abc123"))
        .unwrap();

    let adds = fx.git.calls_starting_with(&["worktree", "add"]);
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].last().map(String::as_str), Some("abc123"));
}

#[test]
fn worktree_prefers_remote_default_branch() {
    let fx = Fixture::new();
    fx.git.respond(
        &["symbolic-ref", "refs/remotes/origin/HEAD"],
        GitOutput::ok("refs/remotes/origin/main\n"),
    );
    fx.manager().create(&WorkspaceRequest::worktree("SPE-3")).unwrap();

    let adds = fx.git.calls_starting_with(&["worktree", "add"]);
    assert_eq!(adds[0].last().map(String::as_str), Some("origin/main"));
}

#[test]
fn failed_git_releases_the_claim() {
    let fx = Fixture::new();
    fx.git.respond(&["worktree", "add"], GitOutput::failed("fatal: bad ref"));
    let manager = fx.manager();

    let err = manager.create(&WorkspaceRequest::worktree("SPE-4")).unwrap_err();
    assert!(matches!(err, WorkspaceError::Git { .. }));
    assert_eq!(manager.status("SPE-4").unwrap(), WorkspaceStatus::NotCreated);
    assert!(manager.active().unwrap().is_empty());
}

#[test]
fn racing_creates_have_one_winner() {
    let fx = Fixture::new();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = fx.manager();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                manager.create(&WorkspaceRequest::worktree("SPE-5"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(WorkspaceError::is_conflict));
}

#[test]
fn branch_mode_refuses_dirty_checkout() {
    let fx = Fixture::new();
    fx.git.respond(&["status", "--porcelain"], GitOutput::ok(" M src/app.rs\n"));

    let err = fx
        .manager()
        .create(&WorkspaceRequest::branch("SPE-6").with_summary("Fix login"))
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::DirtyCheckout(_)));
    assert!(fx.git.calls_starting_with(&["checkout"]).is_empty());
}

#[test]
fn branch_mode_creates_named_branch_and_cleanup_preserves_it() {
    let fx = Fixture::new();
    fx.git.respond(&["rev-parse"], GitOutput::failed(""));
    let manager = fx.manager();

    let ws = manager
        .create(&WorkspaceRequest::branch("SPE-7").with_summary("Fix the login page!"))
        .unwrap();
    assert_eq!(ws.kind, WorkspaceKind::Branch);
    assert_eq!(ws.root, fx.repo);
    assert_eq!(ws.branch, "SPE-7-fix-the-login-page");
    assert_eq!(
        fx.git.calls_starting_with(&["checkout", "-b"]),
        vec![vec![
            "checkout".to_string(),
            "-b".into(),
            "SPE-7-fix-the-login-page".into(),
            "HEAD".into()
        ]]
    );

    manager.cleanup("SPE-7").unwrap();
    assert!(fx.repo.is_dir());
    assert!(fx.git.calls_starting_with(&["branch", "-D"]).is_empty());
    assert!(fx.git.calls_starting_with(&["worktree", "remove"]).is_empty());
}

#[test]
fn branch_mode_checks_out_existing_branch() {
    let fx = Fixture::new();
    fx.manager()
        .create(&WorkspaceRequest::branch("SPE-8").with_branch_name("feature/login"))
        .unwrap();
    assert_eq!(
        fx.git.calls_starting_with(&["checkout"]),
        vec![vec!["checkout".to_string(), "feature/login".into()]]
    );
}

#[test]
fn active_lists_every_claimed_ticket() {
    let fx = Fixture::new();
    let manager = fx.manager();
    manager.create(&WorkspaceRequest::worktree("SPE-10")).unwrap();
    manager.create(&WorkspaceRequest::worktree("SPE-9")).unwrap();

    let keys: Vec<_> = manager
        .active()
        .unwrap()
        .into_iter()
        .map(|w| w.ticket_key)
        .collect();
    assert_eq!(keys, vec!["SPE-10".to_string(), "SPE-9".to_string()]);
}

#[test]
fn orphaned_directory_blocks_until_cleaned() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.worktrees.join("spe11")).unwrap();
    let manager = fx.manager();

    assert_eq!(manager.status("SPE-11").unwrap(), WorkspaceStatus::Active);
    assert!(manager
        .create(&WorkspaceRequest::worktree("SPE-11"))
        .unwrap_err()
        .is_conflict());

    assert!(manager.cleanup("SPE-11").unwrap().is_some());
    assert!(manager.create(&WorkspaceRequest::worktree("SPE-11")).is_ok());
}

#[test]
fn cleanup_without_workspace_is_none() {
    let fx = Fixture::new();
    assert!(fx.manager().cleanup("SPE-12").unwrap().is_none());
}

#[test]
fn keys_sharing_a_slug_never_touch_each_others_workspace() {
    let fx = Fixture::new();
    let manager = fx.manager();
    let owner = manager.create(&WorkspaceRequest::worktree("SPE-12")).unwrap();
    assert_eq!(owner.root, fx.worktrees.join("spe12"));

    let err = manager.create(&WorkspaceRequest::worktree("SPE1-2")).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("held by SPE-12"), "{err}");

    let err = manager.cleanup("SPE1-2").unwrap_err();
    assert!(matches!(
        &err,
        WorkspaceError::SlugTaken { owner, .. } if owner == "SPE-12"
    ));
    assert!(manager.find("SPE1-2").is_err());

    assert!(owner.root.is_dir());
    assert!(fx.git.calls_starting_with(&["worktree", "remove"]).is_empty());
    assert_eq!(manager.status("SPE-12").unwrap(), WorkspaceStatus::Active);
    assert_eq!(manager.find("SPE-12").unwrap().unwrap().ticket_key, "SPE-12");
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn real_git_worktree_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    if !git(&repo, &["init", "-q"]) {
        eprintln!("git unavailable; skipping");
        return;
    }
    assert!(git(
        &repo,
        &[
            "-c",
            "user.name=Patchgate",
            "-c",
            "user.email=patchgate@example.com",
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            "init",
        ],
    ));

    let manager = WorkspaceManager::with_system_git(&repo, dir.path().join("worktrees"));
    let ws = manager.create(&WorkspaceRequest::worktree("SPE-13")).unwrap();
    assert!(ws.root.join(".git").exists());
    assert!(git(&repo, &["rev-parse", "--verify", "--quiet", "refs/heads/fix/spe13"]));

    manager.cleanup("SPE-13").unwrap();
    assert!(!ws.root.exists());
    assert!(!git(&repo, &["rev-parse", "--verify", "--quiet", "refs/heads/fix/spe13"]));
}
