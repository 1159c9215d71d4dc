//! Configuration health checks
//!
//! Fast, offline checks only: nothing here talks to the network.

use crate::config::Settings;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub duration: Duration,
}

impl HealthCheck {
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_ok() { "ok" } else { "FAILED" };
        write!(
            f,
            "[{mark:>6}] {:<22} {} ({}ms)",
            self.name,
            self.message,
            self.duration.as_millis()
        )
    }
}

fn timed(name: impl Into<String>, check: impl FnOnce() -> Result<String, String>) -> HealthCheck {
    let start = Instant::now();
    let (status, message) = match check() {
        Ok(message) => (HealthStatus::Ok, message),
        Err(message) => (HealthStatus::Failed, message),
    };
    HealthCheck {
        name: name.into(),
        status,
        message,
        duration: start.elapsed(),
    }
}

/// Look `program` up on `path_var` (a `PATH`-style list)
#[must_use]
pub fn find_on_path(program: &str, path_var: Option<&std::ffi::OsStr>) -> Option<std::path::PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Run every check against `settings`
#[must_use]
pub fn run_checks(settings: &Settings) -> Vec<HealthCheck> {
    let path_var = std::env::var_os("PATH");
    let mut checks = vec![
        timed("repo_path", || {
            let repo = settings.repo_path().map_err(|e| e.to_string())?;
            crate::validation::validate_repo_path(repo).map_err(|e| e.to_string())?;
            Ok(format!("{} is a git checkout", repo.display()))
        }),
        timed("worktrees_path", || {
            let root = settings.worktrees_path().map_err(|e| e.to_string())?;
            std::fs::create_dir_all(root)
                .map_err(|e| format!("cannot create {}: {e}", root.display()))?;
            Ok(format!("{} is usable", root.display()))
        }),
        timed("tickets_dir", || {
            let dir = settings.tickets_dir().map_err(|e| e.to_string())?;
            if dir.is_dir() {
                Ok(format!("{} exists", dir.display()))
            } else {
                Err(format!("{} is not a directory", dir.display()))
            }
        }),
        timed("git", || {
            find_on_path("git", path_var.as_deref())
                .map(|p| format!("found at {}", p.display()))
                .ok_or_else(|| "git not found on PATH".to_string())
        }),
    ];

    for (name, argv) in settings.agents.configured() {
        checks.push(timed(format!("agent.{name}"), || {
            let program = argv.first().ok_or("empty command")?;
            find_on_path(program, path_var.as_deref())
                .map(|p| format!("found at {}", p.display()))
                .ok_or_else(|| format!("{program} not found on PATH"))
        }));
    }

    for check in &checks {
        tracing::debug!(check = %check.name, ok = check.is_ok(), "health check");
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_settings_fail_their_checks() {
        let checks = run_checks(&Settings::default());
        let failed: Vec<_> = checks.iter().filter(|c| !c.is_ok()).map(|c| c.name.as_str()).collect();
        assert!(failed.contains(&"repo_path"));
        assert!(failed.contains(&"worktrees_path"));
        assert!(failed.contains(&"tickets_dir"));
    }

    #[test]
    fn healthy_layout_passes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("app");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::create_dir_all(dir.path().join("tickets")).unwrap();

        let settings = Settings {
            repo_path: Some(repo),
            worktrees_path: Some(dir.path().join("worktrees")),
            tickets_dir: Some(dir.path().join("tickets")),
            ..Settings::default()
        };
        let checks = run_checks(&settings);
        for name in ["repo_path", "worktrees_path", "tickets_dir"] {
            let check = checks.iter().find(|c| c.name == name).unwrap();
            assert!(check.is_ok(), "{check}");
        }
        assert!(dir.path().join("worktrees").is_dir());
    }

    #[test]
    fn path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("planner-agent");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        let path_var = std::env::join_paths([dir.path()]).unwrap();

        assert_eq!(find_on_path("planner-agent", Some(&path_var)), Some(tool.clone()));
        assert_eq!(find_on_path("nope", Some(&path_var)), None);
        assert_eq!(find_on_path(tool.to_str().unwrap(), None), Some(tool));
        assert_eq!(find_on_path("x", None), None::<PathBuf>);
    }
}
