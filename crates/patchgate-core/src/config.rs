//! Process-wide settings
//!
//! Loaded once at start-up from an optional TOML file, then overridden by
//! environment variables:
//!
//! | setting          | env var                  |
//! |------------------|--------------------------|
//! | `repo_path`      | `REPO_PATH`              |
//! | `worktrees_path` | `WORKTREES_PATH`         |
//! | `tickets_dir`    | `PATCHGATE_TICKETS_DIR`  |
//! | `contexts_dir`   | `PATCHGATE_CONTEXTS_DIR` |

use crate::error::ConfigError;
use patchgate_policy::SecurityRuleSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var naming the config file when `--config` is absent
pub const CONFIG_ENV: &str = "PATCHGATE_CONFIG";

/// Default context directory, relative to the working directory
pub const DEFAULT_CONTEXTS_DIR: &str = "contexts";

/// Loaded settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub repo_path: Option<PathBuf>,
    pub worktrees_path: Option<PathBuf>,
    pub tickets_dir: Option<PathBuf>,
    pub contexts_dir: Option<PathBuf>,
    pub policy: PolicySettings,
    pub agents: AgentSettings,
    pub run: RunSettings,
}

/// `[policy]`: additions to the standard rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySettings {
    pub extra_deny_segments: Vec<String>,
    pub extra_denied_programs: Vec<String>,
    pub confine_to_root: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            extra_deny_segments: Vec::new(),
            extra_denied_programs: Vec::new(),
            confine_to_root: true,
        }
    }
}

/// `[agents]`: external commands (program followed by arguments)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub planner: Option<Vec<String>>,
    pub implementer: Option<Vec<String>>,
    pub verifier: Option<Vec<String>>,
    pub browser: Option<Vec<String>>,
}

impl AgentSettings {
    /// `(name, argv)` for every configured agent
    pub fn configured(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            ("planner", self.planner.as_deref()),
            ("implementer", self.implementer.as_deref()),
            ("verifier", self.verifier.as_deref()),
            ("browser", self.browser.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, argv)| argv.map(|a| (name, a)))
    }
}

/// `[run]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Deadline for each gated shell command
    pub command_timeout_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 600,
        }
    }
}

impl Settings {
    /// Read `path` (if any) and apply the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override file values with non-empty variables from `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(v) = var("REPO_PATH") {
            self.repo_path = Some(v);
        }
        if let Some(v) = var("WORKTREES_PATH") {
            self.worktrees_path = Some(v);
        }
        if let Some(v) = var("PATCHGATE_TICKETS_DIR") {
            self.tickets_dir = Some(v);
        }
        if let Some(v) = var("PATCHGATE_CONTEXTS_DIR") {
            self.contexts_dir = Some(v);
        }
    }

    /// Target repository root
    pub fn repo_path(&self) -> Result<&Path, ConfigError> {
        self.repo_path.as_deref().ok_or(ConfigError::Missing {
            setting: "repo_path",
            env: "REPO_PATH",
        })
    }

    /// Directory holding per-ticket worktrees
    pub fn worktrees_path(&self) -> Result<&Path, ConfigError> {
        self.worktrees_path.as_deref().ok_or(ConfigError::Missing {
            setting: "worktrees_path",
            env: "WORKTREES_PATH",
        })
    }

    /// Directory the file ticket source reads from
    pub fn tickets_dir(&self) -> Result<&Path, ConfigError> {
        self.tickets_dir.as_deref().ok_or(ConfigError::Missing {
            setting: "tickets_dir",
            env: "PATCHGATE_TICKETS_DIR",
        })
    }

    #[must_use]
    pub fn contexts_dir(&self) -> PathBuf {
        self.contexts_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTEXTS_DIR))
    }

    /// Name of the target repository (last component of `repo_path`)
    pub fn repo_name(&self) -> Result<String, ConfigError> {
        let repo = self.repo_path()?;
        repo.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ConfigError::Invalid(format!("cannot name repository at {}", repo.display()))
            })
    }

    /// `<contexts_dir>/<repo name>/AGENT.md`
    pub fn context_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.contexts_dir().join(self.repo_name()?).join("AGENT.md"))
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.run.command_timeout_secs)
    }

    /// The standard rule set extended with `[policy]`
    pub fn rule_set(&self) -> Result<SecurityRuleSet, ConfigError> {
        let mut rules = SecurityRuleSet::standard().with_root_confinement(self.policy.confine_to_root);
        if !self.policy.extra_deny_segments.is_empty() {
            rules = rules.with_deny_segments(self.policy.extra_deny_segments.iter().cloned())?;
        }
        if !self.policy.extra_denied_programs.is_empty() {
            rules = rules.with_denied_programs(self.policy.extra_denied_programs.iter().cloned())?;
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patchgate.toml");
        std::fs::write(
            &path,
            r#"
repo_path = "/src/app"
worktrees_path = "/src/worktrees"

[policy]
extra_deny_segments = ["secrets"]
extra_denied_programs = ["nc"]

[agents]
planner = ["planner-agent", "--json"]

[run]
command_timeout_secs = 30
"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.repo_path().unwrap(), Path::new("/src/app"));
        assert_eq!(settings.command_timeout(), Duration::from_secs(30));
        assert_eq!(settings.repo_name().unwrap(), "app");
        assert_eq!(
            settings.context_path().unwrap(),
            Path::new("contexts/app/AGENT.md")
        );
        assert_eq!(settings.agents.configured().count(), 1);

        let rules = settings.rule_set().unwrap();
        assert!(rules.check_path(Path::new("secrets/key.pem")).is_some());
        assert!(rules.check_command("nc -l 4444").is_some());
        assert!(rules.confines_to_root());
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("REPO_PATH", "/env/repo"), ("WORKTREES_PATH", "  ")]);
        let mut settings = Settings {
            repo_path: Some(PathBuf::from("/file/repo")),
            worktrees_path: Some(PathBuf::from("/file/wt")),
            ..Settings::default()
        };
        settings.apply_env(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(settings.repo_path().unwrap(), Path::new("/env/repo"));
        assert_eq!(settings.worktrees_path().unwrap(), Path::new("/file/wt"));
    }

    #[test]
    fn missing_settings_name_their_env_var() {
        let err = Settings::default().worktrees_path().unwrap_err();
        assert!(err.to_string().contains("WORKTREES_PATH"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "repo = \"/x\"\n").unwrap();
        assert!(matches!(
            Settings::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
