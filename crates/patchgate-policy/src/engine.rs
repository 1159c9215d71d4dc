//! The security policy engine

use crate::operation::{Operation, PolicyDecision};
use crate::path;
use crate::ruleset::SecurityRuleSet;
use patchgate_audit::AuditLog;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reason recorded for allowed operations
pub const ALLOW_REASON: &str = "no deny rule matched";

/// Decides whether proposed operations may run inside one workspace
///
/// Holds no mutable state of its own: the rule set is immutable and the audit
/// log serializes its own appends, so `evaluate` may be called concurrently.
#[derive(Debug, Clone)]
pub struct SecurityPolicyEngine {
    rules: Arc<SecurityRuleSet>,
    root: PathBuf,
    audit: Arc<AuditLog>,
}

impl SecurityPolicyEngine {
    /// Engine confined to `root`, recording into `audit`
    #[must_use]
    pub fn new(rules: Arc<SecurityRuleSet>, root: impl AsRef<Path>, audit: Arc<AuditLog>) -> Self {
        let root = path::canonicalize_lenient(&path::lexical(&absolute(root.as_ref())));
        Self { rules, root, audit }
    }

    /// Canonical workspace root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rule set in force
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &SecurityRuleSet {
        &self.rules
    }

    /// Audit log decisions are recorded into
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Absolute, canonical form of `path` (relative paths are rooted at the workspace)
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        path::resolve(&self.root, path)
    }

    /// Workspace-relative form of `path`, if it resolves inside the root
    #[must_use]
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        self.resolve(path)
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Deny reason for `operation`, without recording anything
    #[must_use]
    pub fn deny_reason(&self, operation: &Operation) -> Option<String> {
        match operation {
            Operation::FileAccess { path, .. } => self.check_file(path),
            Operation::ShellCommand { command } => self.rules.check_command(command),
        }
    }

    fn check_file(&self, path: &Path) -> Option<String> {
        let resolved = self.resolve(path);
        match resolved.strip_prefix(&self.root) {
            Ok(relative) => self.rules.check_path(relative),
            Err(_) => self.rules.check_path(&resolved).or_else(|| {
                self.rules
                    .confines_to_root()
                    .then(|| format!("path escapes workspace root: {}", resolved.display()))
            }),
        }
    }

    /// Decide on `operation` and append the decision to the audit log
    ///
    /// Every call produces exactly one audit entry, whatever the outcome.
    pub fn evaluate(&self, operation: Operation) -> PolicyDecision {
        let decision = match self.deny_reason(&operation) {
            Some(reason) => PolicyDecision::deny(operation, reason),
            None => PolicyDecision::allow(operation, ALLOW_REASON),
        };

        self.audit.record(
            decision.operation.audit_subject(),
            decision.outcome.into(),
            decision.reason.clone(),
        );

        if decision.is_allowed() {
            tracing::debug!(operation = %decision.operation, "policy allow");
        } else {
            tracing::warn!(
                operation = %decision.operation,
                reason = %decision.reason,
                "policy deny"
            );
        }
        decision
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}
