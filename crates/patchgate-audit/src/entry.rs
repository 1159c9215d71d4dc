//! Audit entry types
//!
//! An entry records one gated decision or one stage transition:
//! `{sequence, timestamp, ticket, subject, outcome, reason, prev_hash, hash}`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash used as `prev_hash` of the first entry in a chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of gated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// File read
    FileRead,
    /// File write
    FileWrite,
    /// Shell command
    ShellCommand,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileRead => "file-read",
            Self::FileWrite => "file-write",
            Self::ShellCommand => "shell-command",
        }
    }
}

/// What an entry is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSubject {
    /// A file or shell operation evaluated by the policy engine
    Operation {
        /// Operation kind
        kind: OperationKind,
        /// Path or command text as requested
        target: String,
    },
    /// A pipeline stage transition
    Stage {
        /// Stage name
        stage: String,
    },
}

impl AuditSubject {
    /// Operation subject
    #[inline]
    pub fn operation(kind: OperationKind, target: impl Into<String>) -> Self {
        Self::Operation {
            kind,
            target: target.into(),
        }
    }

    /// Stage transition subject
    #[inline]
    pub fn stage(stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
        }
    }

    /// Whether this subject is an operation (as opposed to a stage)
    #[inline]
    #[must_use]
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Operation { kind, .. } => kind.as_str(),
            Self::Stage { .. } => "stage",
        }
    }

    fn target(&self) -> &str {
        match self {
            Self::Operation { target, .. } => target,
            Self::Stage { stage } => stage,
        }
    }
}

impl fmt::Display for AuditSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation {
                kind: OperationKind::ShellCommand,
                target,
            } => write!(f, "shell-command {target:?}"),
            Self::Operation { kind, target } => write!(f, "{} {target}", kind.as_str()),
            Self::Stage { stage } => write!(f, "stage {stage}"),
        }
    }
}

/// Outcome recorded for a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation permitted
    Allow,
    /// Operation blocked
    Deny,
    /// Stage entered
    Started,
    /// Stage produced its output
    Completed,
    /// Stage could not produce its output
    Failed,
    /// Stage intentionally not run
    Skipped,
    /// Stage interrupted by a human
    Aborted,
}

impl AuditOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 0 for each log
    pub sequence: u64,
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Ticket this entry belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    /// Operation or stage transition
    pub subject: AuditSubject,
    /// Decision or transition outcome
    pub outcome: AuditOutcome,
    /// Human-readable reason
    pub reason: String,
    /// Hash of the previous entry (or [`GENESIS_HASH`])
    pub prev_hash: String,
    /// Hash of this entry
    pub hash: String,
}

impl AuditEntry {
    /// Recompute the hash over every field except `hash` itself
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        hasher.update([0]);
        hasher.update(self.ticket.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.subject.tag().as_bytes());
        hasher.update([0]);
        hasher.update(self.subject.target().as_bytes());
        hasher.update([0]);
        hasher.update(self.outcome.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.reason.as_bytes());
        hasher.update([0]);
        hasher.update(self.prev_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash matches the entry contents
    #[inline]
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// One-line text rendering used by the console sink
    #[must_use]
    pub fn to_text_line(&self, max_target: usize) -> String {
        let subject = match &self.subject {
            AuditSubject::Operation { kind, target } if target.chars().count() > max_target => {
                let short: String = target.chars().take(max_target).collect();
                AuditSubject::operation(*kind, format!("{short}..."))
            }
            other => other.clone(),
        };
        format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            subject,
            self.outcome,
            self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditEntry {
        let mut entry = AuditEntry {
            sequence: 0,
            timestamp: Utc::now(),
            ticket: Some("SPE-1".to_string()),
            subject: AuditSubject::operation(OperationKind::FileWrite, "src/main.rs"),
            outcome: AuditOutcome::Allow,
            reason: "no deny rule matched".to_string(),
            prev_hash: GENESIS_HASH.to_string(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    #[test]
    fn hash_detects_field_changes() {
        let entry = sample();
        assert!(entry.is_intact());

        let mut tampered = entry.clone();
        tampered.outcome = AuditOutcome::Deny;
        assert!(!tampered.is_intact());

        let mut tampered = entry;
        tampered.reason.push('!');
        assert!(!tampered.is_intact());
    }

    #[test]
    fn hash_survives_json_roundtrip() {
        let entry = sample();
        let line = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&line).unwrap();
        assert!(back.is_intact());
        assert_eq!(back, entry);
    }

    #[test]
    fn text_line_truncates_long_commands() {
        let mut entry = sample();
        entry.subject = AuditSubject::operation(OperationKind::ShellCommand, "x".repeat(300));
        let line = entry.to_text_line(200);
        assert!(line.contains(&format!("{}...", "x".repeat(200))));
        assert!(!line.contains(&"x".repeat(201)));
    }

    #[test]
    fn subject_display() {
        assert_eq!(
            AuditSubject::operation(OperationKind::FileRead, "a.txt").to_string(),
            "file-read a.txt"
        );
        assert_eq!(AuditSubject::stage("Verify").to_string(), "stage Verify");
    }
}
