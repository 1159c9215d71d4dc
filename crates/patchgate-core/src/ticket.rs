//! Tickets and where they come from
//!
//! Remote ticket trackers are out of scope; the bundled [`FileTicketSource`]
//! reads exported tickets from a directory. Anything else plugs in through the
//! [`TicketSource`] trait.

use crate::error::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn unknown() -> String {
    "Unknown".to_string()
}

/// Ticket content the pipeline works from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unknown")]
    pub issue_type: String,
    #[serde(default = "unknown")]
    pub priority: String,
    #[serde(default = "unknown")]
    pub status: String,
}

impl Ticket {
    /// Ticket with only key and summary set
    #[must_use]
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            description: String::new(),
            issue_type: unknown(),
            priority: unknown(),
            status: unknown(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `Type | Priority | Status` line
    #[must_use]
    pub fn headline(&self) -> String {
        format!("{} | {} | {}", self.issue_type, self.priority, self.status)
    }
}

/// Fetches ticket content by key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Ticket, CapabilityError>;
}

/// Reads `<dir>/<KEY>.yaml`, `.yml` or `.json`
#[derive(Debug, Clone)]
pub struct FileTicketSource {
    dir: PathBuf,
}

impl FileTicketSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, key: &str) -> [PathBuf; 3] {
        ["yaml", "yml", "json"].map(|ext| self.dir.join(format!("{key}.{ext}")))
    }
}

#[async_trait]
impl TicketSource for FileTicketSource {
    async fn fetch(&self, key: &str) -> Result<Ticket, CapabilityError> {
        for path in self.candidates(key) {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let malformed = |message: String| CapabilityError::Malformed {
                what: format!("ticket file {}", path.display()),
                message,
            };
            let ticket: Ticket = if path.extension().is_some_and(|e| e == "json") {
                serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?
            } else {
                serde_yaml::from_str(&text).map_err(|e| malformed(e.to_string()))?
            };
            if ticket.key != key {
                return Err(malformed(format!("key {:?} does not match {key:?}", ticket.key)));
            }
            tracing::debug!(ticket = key, file = %path.display(), "ticket loaded");
            return Ok(ticket);
        }
        Err(CapabilityError::TicketNotFound(key.to_string()))
    }
}
