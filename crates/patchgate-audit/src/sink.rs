//! Audit sinks
//!
//! A sink receives every entry appended to an [`crate::AuditLog`]. Two sinks
//! ship with the crate and may be active at the same time:
//! - [`FileSink`]: JSON Lines, append mode, flushed per entry
//! - [`ConsoleSink`]: one `[AUDIT]` text line per entry (stderr by default)

use crate::entry::AuditEntry;
use crate::error::AuditError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Longest command text the console sink prints verbatim
pub const CONSOLE_TARGET_LIMIT: usize = 200;

/// Destination for audit entries
///
/// Called with the log's lock held, so implementations need no synchronization
/// of their own.
pub trait AuditSink: Send + std::fmt::Debug {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Write one entry
    fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Append-only JSON Lines file sink
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open (or create) the file in append mode, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the underlying file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Human-readable streaming sink
pub struct ConsoleSink {
    writer: Box<dyn Write + Send>,
}

impl ConsoleSink {
    /// Console sink writing to stderr
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Console sink writing to an arbitrary stream
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl AuditSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        writeln!(
            self.writer,
            "[AUDIT] {}",
            entry.to_text_line(CONSOLE_TARGET_LIMIT)
        )?;
        self.writer.flush()?;
        Ok(())
    }
}
