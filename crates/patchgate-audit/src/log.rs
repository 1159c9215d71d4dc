//! The append-only audit log

use crate::entry::{AuditEntry, AuditOutcome, AuditSubject, GENESIS_HASH};
use crate::error::AuditError;
use crate::sink::AuditSink;
use chrono::Utc;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<AuditEntry>,
    sinks: Vec<Box<dyn AuditSink>>,
    sink_failures: usize,
}

/// Ordered, hash-chained record of decisions and stage transitions
///
/// `record` holds the internal lock while the entry is hashed, stored and
/// written to every sink, so concurrent callers observe a single total order
/// and each decision maps to exactly one entry.
#[derive(Debug, Default)]
pub struct AuditLog {
    ticket: Option<String>,
    inner: Mutex<LogState>,
}

impl AuditLog {
    /// Log whose entries are correlated with `ticket`
    #[must_use]
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: Some(ticket.into()),
            inner: Mutex::new(LogState::default()),
        }
    }

    /// Log without ticket correlation
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Attach a sink (builder form)
    #[must_use]
    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.inner.get_mut().sinks.push(Box::new(sink));
        self
    }

    /// Attach a sink to a shared log
    pub fn add_sink(&self, sink: Box<dyn AuditSink>) {
        self.inner.lock().sinks.push(sink);
    }

    /// Ticket this log is correlated with
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> Option<&str> {
        self.ticket.as_deref()
    }

    /// Append an entry and fan it out to every sink
    ///
    /// Sink failures are counted and reported through `tracing`; they never
    /// fail the append.
    pub fn record(
        &self,
        subject: AuditSubject,
        outcome: AuditOutcome,
        reason: impl Into<String>,
    ) -> AuditEntry {
        let mut state = self.inner.lock();
        let prev_hash = state
            .entries
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.hash.clone());

        let mut entry = AuditEntry {
            sequence: state.entries.len() as u64,
            timestamp: Utc::now(),
            ticket: self.ticket.clone(),
            subject,
            outcome,
            reason: reason.into(),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        let LogState {
            entries,
            sinks,
            sink_failures,
        } = &mut *state;
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.write(&entry) {
                *sink_failures += 1;
                tracing::warn!(sink = sink.name(), error = %e, "audit sink write failed");
            }
        }
        entries.push(entry.clone());
        entry
    }

    /// Snapshot of all entries in append order
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    /// Entries whose subject is a gated operation
    #[must_use]
    pub fn operation_entries(&self) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.subject.is_operation())
            .cloned()
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of failed sink writes so far
    #[must_use]
    pub fn sink_failures(&self) -> usize {
        self.inner.lock().sink_failures
    }

    /// Hash of the latest entry
    #[must_use]
    pub fn tail_hash(&self) -> Option<String> {
        self.inner.lock().entries.last().map(|e| e.hash.clone())
    }

    /// Verify the in-memory chain
    pub fn verify_chain(&self) -> Result<(), AuditError> {
        verify_entries(&self.inner.lock().entries).map(|_| ())
    }
}

/// Verify one or more concatenated chains
///
/// A chain restarts wherever `sequence == 0`, which is how separate runs
/// appending to the same file appear. Returns the number of entries checked.
pub fn verify_entries(entries: &[AuditEntry]) -> Result<usize, AuditError> {
    let mut prev: Option<&AuditEntry> = None;
    for entry in entries {
        let expected_prev = match prev {
            Some(p) if entry.sequence != 0 => {
                if entry.sequence != p.sequence + 1 {
                    return Err(AuditError::ChainBroken {
                        sequence: entry.sequence,
                        message: format!("expected sequence {}", p.sequence + 1),
                    });
                }
                p.hash.as_str()
            }
            None if entry.sequence != 0 => {
                return Err(AuditError::ChainBroken {
                    sequence: entry.sequence,
                    message: "chain does not start at sequence 0".to_string(),
                });
            }
            _ => GENESIS_HASH,
        };

        if entry.prev_hash != expected_prev {
            return Err(AuditError::ChainBroken {
                sequence: entry.sequence,
                message: "prev_hash does not match predecessor".to_string(),
            });
        }
        if !entry.is_intact() {
            return Err(AuditError::ChainBroken {
                sequence: entry.sequence,
                message: "entry hash does not match contents".to_string(),
            });
        }
        prev = Some(entry);
    }
    Ok(entries.len())
}

/// Load a JSON Lines audit file and verify every chain in it
pub fn verify_file(path: impl AsRef<Path>) -> Result<usize, AuditError> {
    let file = std::fs::File::open(path.as_ref())?;
    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry =
            serde_json::from_str(&line).map_err(|e| AuditError::MalformedLine {
                line: idx + 1,
                message: e.to_string(),
            })?;
        entries.push(entry);
    }
    verify_entries(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::OperationKind;

    #[test]
    fn sequence_and_chain_advance() {
        let log = AuditLog::new("SPE-7");
        let a = log.record(AuditSubject::stage("Plan"), AuditOutcome::Started, "");
        let b = log.record(
            AuditSubject::operation(OperationKind::FileWrite, "a.rs"),
            AuditOutcome::Allow,
            "no deny rule matched",
        );

        assert_eq!(a.sequence, 0);
        assert_eq!(a.prev_hash, GENESIS_HASH);
        assert_eq!(b.sequence, 1);
        assert_eq!(b.prev_hash, a.hash);
        assert_eq!(b.ticket.as_deref(), Some("SPE-7"));
        assert_eq!(log.tail_hash(), Some(b.hash));
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn operation_entries_filters_stages() {
        let log = AuditLog::detached();
        log.record(AuditSubject::stage("Plan"), AuditOutcome::Completed, "");
        log.record(
            AuditSubject::operation(OperationKind::ShellCommand, "git status"),
            AuditOutcome::Allow,
            "",
        );
        assert_eq!(log.len(), 2);
        assert_eq!(log.operation_entries().len(), 1);
    }

    #[test]
    fn verify_rejects_reordered_entries() {
        let log = AuditLog::detached();
        for i in 0..3 {
            log.record(AuditSubject::stage(format!("s{i}")), AuditOutcome::Started, "");
        }
        let mut entries = log.entries();
        entries.swap(1, 2);
        let err = verify_entries(&entries).unwrap_err();
        assert!(err.is_integrity_violation());
    }
}
