//! Error types for the audit trail

/// Audit errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Sink or file I/O failed
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be (de)serialized
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hash chain does not verify
    #[error("audit chain broken at sequence {sequence}: {message}")]
    ChainBroken {
        /// Sequence number of the first offending entry
        sequence: u64,
        /// What did not match
        message: String,
    },

    /// A persisted line could not be parsed
    #[error("malformed audit line {line}: {message}")]
    MalformedLine {
        /// 1-indexed line number
        line: usize,
        /// Parser message
        message: String,
    },
}

impl AuditError {
    /// Whether this error indicates tampering rather than an I/O problem
    #[inline]
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::ChainBroken { .. })
    }
}
