//! Patchgate Audit - append-only record of gated decisions
//!
//! Every policy decision and every pipeline stage transition is appended to an
//! [`AuditLog`]. Entries are:
//! - ordered by a monotonic sequence number
//! - hash-chained (each entry commits to its predecessor)
//! - fanned out to zero or more [`AuditSink`]s (JSON Lines file, console)
//!
//! Sink failures are logged and swallowed. The audit trail is diagnostic, not
//! transactional, so it never aborts the pipeline.
//!
//! # Example
//!
//! ```rust
//! use patchgate_audit::{AuditLog, AuditOutcome, AuditSubject};
//!
//! let log = AuditLog::new("SPE-1");
//! log.record(
//!     AuditSubject::stage("Plan"),
//!     AuditOutcome::Started,
//!     "delegating to planner",
//! );
//! assert_eq!(log.len(), 1);
//! assert!(log.verify_chain().is_ok());
//! ```

#![allow(missing_docs)]

pub mod entry;
pub mod error;
pub mod log;
pub mod sink;

pub use entry::{AuditEntry, AuditOutcome, AuditSubject, OperationKind, GENESIS_HASH};
pub use error::AuditError;
pub use log::{verify_entries, verify_file, AuditLog};
pub use sink::{AuditSink, ConsoleSink, FileSink};
