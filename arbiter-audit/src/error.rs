//! Error types for the audit subsystem.

use arbiter_primitives::CorrelationId;
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by audit log backends.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying I/O failure while reading or writing the audit file.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// A follow-up record referenced a correlation id never appended.
    #[error("unknown correlation id {correlation_id}")]
    UnknownCorrelation {
        /// The unresolvable correlation id.
        correlation_id: CorrelationId,
    },
    /// An entry failed validation before append.
    #[error("invalid audit entry: {0}")]
    InvalidEntry(&'static str),
}

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
