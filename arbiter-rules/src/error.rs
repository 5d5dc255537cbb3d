//! Error types for the rules subsystem.

use arbiter_primitives::{CallerId, RuleSetId};
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by rule loading and resolution.
#[derive(Debug, Error)]
pub enum RuleError {
    /// No rule set is assigned to the caller.
    #[error("no rule set assigned to caller `{caller}`")]
    NotFound {
        /// Caller whose assignment is missing.
        caller: CallerId,
    },
    /// An assignment or lookup referenced a rule set that does not exist.
    #[error("unknown rule set `{id}`")]
    UnknownRuleSet {
        /// The missing rule-set identifier.
        id: RuleSetId,
    },
    /// The rules document failed validation.
    #[error("invalid rules document: {reason}")]
    InvalidDocument {
        /// Human-readable reason for rejection.
        reason: String,
    },
    /// Underlying I/O failure while reading the rules document.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// The rules document could not be decoded.
    #[error("rules document parse error: {source}")]
    Parse {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

impl RuleError {
    /// Helper to construct document validation errors from string-like values.
    #[must_use]
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }
}

impl From<arbiter_primitives::Error> for RuleError {
    fn from(value: arbiter_primitives::Error) -> Self {
        Self::InvalidDocument {
            reason: value.to_string(),
        }
    }
}

/// Result type alias for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;
