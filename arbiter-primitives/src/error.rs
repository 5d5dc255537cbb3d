//! Shared error definitions for Arbiter primitive types.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the Arbiter workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided correlation identifier could not be parsed.
    #[error("invalid correlation id: {source}")]
    InvalidCorrelationId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Caller identifier failed validation.
    #[error("invalid caller id `{id}`: {reason}")]
    InvalidCallerId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Rule-set identifier failed validation.
    #[error("invalid rule set id `{id}`: {reason}")]
    InvalidRuleSetId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Feature/action key failed validation.
    #[error("invalid feature/action key: {reason}")]
    InvalidKey {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
