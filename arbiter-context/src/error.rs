//! Validation errors raised while building evaluation contexts.

use arbiter_rules::ParamType;
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors produced by context construction.
///
/// All of these are cheap, local rejections raised before any oracle call.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The request was malformed before rule-aware validation began.
    #[error("invalid decision request: {reason}")]
    InvalidRequest {
        /// Human-readable reason for rejection.
        reason: String,
    },
    /// No rule in the caller's rule set mentions the feature/action pair.
    #[error("feature `{feature}` with action `{action}` is not covered by the assigned rule set")]
    UnknownFeatureAction {
        /// Requested feature tag.
        feature: String,
        /// Requested action tag.
        action: String,
    },
    /// A parameter required by an applicable rule was not supplied.
    #[error("missing parameter `{name}` required by the applicable rules")]
    MissingParameter {
        /// Tag name of the missing parameter.
        name: String,
    },
    /// A supplied parameter value does not match its inferred type.
    #[error("parameter `{name}` is not a valid {expected} value")]
    ParameterType {
        /// Tag name of the offending parameter.
        name: String,
        /// Type inferred from tag usage across the rule set.
        expected: ParamType,
    },
    /// Canonical serialization failed.
    #[error("context serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

impl ContextError {
    /// Helper to construct request-shape errors from string-like values.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Result type alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;
