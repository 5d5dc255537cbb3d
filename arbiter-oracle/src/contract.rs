//! Oracle request/response contract and strict schema validation.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use arbiter_context::EvaluationContext;
use arbiter_primitives::CallerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result alias used by oracle implementations.
pub type OracleResult<T> = Result<T, OracleError>;

/// Error type shared by oracle transports.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Oracle is misconfigured or missing credentials.
    #[error("oracle not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target oracle.
    #[error("invalid oracle request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Transport-level failures (network, protocol, etc.).
    #[error("oracle transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The oracle did not answer within the configured bound.
    #[error("oracle timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("oracle rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The oracle reply violated the decision contract.
    #[error("oracle schema violation: {reason}")]
    Schema {
        /// Additional context about the contract violation.
        reason: String,
    },
}

impl OracleError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for contract violations.
    #[must_use]
    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema {
            reason: reason.into(),
        }
    }

    /// Returns `true` when a bounded retry is permitted for this failure.
    ///
    /// Transport, timeout, rate-limit, and schema failures may be retried; a
    /// misconfigured oracle or an invalid request will not improve on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Schema { .. }
        )
    }
}

/// Outcome tag of a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    /// The requested action may proceed.
    Allowed,
    /// The requested action is rejected by the rules.
    Denied,
    /// The request could not be evaluated; never treated as consent.
    Error,
}

impl Display for DecisionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allowed => "ALLOWED",
            Self::Denied => "DENIED",
            Self::Error => "ERROR",
        })
    }
}

/// Structured decision produced once per request.
///
/// This is both the oracle's mandatory reply shape and the decision surfaced
/// to callers:
///
/// ```json
/// { "decision": "ALLOWED", "reason": "...", "rule_violated": null, "confidence_score": 0.95 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "decision")]
    outcome: DecisionOutcome,
    reason: String,
    rule_violated: Option<String>,
    confidence_score: f32,
}

impl Decision {
    /// Creates an ALLOWED decision.
    #[must_use]
    pub fn allowed(reason: impl Into<String>, confidence_score: f32) -> Self {
        Self {
            outcome: DecisionOutcome::Allowed,
            reason: reason.into(),
            rule_violated: None,
            confidence_score,
        }
    }

    /// Creates a DENIED decision citing the violated rule text.
    #[must_use]
    pub fn denied(
        reason: impl Into<String>,
        rule_violated: Option<String>,
        confidence_score: f32,
    ) -> Self {
        Self {
            outcome: DecisionOutcome::Denied,
            reason: reason.into(),
            rule_violated,
            confidence_score,
        }
    }

    /// Creates an ERROR decision; the engine fails closed through this.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            outcome: DecisionOutcome::Error,
            reason: reason.into(),
            rule_violated: None,
            confidence_score: 0.0,
        }
    }

    /// Returns the outcome tag.
    #[must_use]
    pub const fn outcome(&self) -> DecisionOutcome {
        self.outcome
    }

    /// Returns `true` when the action may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.outcome == DecisionOutcome::Allowed
    }

    /// Returns `true` when the action was rejected by the rules.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.outcome == DecisionOutcome::Denied
    }

    /// Returns `true` when evaluation failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcome == DecisionOutcome::Error
    }

    /// Returns the human-readable justification.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the text of the rule that caused a denial, if any.
    #[must_use]
    pub fn rule_violated(&self) -> Option<&str> {
        self.rule_violated.as_deref()
    }

    /// Returns the confidence score in `[0, 1]`.
    #[must_use]
    pub const fn confidence_score(&self) -> f32 {
        self.confidence_score
    }

    /// Decodes an oracle reply, enforcing the contract strictly.
    ///
    /// Unknown fields, a non-enumerated decision tag, or a confidence score
    /// outside `[0, 1]` are all schema violations.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Schema`] on any deviation from the contract.
    pub fn parse_strict(payload: &str) -> OracleResult<Self> {
        let raw: RawDecision = serde_json::from_str(payload)
            .map_err(|err| OracleError::schema(format!("undecodable decision reply: {err}")))?;

        let outcome = match raw.decision.as_str() {
            "ALLOWED" => DecisionOutcome::Allowed,
            "DENIED" => DecisionOutcome::Denied,
            "ERROR" => DecisionOutcome::Error,
            other => {
                return Err(OracleError::schema(format!(
                    "decision tag `{other}` is not one of ALLOWED, DENIED, ERROR"
                )));
            }
        };

        if !raw.confidence_score.is_finite()
            || !(0.0..=1.0).contains(&raw.confidence_score)
        {
            return Err(OracleError::schema(format!(
                "confidence score {} outside [0, 1]",
                raw.confidence_score
            )));
        }

        Ok(Self {
            outcome,
            reason: raw.reason,
            rule_violated: raw.rule_violated,
            confidence_score: raw.confidence_score,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecision {
    decision: String,
    reason: String,
    #[serde(default)]
    rule_violated: Option<String>,
    confidence_score: f32,
}

/// Request submitted to the reasoning oracle.
///
/// Carries everything the oracle may consider: caller identity, the
/// feature/action pair, the canonical parameter map, the full rule texts,
/// and fixed environmental facts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    caller: CallerId,
    feature: String,
    action: String,
    parameters: BTreeMap<String, Value>,
    rules: Vec<String>,
    environment: BTreeMap<String, Value>,
}

impl OracleRequest {
    /// Builds an oracle request from an evaluation context.
    #[must_use]
    pub fn from_context(context: &EvaluationContext) -> Self {
        Self {
            caller: context.caller().clone(),
            feature: context.key().feature().to_owned(),
            action: context.key().action().to_owned(),
            parameters: context.parameters().clone(),
            rules: context.rules().to_vec(),
            environment: context.environment().clone(),
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the feature tag.
    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Returns the action tag.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the canonical parameter map.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Returns the full rule texts.
    #[must_use]
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Returns the environmental facts.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, Value> {
        &self.environment
    }
}

/// Trait implemented by reasoning-oracle transports.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Returns a short provider label used in logs.
    fn provider(&self) -> &str;

    /// Judges the request against its rules, answering with a decision that
    /// conforms to the contract.
    async fn judge(&self, request: &OracleRequest) -> OracleResult<Decision>;
}
