//! Independent review (oversight) contract.
//!
//! The reviewer sees exactly what the deciding oracle saw plus the decision
//! under review, and answers with a verdict on whether that decision looks
//! consistent with the rules. Reviews happen after the fact and never alter
//! the decision.

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contract::{Decision, OracleError, OracleRequest, OracleResult};

/// Verdict tag of an oversight review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewOutcome {
    /// The decision appears consistent with the rule set.
    Clean,
    /// The decision looks inconsistent, low-confidence, or malformed.
    Suspect,
}

impl Display for ReviewOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "CLEAN",
            Self::Suspect => "SUSPECT",
        })
    }
}

/// Structured verdict produced by a review oracle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    verdict: ReviewOutcome,
    rationale: String,
    confidence_score: f32,
}

impl ReviewVerdict {
    /// Creates a CLEAN verdict.
    #[must_use]
    pub fn clean(rationale: impl Into<String>, confidence_score: f32) -> Self {
        Self {
            verdict: ReviewOutcome::Clean,
            rationale: rationale.into(),
            confidence_score,
        }
    }

    /// Creates a SUSPECT verdict.
    #[must_use]
    pub fn suspect(rationale: impl Into<String>, confidence_score: f32) -> Self {
        Self {
            verdict: ReviewOutcome::Suspect,
            rationale: rationale.into(),
            confidence_score,
        }
    }

    /// Returns the verdict tag.
    #[must_use]
    pub const fn verdict(&self) -> ReviewOutcome {
        self.verdict
    }

    /// Returns `true` when the review flagged the decision.
    #[must_use]
    pub fn is_suspect(&self) -> bool {
        self.verdict == ReviewOutcome::Suspect
    }

    /// Returns the reviewer's rationale.
    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Returns the confidence score in `[0, 1]`.
    #[must_use]
    pub const fn confidence_score(&self) -> f32 {
        self.confidence_score
    }

    /// Decodes a review reply, enforcing the contract strictly.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Schema`] on any deviation from the contract.
    pub fn parse_strict(payload: &str) -> OracleResult<Self> {
        let raw: RawVerdict = serde_json::from_str(payload)
            .map_err(|err| OracleError::schema(format!("undecodable review reply: {err}")))?;

        let verdict = match raw.verdict.as_str() {
            "CLEAN" => ReviewOutcome::Clean,
            "SUSPECT" => ReviewOutcome::Suspect,
            other => {
                return Err(OracleError::schema(format!(
                    "review verdict `{other}` is not one of CLEAN, SUSPECT"
                )));
            }
        };

        if !raw.confidence_score.is_finite() || !(0.0..=1.0).contains(&raw.confidence_score) {
            return Err(OracleError::schema(format!(
                "review confidence {} outside [0, 1]",
                raw.confidence_score
            )));
        }

        Ok(Self {
            verdict,
            rationale: raw.rationale,
            confidence_score: raw.confidence_score,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    verdict: String,
    rationale: String,
    confidence_score: f32,
}

/// A `(context, decision)` pair submitted for independent review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    request: OracleRequest,
    decision: Decision,
}

impl ReviewRequest {
    /// Pairs the original oracle request with the decision it produced.
    #[must_use]
    pub fn new(request: OracleRequest, decision: Decision) -> Self {
        Self { request, decision }
    }

    /// Returns the original oracle request.
    #[must_use]
    pub fn request(&self) -> &OracleRequest {
        &self.request
    }

    /// Returns the decision under review.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}

/// Trait implemented by review-oracle transports.
#[async_trait]
pub trait ReviewOracle: Send + Sync {
    /// Returns a short provider label used in logs.
    fn provider(&self) -> &str;

    /// Reviews the decision for consistency with its rule set.
    async fn review(&self, request: &ReviewRequest) -> OracleResult<ReviewVerdict>;
}
