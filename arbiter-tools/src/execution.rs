//! Execution records correlating side effects to their decisions.

use std::collections::BTreeMap;

use arbiter_primitives::{CorrelationId, FeatureActionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The side effect completed and produced a payload.
    Completed {
        /// Output returned by the tool.
        output: Value,
    },
    /// The side effect could not be performed.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Record of one tool invocation, created only for ALLOWED decisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    correlation_id: CorrelationId,
    key: FeatureActionKey,
    parameters: BTreeMap<String, Value>,
    outcome: ExecutionOutcome,
    timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Records a completed invocation.
    #[must_use]
    pub fn completed(
        correlation_id: CorrelationId,
        key: FeatureActionKey,
        parameters: BTreeMap<String, Value>,
        output: Value,
    ) -> Self {
        Self {
            correlation_id,
            key,
            parameters,
            outcome: ExecutionOutcome::Completed { output },
            timestamp: Utc::now(),
        }
    }

    /// Records a failed invocation.
    #[must_use]
    pub fn failed(
        correlation_id: CorrelationId,
        key: FeatureActionKey,
        parameters: BTreeMap<String, Value>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            key,
            parameters,
            outcome: ExecutionOutcome::Failed {
                reason: reason.into(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Returns the correlation to the originating decision.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the feature/action key of the invoked tool.
    #[must_use]
    pub fn key(&self) -> &FeatureActionKey {
        &self.key
    }

    /// Returns the parameters the tool was invoked with.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Returns the invocation outcome.
    #[must_use]
    pub fn outcome(&self) -> &ExecutionOutcome {
        &self.outcome
    }

    /// Returns `true` when the side effect completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Completed { .. })
    }

    /// Returns the failure reason, if the invocation failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ExecutionOutcome::Failed { reason } => Some(reason),
            ExecutionOutcome::Completed { .. } => None,
        }
    }

    /// Returns the invocation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
