//! Wire types exchanged with decision-requesting collaborators.

use std::collections::BTreeMap;

use arbiter_oracle::Decision;
use arbiter_primitives::CorrelationId;
use arbiter_tools::ExecutionRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decision request submitted by a collaborator (UI, API gateway, ...).
///
/// ```json
/// { "user": "user_1", "feature": "ATTENDANCE", "action": "CHECK-IN",
///   "parameters": { "time": "08:15", "location": "ProjectSite" } }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Caller identity.
    pub user: String,
    /// Feature name.
    pub feature: String,
    /// Action name.
    pub action: String,
    /// Parameter values keyed by name; casing is canonicalized downstream.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl DecisionRequest {
    /// Creates a request with no parameters.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        feature: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            feature: feature.into(),
            action: action.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// Decision response returned to the collaborator.
///
/// Carries the decision fields plus, when a tool ran (or should have run),
/// the execution result, and the correlation id linking to the audit trail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(flatten)]
    decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execution_result: Option<ExecutionRecord>,
    correlation_id: CorrelationId,
}

impl DecisionResponse {
    pub(crate) fn new(
        decision: Decision,
        execution_result: Option<ExecutionRecord>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            decision,
            execution_result,
            correlation_id,
        }
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Returns the execution result, if a tool invocation was attempted.
    #[must_use]
    pub fn execution_result(&self) -> Option<&ExecutionRecord> {
        self.execution_result.as_ref()
    }

    /// Returns the correlation id of the audit entry for this request.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_decodes_the_wire_shape() {
        let request: DecisionRequest = serde_json::from_value(json!({
            "user": "user_1",
            "feature": "ATTENDANCE",
            "action": "CHECK-IN",
            "parameters": { "time": "08:15", "location": "ProjectSite" }
        }))
        .unwrap();

        assert_eq!(request.user, "user_1");
        assert_eq!(request.parameters.get("time"), Some(&json!("08:15")));
    }

    #[test]
    fn parameters_default_to_empty() {
        let request: DecisionRequest = serde_json::from_value(json!({
            "user": "user_1",
            "feature": "ATTENDANCE",
            "action": "CHECK-IN"
        }))
        .unwrap();
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn response_flattens_decision_fields() {
        let response = DecisionResponse::new(
            Decision::denied("too early", Some("[ATTENDANCE] ...".into()), 0.9),
            None,
            CorrelationId::random(),
        );
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["decision"], "DENIED");
        assert_eq!(value["reason"], "too early");
        assert!(value.get("execution_result").is_none());
        assert!(value.get("correlation_id").is_some());
    }
}
