//! Persisted rules document.
//!
//! The external rule editor owns this storage; Arbiter only reads the shape:
//!
//! ```json
//! {
//!   "rule_sets": { "rule_set_1": { "name": "...", "rules": ["..."] } },
//!   "user_assignments": { "user_1": "rule_set_1" },
//!   "project_location": "ProjectSite"
//! }
//! ```
//!
//! Top-level keys other than `rule_sets` and `user_assignments` are treated
//! as environmental facts and flow into every evaluation context.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RuleError, RuleResult};

/// A rule set as persisted: display name plus ordered rule texts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetSpec {
    /// Display name shown in rule-management surfaces.
    pub name: String,
    /// Ordered natural-language rule texts.
    pub rules: Vec<String>,
}

/// The full persisted document: rule sets, caller assignments, and
/// environmental facts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    /// Rule sets keyed by identifier.
    #[serde(default)]
    pub rule_sets: BTreeMap<String, RuleSetSpec>,
    /// Caller identity to rule-set identifier assignments.
    #[serde(default)]
    pub user_assignments: BTreeMap<String, String>,
    /// Remaining top-level keys, e.g. `project_location`.
    #[serde(flatten)]
    pub environment: BTreeMap<String, Value>,
}

impl RulesDocument {
    /// Creates an empty document, useful for programmatic assembly in tests
    /// and demos.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a rule set.
    #[must_use]
    pub fn with_rule_set<I, S>(mut self, id: impl Into<String>, name: impl Into<String>, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule_sets.insert(
            id.into(),
            RuleSetSpec {
                name: name.into(),
                rules: rules.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Assigns a caller to a rule set.
    #[must_use]
    pub fn with_assignment(mut self, caller: impl Into<String>, rule_set: impl Into<String>) -> Self {
        self.user_assignments.insert(caller.into(), rule_set.into());
        self
    }

    /// Records an environmental fact.
    #[must_use]
    pub fn with_environment(mut self, key: impl Into<String>, value: Value) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    /// Decodes a document from JSON bytes and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Parse`] for malformed JSON and
    /// [`RuleError::InvalidDocument`] when the decoded document is
    /// inconsistent.
    pub fn from_json_slice(bytes: &[u8]) -> RuleResult<Self> {
        let document: Self = serde_json::from_slice(bytes)?;
        document.validate()?;
        Ok(document)
    }

    /// Reads and validates a document from a file path.
    ///
    /// This is the fatal-only startup condition: a missing or inconsistent
    /// document refuses to load rather than letting the engine start with an
    /// empty rule index.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Io`], [`RuleError::Parse`], or
    /// [`RuleError::InvalidDocument`].
    pub fn load(path: impl AsRef<Path>) -> RuleResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidDocument`] when the document contains no
    /// rule sets, a rule set has no usable rules, or an assignment references
    /// a rule set that does not exist.
    pub fn validate(&self) -> RuleResult<()> {
        if self.rule_sets.is_empty() {
            return Err(RuleError::invalid_document(
                "document must define at least one rule set",
            ));
        }

        for (id, spec) in &self.rule_sets {
            if spec.rules.iter().all(|rule| rule.trim().is_empty()) {
                return Err(RuleError::invalid_document(format!(
                    "rule set `{id}` has no usable rules"
                )));
            }
        }

        for (caller, rule_set) in &self.user_assignments {
            if !self.rule_sets.contains_key(rule_set) {
                return Err(RuleError::invalid_document(format!(
                    "assignment for `{caller}` references unknown rule set `{rule_set}`"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "rule_sets": {
            "rule_set_1": {
                "name": "Standard Attendance Policy",
                "rules": [
                    "[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00"
                ]
            }
        },
        "user_assignments": { "user_1": "rule_set_1" },
        "project_location": "ProjectSite"
    }"#;

    #[test]
    fn decodes_the_persisted_shape() {
        let document = RulesDocument::from_json_slice(SAMPLE.as_bytes()).expect("valid document");
        assert_eq!(document.rule_sets.len(), 1);
        assert_eq!(
            document.user_assignments.get("user_1"),
            Some(&"rule_set_1".to_owned())
        );
        assert_eq!(
            document.environment.get("project_location"),
            Some(&json!("ProjectSite"))
        );
    }

    #[test]
    fn rejects_empty_documents() {
        let err = RulesDocument::from_json_slice(b"{}").expect_err("empty should fail");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));
    }

    #[test]
    fn rejects_dangling_assignments() {
        let document = RulesDocument::new()
            .with_rule_set("rule_set_1", "Policy", ["[EXPENSE] requires [AMOUNT]"])
            .with_assignment("user_1", "rule_set_9");
        let err = document.validate().expect_err("dangling assignment");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));
    }

    #[test]
    fn rejects_rule_sets_with_only_blank_rules() {
        let document = RulesDocument::new().with_rule_set("rule_set_1", "Blank", ["  "]);
        let err = document.validate().expect_err("blank rules");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));
    }

    #[test]
    fn round_trips_through_json() {
        let document = RulesDocument::from_json_slice(SAMPLE.as_bytes()).unwrap();
        let encoded = serde_json::to_vec(&document).unwrap();
        let decoded = RulesDocument::from_json_slice(&encoded).unwrap();
        assert_eq!(document, decoded);
    }
}
