//! Immutable evaluation-context snapshot.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use arbiter_primitives::{CallerId, FeatureActionKey, RuleSetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextResult;

/// Stable identifier derived from the canonical bytes of a context.
///
/// Identical `(caller, feature, action, parameters, rules, environment)`
/// inputs always produce the same fingerprint, which keys the decision
/// engine's de-duplication window.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFingerprint(String);

impl ContextFingerprint {
    /// Returns the fingerprint as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContextFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot consumed by the reasoning oracle.
///
/// Built fresh per request by [`ContextBuilder`](crate::ContextBuilder) and
/// never mutated afterwards. Parameter and environment maps are ordered so
/// serialization is deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    caller: CallerId,
    key: FeatureActionKey,
    rule_set_id: RuleSetId,
    parameters: BTreeMap<String, Value>,
    rules: Vec<String>,
    environment: BTreeMap<String, Value>,
}

/// Rule-set identifier recorded when no rule set could be resolved.
const UNRESOLVED_RULE_SET: &str = "unresolved";

impl EvaluationContext {
    pub(crate) fn new(
        caller: CallerId,
        key: FeatureActionKey,
        rule_set_id: RuleSetId,
        parameters: BTreeMap<String, Value>,
        rules: Vec<String>,
        environment: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            caller,
            key,
            rule_set_id,
            parameters,
            rules,
            environment,
        }
    }

    /// Creates the degraded snapshot recorded for requests that fail before
    /// a rule set is available (unassigned caller, validation rejection).
    ///
    /// The rule list is empty and the rule-set id reads `unresolved`; the
    /// audit trail still captures who asked for what.
    #[must_use]
    pub fn unresolved(
        caller: CallerId,
        key: FeatureActionKey,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            caller,
            key,
            rule_set_id: RuleSetId::new(UNRESOLVED_RULE_SET).expect("static id is valid"),
            parameters,
            rules: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the normalized feature/action key.
    #[must_use]
    pub fn key(&self) -> &FeatureActionKey {
        &self.key
    }

    /// Returns the identifier of the rule set this context was built against.
    #[must_use]
    pub fn rule_set_id(&self) -> &RuleSetId {
        &self.rule_set_id
    }

    /// Returns the canonicalized parameter map (tag-form keys).
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Returns the full text of every rule in the caller's rule set.
    #[must_use]
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Returns the fixed environmental facts carried by this context.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, Value> {
        &self.environment
    }

    /// Serializes the context to its canonical byte form.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Serialization`](crate::ContextError) when
    /// encoding fails.
    pub fn canonical_bytes(&self) -> ContextResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Computes the stable fingerprint of this context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Serialization`](crate::ContextError) when
    /// canonical encoding fails.
    pub fn fingerprint(&self) -> ContextResult<ContextFingerprint> {
        let bytes = self.canonical_bytes()?;
        Ok(ContextFingerprint(
            blake3::hash(&bytes).to_hex().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EvaluationContext {
        EvaluationContext::new(
            CallerId::new("user_1").unwrap(),
            FeatureActionKey::new("ATTENDANCE", "CHECK-IN").unwrap(),
            RuleSetId::new("rule_set_1").unwrap(),
            BTreeMap::from([
                ("TIME".to_owned(), json!("08:15")),
                ("LOCATION".to_owned(), json!("ProjectSite")),
            ]),
            vec!["[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00".into()],
            BTreeMap::from([("project_location".to_owned(), json!("ProjectSite"))]),
        )
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let a = sample().canonical_bytes().unwrap();
        let b = sample().canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_parameters() {
        let base = sample().fingerprint().unwrap();

        let mut other = sample();
        other
            .parameters
            .insert("TIME".to_owned(), json!("07:30"));
        assert_ne!(base, other.fingerprint().unwrap());
    }

    #[test]
    fn round_trips_through_serde() {
        let context = sample();
        let bytes = context.canonical_bytes().unwrap();
        let decoded: EvaluationContext = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(context, decoded);
        assert_eq!(
            context.fingerprint().unwrap(),
            decoded.fingerprint().unwrap()
        );
    }
}
