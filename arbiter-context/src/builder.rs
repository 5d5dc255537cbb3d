//! Pure construction of evaluation contexts.

use std::collections::BTreeMap;

use arbiter_primitives::{CallerId, FeatureActionKey};
use arbiter_rules::{Rule, RuleSet};
use serde_json::Value;
use tracing::debug;

use crate::context::EvaluationContext;
use crate::error::{ContextError, ContextResult};

/// Builds canonical [`EvaluationContext`] values from decision requests.
///
/// Construction is side-effect-free: the builder holds no state, and
/// repeated calls with identical inputs yield byte-identical contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validates the request against the caller's rule set and assembles the
    /// context snapshot.
    ///
    /// Parameter names are canonicalized to tag form (uppercase, spaces
    /// folded to underscores). Parameters referenced by the applicable rules
    /// must be present and type-consistent with the schema inferred from tag
    /// usage; parameters no rule mentions are passed through untouched for
    /// forward compatibility.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] describing the first validation failure;
    /// no oracle is consulted for an invalid request.
    pub fn build(
        &self,
        caller: CallerId,
        rule_set: &RuleSet,
        environment: &BTreeMap<String, Value>,
        feature: &str,
        action: &str,
        parameters: BTreeMap<String, Value>,
    ) -> ContextResult<EvaluationContext> {
        let key = FeatureActionKey::new(feature, action)
            .map_err(|err| ContextError::invalid_request(err.to_string()))?;

        let applicable = pair_rules(rule_set, &key);
        if applicable.is_empty() {
            return Err(ContextError::UnknownFeatureAction {
                feature: key.feature().to_owned(),
                action: key.action().to_owned(),
            });
        }

        let parameters = canonicalize_parameters(parameters)?;

        for rule in &applicable {
            for tag in rule.tags() {
                if tag.name() == key.feature() || tag.name() == key.action() {
                    continue;
                }

                let Some(value) = parameters.get(tag.name()) else {
                    return Err(ContextError::MissingParameter {
                        name: tag.name().to_owned(),
                    });
                };

                let expected = tag.param_type();
                if !expected.accepts(value) {
                    return Err(ContextError::ParameterType {
                        name: tag.name().to_owned(),
                        expected,
                    });
                }
            }
        }

        debug!(
            caller = %caller,
            key = %key,
            rule_set = %rule_set.id(),
            applicable = applicable.len(),
            "evaluation context built"
        );

        Ok(EvaluationContext::new(
            caller,
            key,
            rule_set.id().clone(),
            parameters,
            rule_set.rule_texts(),
            environment.clone(),
        ))
    }
}

/// Rules that mention both the feature and the action tag.
fn pair_rules<'a>(rule_set: &'a RuleSet, key: &FeatureActionKey) -> Vec<&'a Rule> {
    rule_set
        .rules()
        .iter()
        .filter(|rule| rule.mentions(key.feature()) && rule.mentions(key.action()))
        .collect()
}

fn canonicalize_parameters(
    parameters: BTreeMap<String, Value>,
) -> ContextResult<BTreeMap<String, Value>> {
    let mut canonical = BTreeMap::new();
    for (name, value) in parameters {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ContextError::invalid_request(
                "parameter names cannot be empty",
            ));
        }

        let tag_form: String = trimmed
            .chars()
            .map(|c| if c == ' ' { '_' } else { c.to_ascii_uppercase() })
            .collect();

        if !tag_form
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
        {
            return Err(ContextError::invalid_request(format!(
                "parameter name `{trimmed}` cannot be expressed as a tag"
            )));
        }

        if canonical.insert(tag_form.clone(), value).is_some() {
            return Err(ContextError::invalid_request(format!(
                "duplicate parameter `{tag_form}` after canonicalization"
            )));
        }
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_primitives::RuleSetId;
    use serde_json::json;

    fn rule_set() -> RuleSet {
        RuleSet::new(
            RuleSetId::new("rule_set_1").unwrap(),
            "Standard Attendance Policy",
            [
                "[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00",
                "[EXPENSE] can only be [SUBMIT] if [AMOUNT] is less than 1000",
            ],
        )
        .unwrap()
    }

    fn caller() -> CallerId {
        CallerId::new("user_1").unwrap()
    }

    fn params(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn builds_deterministic_contexts() {
        let builder = ContextBuilder::new();
        let environment = BTreeMap::from([("project_location".to_owned(), json!("ProjectSite"))]);

        let build = || {
            builder
                .build(
                    caller(),
                    &rule_set(),
                    &environment,
                    "attendance",
                    "check-in",
                    params(&[("time", json!("08:15")), ("location", json!("ProjectSite"))]),
                )
                .unwrap()
        };

        let a = build().canonical_bytes().unwrap();
        let b = build().canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonicalizes_parameter_names() {
        let builder = ContextBuilder::new();
        let context = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                params(&[("time", json!("08:15")), ("LOCATION", json!("Office"))]),
            )
            .unwrap();

        assert!(context.parameters().contains_key("TIME"));
        assert!(context.parameters().contains_key("LOCATION"));
        assert!(!context.parameters().contains_key("time"));
    }

    #[test]
    fn rejects_unknown_feature_action_pairs() {
        let builder = ContextBuilder::new();
        let err = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-OUT",
                BTreeMap::new(),
            )
            .expect_err("no rule covers the pair");
        assert!(matches!(err, ContextError::UnknownFeatureAction { .. }));
    }

    #[test]
    fn rejects_missing_parameters() {
        let builder = ContextBuilder::new();
        let err = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                params(&[("time", json!("08:15"))]),
            )
            .expect_err("location missing");
        assert!(matches!(err, ContextError::MissingParameter { name } if name == "LOCATION"));
    }

    #[test]
    fn rejects_type_inconsistent_parameters() {
        let builder = ContextBuilder::new();
        let err = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                params(&[
                    ("time", json!("way too late")),
                    ("location", json!("Office")),
                ]),
            )
            .expect_err("time is not a clock value");
        assert!(matches!(err, ContextError::ParameterType { name, .. } if name == "TIME"));
    }

    #[test]
    fn passes_unknown_parameters_through() {
        let builder = ContextBuilder::new();
        let context = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                params(&[
                    ("time", json!("08:15")),
                    ("location", json!("Office")),
                    ("badge_reader", json!("north-gate")),
                ]),
            )
            .unwrap();

        assert_eq!(
            context.parameters().get("BADGE_READER"),
            Some(&json!("north-gate"))
        );
    }

    #[test]
    fn rejects_duplicate_parameters_after_canonicalization() {
        let builder = ContextBuilder::new();
        let err = builder
            .build(
                caller(),
                &rule_set(),
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                params(&[
                    ("time", json!("08:15")),
                    ("TIME", json!("09:00")),
                    ("location", json!("Office")),
                ]),
            )
            .expect_err("duplicate after uppercasing");
        assert!(matches!(err, ContextError::InvalidRequest { .. }));
    }
}
