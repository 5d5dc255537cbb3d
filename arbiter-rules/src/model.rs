//! In-memory rule model with pre-extracted tags.

use std::collections::{BTreeMap, BTreeSet};

use arbiter_primitives::RuleSetId;

use crate::error::{RuleError, RuleResult};
use crate::tags::{ParamType, Tag, TagParser};

/// A single natural-language rule.
///
/// The text is opaque to the engine; only its tags are read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    text: String,
    tags: BTreeSet<Tag>,
}

impl Rule {
    /// Creates a rule from the supplied text, extracting its tags.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidDocument`] when the text is blank.
    pub fn new(parser: &TagParser, text: impl Into<String>) -> RuleResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RuleError::invalid_document("rule text cannot be blank"));
        }
        let tags = parser.parse(&text);
        Ok(Self { text, tags })
    }

    /// Returns the raw rule text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the tags extracted from the rule text.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// Returns `true` when the rule mentions the supplied tag identifier.
    #[must_use]
    pub fn mentions(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name() == name)
    }
}

/// An ordered collection of rules assigned to callers as a unit.
///
/// Immutable once constructed; the repository swaps whole rule sets rather
/// than editing them in place so in-flight evaluations keep a consistent
/// view.
#[derive(Clone, Debug)]
pub struct RuleSet {
    id: RuleSetId,
    name: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a rule set from raw rule texts.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidDocument`] when no rules are supplied or
    /// any rule text is blank.
    pub fn new<I, S>(id: RuleSetId, name: impl Into<String>, rule_texts: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parser = TagParser::new();
        let rules = rule_texts
            .into_iter()
            .map(|text| Rule::new(&parser, text))
            .collect::<RuleResult<Vec<_>>>()?;

        if rules.is_empty() {
            return Err(RuleError::invalid_document(format!(
                "rule set `{id}` must contain at least one rule"
            )));
        }

        Ok(Self {
            id,
            name: name.into(),
            rules,
        })
    }

    /// Returns the rule-set identifier.
    #[must_use]
    pub fn id(&self) -> &RuleSetId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the rules in authoring order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the full rule texts in authoring order.
    #[must_use]
    pub fn rule_texts(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.text().to_owned()).collect()
    }

    /// Returns every distinct tag mentioned across the rule set.
    #[must_use]
    pub fn tag_names(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(|rule| rule.tags().iter().map(|tag| tag.name().to_owned()))
            .collect()
    }

    /// Returns `true` when any rule mentions the supplied tag identifier.
    #[must_use]
    pub fn mentions(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| rule.mentions(name))
    }

    /// Returns the rules that mention the supplied feature tag.
    #[must_use]
    pub fn applicable_rules(&self, feature: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.mentions(feature))
            .collect()
    }

    /// Infers the parameter schema from tag usage across all rules.
    ///
    /// Feature and action tags appear here too; the context builder excludes
    /// the pair being evaluated when checking required parameters.
    #[must_use]
    pub fn parameter_schema(&self) -> BTreeMap<String, ParamType> {
        self.rules
            .iter()
            .flat_map(|rule| rule.tags().iter())
            .map(|tag| (tag.name().to_owned(), tag.param_type()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RuleSet {
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

    #[test]
    fn rejects_empty_rule_sets() {
        let err = RuleSet::new(
            RuleSetId::new("rs").unwrap(),
            "Empty",
            Vec::<String>::new(),
        )
        .expect_err("empty set should fail");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));
    }

    #[test]
    fn rejects_blank_rules() {
        let err = RuleSet::new(RuleSetId::new("rs").unwrap(), "Blank", ["   "])
            .expect_err("blank rule should fail");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));
    }

    #[test]
    fn finds_applicable_rules_by_feature() {
        let set = sample();
        let attendance = set.applicable_rules("ATTENDANCE");
        assert_eq!(attendance.len(), 1);
        assert!(attendance[0].mentions("TIME"));
        assert!(set.applicable_rules("LEAVE").is_empty());
    }

    #[test]
    fn schema_covers_all_tags() {
        let schema = sample().parameter_schema();
        assert_eq!(schema.get("TIME"), Some(&ParamType::Time));
        assert_eq!(schema.get("AMOUNT"), Some(&ParamType::Number));
        assert_eq!(schema.get("LOCATION"), Some(&ParamType::Enum));
        assert!(schema.contains_key("ATTENDANCE"));
    }

    #[test]
    fn mentions_checks_across_rules() {
        let set = sample();
        assert!(set.mentions("CHECK-IN"));
        assert!(set.mentions("SUBMIT"));
        assert!(!set.mentions("CHECK-OUT"));
    }
}
