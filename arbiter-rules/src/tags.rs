//! Bracketed-tag extraction and parameter type inference.
//!
//! A tag is a placeholder of the form `[IDENTIFIER]` inside rule text. The
//! same syntax covers feature, action, and parameter roles; which role a tag
//! plays is determined by the request being evaluated, not by the tag itself.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TAG_PATTERN: &str = r"\[([A-Z][A-Z0-9_-]*)\]";

/// Value type inferred for a tagged parameter from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Time of day, `HH:MM` or `HH:MM:SS`.
    Time,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Numeric quantity.
    Number,
    /// One of a small set of labels (locations, categories, types).
    Enum,
    /// Free-form text.
    Text,
}

impl ParamType {
    /// Returns `true` when the supplied JSON value is acceptable for the type.
    ///
    /// Unknown shapes are rejected conservatively; enum labels and free text
    /// must be strings, numbers may arrive as JSON numbers or numeric strings.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Time => value
                .as_str()
                .is_some_and(|s| parse_time(s).is_some()),
            Self::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            Self::Number => {
                value.is_number() || value.as_str().is_some_and(|s| s.parse::<f64>().is_ok())
            }
            Self::Enum => value.is_string(),
            Self::Text => value.is_string() || value.is_number() || value.is_boolean(),
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Time => "time",
            Self::Date => "date",
            Self::Number => "number",
            Self::Enum => "enum",
            Self::Text => "text",
        })
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// A placeholder extracted from rule text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag {
    name: String,
}

impl Tag {
    /// Creates a tag from an already-normalized identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the tag identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Infers the parameter type this tag would carry if used as a parameter.
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        infer_param_type(&self.name)
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.name)
    }
}

/// Infers a value type from a tag identifier.
///
/// The mapping follows the conventions of the stock rule sets: `TIME`-like
/// tags are clock times, `DATE`-like tags calendar dates, quantity tags
/// numbers, and the small label vocabularies enums. Everything else is free
/// text.
#[must_use]
pub fn infer_param_type(name: &str) -> ParamType {
    match name {
        "TIME" => ParamType::Time,
        "DATE" => ParamType::Date,
        "AMOUNT" | "QUANTITY" | "DAYS" => ParamType::Number,
        "LOCATION" | "CATEGORY" | "TYPE" | "STATUS" => ParamType::Enum,
        _ if name.ends_with("_TIME") => ParamType::Time,
        _ if name.ends_with("_DATE") => ParamType::Date,
        _ if name.ends_with("_COUNT") => ParamType::Number,
        _ => ParamType::Text,
    }
}

/// Extracts `[TAG]` placeholders from rule text.
#[derive(Debug, Clone)]
pub struct TagParser {
    pattern: Regex,
}

impl TagParser {
    /// Creates a parser with the standard tag grammar.
    ///
    /// # Panics
    ///
    /// Panics if the built-in tag pattern fails to compile, which would be a
    /// programming error rather than a runtime condition.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(TAG_PATTERN).expect("tag pattern is valid"),
        }
    }

    /// Returns the set of tags present in the supplied rule text.
    #[must_use]
    pub fn parse(&self, rule_text: &str) -> BTreeSet<Tag> {
        self.pattern
            .captures_iter(rule_text)
            .map(|cap| Tag::new(&cap[1]))
            .collect()
    }
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_tags_from_rule_text() {
        let parser = TagParser::new();
        let tags =
            parser.parse("[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00");

        let names: Vec<&str> = tags.iter().map(Tag::name).collect();
        assert_eq!(names, ["ATTENDANCE", "CHECK-IN", "LOCATION", "TIME"]);
    }

    #[test]
    fn ignores_lowercase_and_unbalanced_brackets() {
        let parser = TagParser::new();
        assert!(parser.parse("no tags here, [lowercase] ignored").is_empty());
        assert!(parser.parse("broken [TAG without close").is_empty());
    }

    #[test]
    fn duplicate_tags_collapse() {
        let parser = TagParser::new();
        let tags = parser.parse("[TIME] before [TIME] after");
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn infers_types_from_names() {
        assert_eq!(infer_param_type("TIME"), ParamType::Time);
        assert_eq!(infer_param_type("START_DATE"), ParamType::Date);
        assert_eq!(infer_param_type("AMOUNT"), ParamType::Number);
        assert_eq!(infer_param_type("LOCATION"), ParamType::Enum);
        assert_eq!(infer_param_type("VENDOR"), ParamType::Text);
        assert_eq!(infer_param_type("RETRY_COUNT"), ParamType::Number);
    }

    #[test]
    fn type_checks_values() {
        assert!(ParamType::Time.accepts(&json!("07:30")));
        assert!(!ParamType::Time.accepts(&json!("7 o'clock")));
        assert!(ParamType::Date.accepts(&json!("2025-01-31")));
        assert!(ParamType::Number.accepts(&json!(12.5)));
        assert!(ParamType::Number.accepts(&json!("42")));
        assert!(!ParamType::Number.accepts(&json!("lots")));
        assert!(ParamType::Enum.accepts(&json!("Office")));
        assert!(!ParamType::Enum.accepts(&json!(3)));
        assert!(ParamType::Text.accepts(&json!("anything")));
    }
}
