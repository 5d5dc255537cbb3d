//! Feature/action keys shared by the rule, context, and tool subsystems.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_SEGMENT_LEN: usize = 64;

/// Normalized `(feature, action)` pair.
///
/// Features and actions appear in rule text as bracketed tags such as
/// `[ATTENDANCE]` or `[CHECK-IN]`; the key stores both segments in tag form
/// (uppercase) so lookups are insensitive to the casing used by callers.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FeatureActionKey {
    feature: String,
    action: String,
}

impl FeatureActionKey {
    /// Creates a key from the supplied feature and action names.
    ///
    /// Both segments are uppercased; spaces are folded to underscores so
    /// presentation-layer labels map onto tag identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if either segment is empty, too long, or
    /// contains characters that cannot appear in a tag.
    pub fn new(feature: impl AsRef<str>, action: impl AsRef<str>) -> Result<Self> {
        let feature = normalize_segment("feature", feature.as_ref())?;
        let action = normalize_segment("action", action.as_ref())?;
        Ok(Self { feature, action })
    }

    /// Returns the feature segment in tag form.
    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Returns the action segment in tag form.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Display for FeatureActionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.feature, self.action)
    }
}

fn normalize_segment(role: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidKey {
            reason: format!("{role} cannot be empty"),
        });
    }
    if trimmed.len() > MAX_SEGMENT_LEN {
        return Err(Error::InvalidKey {
            reason: format!("{role} length must be <= {MAX_SEGMENT_LEN}"),
        });
    }

    let normalized: String = trimmed
        .chars()
        .map(|c| if c == ' ' { '_' } else { c.to_ascii_uppercase() })
        .collect();

    if !normalized
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
    {
        return Err(Error::InvalidKey {
            reason: format!(
                "{role} `{trimmed}` must contain alphanumeric, dash, or underscore characters"
            ),
        });
    }

    Ok(normalized)
}
