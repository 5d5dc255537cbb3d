//! Identifier types shared across the decision pipeline.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_CALLER_LEN: usize = 96;
const MAX_RULE_SET_LEN: usize = 64;

/// Identity of the party requesting a decision.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Creates a new caller identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCallerId`] if the supplied identifier is empty,
    /// too long, or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidCallerId {
                id,
                reason: "identifier cannot be empty".into(),
            });
        }
        if id.len() > MAX_CALLER_LEN {
            return Err(Error::InvalidCallerId {
                id,
                reason: format!("identifier length must be <= {MAX_CALLER_LEN}"),
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        {
            return Err(Error::InvalidCallerId {
                id,
                reason: "identifier must contain alphanumeric, dash, underscore, dot, or at-sign"
                    .into(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the caller identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CallerId> for String {
    fn from(value: CallerId) -> Self {
        value.0
    }
}

impl FromStr for CallerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identifier of a rule set within the rules document.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSetId(String);

impl RuleSetId {
    /// Creates a new rule-set identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRuleSetId`] if the supplied identifier is empty
    /// or too long.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidRuleSetId {
                id,
                reason: "identifier cannot be empty".into(),
            });
        }
        if id.len() > MAX_RULE_SET_LEN {
            return Err(Error::InvalidRuleSetId {
                id,
                reason: format!("identifier length must be <= {MAX_RULE_SET_LEN}"),
            });
        }
        Ok(Self(id))
    }

    /// Returns the rule-set identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RuleSetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RuleSetId> for String {
    fn from(value: RuleSetId) -> Self {
        value.0
    }
}

impl FromStr for RuleSetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Correlates a decision with its execution and any late oversight flag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a random correlation identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

impl FromStr for CorrelationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self::from_uuid(uuid))
    }
}
