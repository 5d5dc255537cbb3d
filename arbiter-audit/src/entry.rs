//! Audit entries, oversight flags, and the persisted record shape.

use arbiter_context::EvaluationContext;
use arbiter_oracle::{Decision, ReviewOutcome, ReviewVerdict};
use arbiter_primitives::CorrelationId;
use arbiter_tools::ExecutionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Oversight verdict attached to an audit entry after the fact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    verdict: ReviewOutcome,
    rationale: String,
    confidence_score: f32,
    reviewed: CorrelationId,
}

impl Flag {
    /// Creates a flag from a review verdict and the entry it reviews.
    #[must_use]
    pub fn from_verdict(reviewed: CorrelationId, verdict: &ReviewVerdict) -> Self {
        Self {
            verdict: verdict.verdict(),
            rationale: verdict.rationale().to_owned(),
            confidence_score: verdict.confidence_score(),
            reviewed,
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

    /// Returns the reviewer's confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence_score(&self) -> f32 {
        self.confidence_score
    }

    /// Returns the correlation id of the entry this flag reviews.
    #[must_use]
    pub const fn reviewed(&self) -> CorrelationId {
        self.reviewed
    }
}

/// One audit entry: context, decision, and (once joined) execution and flag.
///
/// Immutable after creation. The optional execution and flag slots are
/// populated only by query-time joins over follow-up records; backends never
/// rewrite a stored entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    correlation_id: CorrelationId,
    timestamp: DateTime<Utc>,
    context_snapshot: EvaluationContext,
    decision: Decision,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execution_result: Option<ExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flag: Option<Flag>,
}

impl AuditEntry {
    /// Creates a builder for a new entry.
    #[must_use]
    pub fn builder(context_snapshot: EvaluationContext, decision: Decision) -> AuditEntryBuilder {
        AuditEntryBuilder {
            correlation_id: CorrelationId::random(),
            timestamp: Utc::now(),
            context_snapshot,
            decision,
            metadata: Map::new(),
        }
    }

    /// Returns the correlation id linking decision, execution, and flag.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the append timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the evaluation context the decision was made against.
    #[must_use]
    pub fn context(&self) -> &EvaluationContext {
        &self.context_snapshot
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Returns operational metadata (e.g. oracle attempt counts).
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns the joined execution result, if any.
    #[must_use]
    pub fn execution(&self) -> Option<&ExecutionRecord> {
        self.execution_result.as_ref()
    }

    /// Returns the joined oversight flag, if any.
    #[must_use]
    pub fn flag(&self) -> Option<&Flag> {
        self.flag.as_ref()
    }

    /// Returns a copy of this entry with the execution result joined in.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionRecord) -> Self {
        self.execution_result = Some(execution);
        self
    }

    /// Returns a copy of this entry with the oversight flag joined in.
    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Computes a stable content hash of the entry as stored.
    ///
    /// Backends record this at append time; comparing hashes over time
    /// demonstrates that no entry was mutated after append.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// Builder for [`AuditEntry`] values.
#[derive(Debug)]
pub struct AuditEntryBuilder {
    correlation_id: CorrelationId,
    timestamp: DateTime<Utc>,
    context_snapshot: EvaluationContext,
    decision: Decision,
    metadata: Map<String, Value>,
}

impl AuditEntryBuilder {
    /// Overrides the correlation id.
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finalises the builder and produces the entry.
    #[must_use]
    pub fn build(self) -> AuditEntry {
        AuditEntry {
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
            context_snapshot: self.context_snapshot,
            decision: self.decision,
            metadata: self.metadata,
            execution_result: None,
            flag: None,
        }
    }
}

/// Persisted record shape: an entry or a follow-up keyed by correlation id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    /// A decision-stage entry.
    Entry(AuditEntry),
    /// A late-arriving execution result for an earlier entry.
    Execution {
        /// Correlation id of the entry being extended.
        correlation_id: CorrelationId,
        /// The execution result.
        execution_result: ExecutionRecord,
    },
    /// A late-arriving oversight flag for an earlier entry.
    Flag {
        /// Correlation id of the entry being extended.
        correlation_id: CorrelationId,
        /// The oversight flag.
        flag: Flag,
    },
}

impl AuditRecord {
    /// Returns the correlation id the record belongs to.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Entry(entry) => entry.correlation_id(),
            Self::Execution { correlation_id, .. } | Self::Flag { correlation_id, .. } => {
                *correlation_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_context::ContextBuilder;
    use arbiter_primitives::{CallerId, RuleSetId};
    use arbiter_rules::RuleSet;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn context() -> EvaluationContext {
        let rule_set = RuleSet::new(
            RuleSetId::new("rule_set_1").unwrap(),
            "Policy",
            ["[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00"],
        )
        .unwrap();
        ContextBuilder::new()
            .build(
                CallerId::new("user_1").unwrap(),
                &rule_set,
                &BTreeMap::new(),
                "ATTENDANCE",
                "CHECK-IN",
                BTreeMap::from([
                    ("time".to_owned(), json!("08:15")),
                    ("location".to_owned(), json!("ProjectSite")),
                ]),
            )
            .unwrap()
    }

    #[test]
    fn builder_constructs_entries() {
        let entry = AuditEntry::builder(context(), Decision::allowed("within policy", 0.9))
            .metadata("oracle_attempts", json!(1))
            .build();

        assert!(entry.decision().is_allowed());
        assert_eq!(entry.metadata().get("oracle_attempts"), Some(&json!(1)));
        assert!(entry.execution().is_none());
        assert!(entry.flag().is_none());
    }

    #[test]
    fn content_hash_is_stable_for_identical_entries() {
        let correlation_id = CorrelationId::random();
        let timestamp = Utc::now();
        let make = || {
            AuditEntry::builder(context(), Decision::denied("too early", None, 0.8))
                .correlation_id(correlation_id)
                .timestamp(timestamp)
                .build()
        };

        assert_eq!(
            make().content_hash().unwrap(),
            make().content_hash().unwrap()
        );
    }

    #[test]
    fn record_round_trips_through_serde() {
        let entry = AuditEntry::builder(context(), Decision::allowed("ok", 1.0)).build();
        let flag = Flag::from_verdict(
            entry.correlation_id(),
            &ReviewVerdict::suspect("confidence looks unjustified", 0.7),
        );

        for record in [
            AuditRecord::Entry(entry.clone()),
            AuditRecord::Flag {
                correlation_id: entry.correlation_id(),
                flag,
            },
        ] {
            let encoded = serde_json::to_string(&record).unwrap();
            let decoded: AuditRecord = serde_json::from_str(&encoded).unwrap();
            assert_eq!(record, decoded);
        }
    }
}
