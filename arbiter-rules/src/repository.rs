//! Caller-to-rule-set resolution against immutable snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use arbiter_primitives::{CallerId, RuleSetId};
use serde_json::Value;
use tracing::debug;

use crate::document::RulesDocument;
use crate::error::{RuleError, RuleResult};
use crate::model::RuleSet;

#[derive(Debug, Default)]
struct RuleIndex {
    rule_sets: BTreeMap<RuleSetId, Arc<RuleSet>>,
    assignments: BTreeMap<CallerId, RuleSetId>,
    environment: BTreeMap<String, Value>,
}

impl RuleIndex {
    fn from_document(document: &RulesDocument) -> RuleResult<Self> {
        document.validate()?;

        let mut rule_sets = BTreeMap::new();
        for (id, spec) in &document.rule_sets {
            let id = RuleSetId::new(id.clone())?;
            let rules: Vec<&String> = spec
                .rules
                .iter()
                .filter(|rule| !rule.trim().is_empty())
                .collect();
            let set = RuleSet::new(id.clone(), spec.name.clone(), rules.into_iter().cloned())?;
            rule_sets.insert(id, Arc::new(set));
        }

        let mut assignments = BTreeMap::new();
        for (caller, rule_set) in &document.user_assignments {
            let caller = CallerId::new(caller.clone())?;
            let rule_set = RuleSetId::new(rule_set.clone())?;
            assignments.insert(caller, rule_set);
        }

        Ok(Self {
            rule_sets,
            assignments,
            environment: document.environment.clone(),
        })
    }
}

/// A consistent, immutable view of the rule index.
///
/// Requests take one snapshot at context-build time and keep it for their
/// lifetime; repository swaps never disturb an in-flight evaluation.
#[derive(Clone, Debug)]
pub struct RulesSnapshot {
    inner: Arc<RuleIndex>,
}

impl RulesSnapshot {
    /// Resolves the rule set assigned to the supplied caller.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::NotFound`] when the caller has no assignment and
    /// [`RuleError::UnknownRuleSet`] when the assignment points at a rule set
    /// missing from this snapshot.
    pub fn resolve(&self, caller: &CallerId) -> RuleResult<Arc<RuleSet>> {
        let rule_set_id = self
            .inner
            .assignments
            .get(caller)
            .ok_or_else(|| RuleError::NotFound {
                caller: caller.clone(),
            })?;

        self.inner
            .rule_sets
            .get(rule_set_id)
            .cloned()
            .ok_or_else(|| RuleError::UnknownRuleSet {
                id: rule_set_id.clone(),
            })
    }

    /// Returns the rule set with the supplied identifier, if present.
    #[must_use]
    pub fn rule_set(&self, id: &RuleSetId) -> Option<Arc<RuleSet>> {
        self.inner.rule_sets.get(id).cloned()
    }

    /// Returns the identifiers of every rule set in this snapshot.
    #[must_use]
    pub fn rule_set_ids(&self) -> Vec<RuleSetId> {
        self.inner.rule_sets.keys().cloned().collect()
    }

    /// Returns the environmental facts carried by this snapshot.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, Value> {
        &self.inner.environment
    }
}

/// Repository mapping callers to rule sets.
///
/// Reads go through [`RulesSnapshot`]s obtained from [`snapshot`]
/// (versioned-pointer style); every mutation builds a fresh index and swaps
/// it in atomically.
///
/// [`snapshot`]: RuleRepository::snapshot
#[derive(Debug)]
pub struct RuleRepository {
    index: RwLock<Arc<RuleIndex>>,
}

impl RuleRepository {
    /// Builds a repository from a validated rules document.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the document is empty or inconsistent; the
    /// system must refuse to serve rather than start without rules.
    pub fn from_document(document: &RulesDocument) -> RuleResult<Self> {
        let index = RuleIndex::from_document(document)?;
        Ok(Self {
            index: RwLock::new(Arc::new(index)),
        })
    }

    /// Returns the current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    #[must_use]
    pub fn snapshot(&self) -> RulesSnapshot {
        let guard = self.index.read().expect("rule index poisoned");
        RulesSnapshot {
            inner: Arc::clone(&guard),
        }
    }

    /// Replaces the whole index from a new document (hot reload).
    ///
    /// In-flight evaluations keep the snapshot they already hold.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the replacement document fails validation;
    /// the previous index stays in place.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    pub fn replace(&self, document: &RulesDocument) -> RuleResult<()> {
        let index = RuleIndex::from_document(document)?;
        let mut guard = self.index.write().expect("rule index poisoned");
        *guard = Arc::new(index);
        debug!(
            rule_sets = guard.rule_sets.len(),
            assignments = guard.assignments.len(),
            "rule index replaced"
        );
        Ok(())
    }

    /// Adds or replaces a single rule set, producing a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the rules fail validation.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    pub fn upsert_rule_set<I, S>(
        &self,
        id: RuleSetId,
        name: impl Into<String>,
        rules: I,
    ) -> RuleResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Arc::new(RuleSet::new(id.clone(), name, rules)?);
        let mut guard = self.index.write().expect("rule index poisoned");
        let mut next = clone_index(&guard);
        next.rule_sets.insert(id, set);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Removes a rule set along with every assignment referencing it.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownRuleSet`] when the identifier is absent.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    pub fn remove_rule_set(&self, id: &RuleSetId) -> RuleResult<()> {
        let mut guard = self.index.write().expect("rule index poisoned");
        if !guard.rule_sets.contains_key(id) {
            return Err(RuleError::UnknownRuleSet { id: id.clone() });
        }

        let mut next = clone_index(&guard);
        next.rule_sets.remove(id);
        next.assignments.retain(|_, assigned| assigned != id);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Assigns a caller to an existing rule set.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownRuleSet`] when the rule set is absent.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    pub fn assign(&self, caller: CallerId, rule_set: RuleSetId) -> RuleResult<()> {
        let mut guard = self.index.write().expect("rule index poisoned");
        if !guard.rule_sets.contains_key(&rule_set) {
            return Err(RuleError::UnknownRuleSet { id: rule_set });
        }

        let mut next = clone_index(&guard);
        next.assignments.insert(caller, rule_set);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Removes a caller's assignment, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal index lock has been poisoned.
    pub fn unassign(&self, caller: &CallerId) {
        let mut guard = self.index.write().expect("rule index poisoned");
        if guard.assignments.contains_key(caller) {
            let mut next = clone_index(&guard);
            next.assignments.remove(caller);
            *guard = Arc::new(next);
        }
    }
}

fn clone_index(index: &Arc<RuleIndex>) -> RuleIndex {
    RuleIndex {
        rule_sets: index.rule_sets.clone(),
        assignments: index.assignments.clone(),
        environment: index.environment.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> RulesDocument {
        RulesDocument::new()
            .with_rule_set(
                "rule_set_1",
                "Standard Attendance Policy",
                ["[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00"],
            )
            .with_assignment("user_1", "rule_set_1")
            .with_environment("project_location", json!("ProjectSite"))
    }

    fn caller(id: &str) -> CallerId {
        CallerId::new(id).unwrap()
    }

    #[test]
    fn resolves_assigned_callers() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        let snapshot = repository.snapshot();

        let rules = snapshot.resolve(&caller("user_1")).expect("resolved");
        assert_eq!(rules.id().as_str(), "rule_set_1");
        assert_eq!(
            snapshot.environment().get("project_location"),
            Some(&json!("ProjectSite"))
        );
    }

    #[test]
    fn unassigned_callers_are_not_found() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        let err = repository
            .snapshot()
            .resolve(&caller("user_9"))
            .expect_err("unassigned");
        assert!(matches!(err, RuleError::NotFound { .. }));
    }

    #[test]
    fn snapshots_survive_replacement() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        let before = repository.snapshot();

        let replacement = RulesDocument::new()
            .with_rule_set("rule_set_2", "Night Shift", ["[ATTENDANCE] can be [CHECK-IN] after [TIME] 20:00"])
            .with_assignment("user_1", "rule_set_2");
        repository.replace(&replacement).unwrap();

        // The pre-swap snapshot still resolves against the old index.
        let old = before.resolve(&caller("user_1")).unwrap();
        assert_eq!(old.id().as_str(), "rule_set_1");

        let new = repository.snapshot().resolve(&caller("user_1")).unwrap();
        assert_eq!(new.id().as_str(), "rule_set_2");
    }

    #[test]
    fn replace_keeps_old_index_on_invalid_document() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        let err = repository
            .replace(&RulesDocument::new())
            .expect_err("empty replacement");
        assert!(matches!(err, RuleError::InvalidDocument { .. }));

        repository
            .snapshot()
            .resolve(&caller("user_1"))
            .expect("old index still serves");
    }

    #[test]
    fn removing_a_rule_set_drops_its_assignments() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        repository
            .remove_rule_set(&RuleSetId::new("rule_set_1").unwrap())
            .unwrap();

        let err = repository
            .snapshot()
            .resolve(&caller("user_1"))
            .expect_err("assignment dropped");
        assert!(matches!(err, RuleError::NotFound { .. }));
    }

    #[test]
    fn assignment_requires_existing_rule_set() {
        let repository = RuleRepository::from_document(&document()).unwrap();
        let err = repository
            .assign(caller("user_2"), RuleSetId::new("missing").unwrap())
            .expect_err("missing rule set");
        assert!(matches!(err, RuleError::UnknownRuleSet { .. }));

        repository
            .assign(caller("user_2"), RuleSetId::new("rule_set_1").unwrap())
            .unwrap();
        repository
            .snapshot()
            .resolve(&caller("user_2"))
            .expect("assigned");
    }
}
