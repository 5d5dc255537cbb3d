//! Audit log contract, query filters, and the in-memory backend.

use std::collections::{BTreeMap, HashSet};

use arbiter_oracle::DecisionOutcome;
use arbiter_primitives::{CallerId, CorrelationId};
use arbiter_tools::ExecutionRecord;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::entry::{AuditEntry, AuditRecord, Flag};
use crate::error::{AuditError, AuditResult};

/// Filter applied by [`AuditLog::query`].
///
/// An empty filter matches everything. Queries are finite and restartable:
/// each call re-reads the log from the beginning.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    caller: Option<CallerId>,
    feature: Option<String>,
    outcome: Option<DecisionOutcome>,
    flagged_only: bool,
    limit: Option<usize>,
}

impl AuditFilter {
    /// Creates a filter matching every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts results to one caller.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerId) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Restricts results to one feature tag.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Restricts results to one decision outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: DecisionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Restricts results to entries carrying an oversight flag.
    #[must_use]
    pub fn flagged_only(mut self) -> Self {
        self.flagged_only = true;
        self
    }

    /// Caps the number of results, keeping the newest entries.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(caller) = &self.caller {
            if entry.context().caller() != caller {
                return false;
            }
        }
        if let Some(feature) = &self.feature {
            if entry.context().key().feature() != feature {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if entry.decision().outcome() != outcome {
                return false;
            }
        }
        if self.flagged_only && entry.flag().is_none() {
            return false;
        }
        true
    }
}

/// Contract implemented by audit log backends.
///
/// `append` must complete before the primary request returns to its caller;
/// the attach operations record late-arriving facts without mutating the
/// original entry.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends a decision-stage entry, returning its correlation id.
    async fn append(&self, entry: AuditEntry) -> AuditResult<CorrelationId>;

    /// Appends an execution result referencing an earlier entry.
    async fn attach_execution(
        &self,
        correlation_id: CorrelationId,
        execution: ExecutionRecord,
    ) -> AuditResult<()>;

    /// Appends an oversight flag referencing an earlier entry.
    async fn attach_flag(&self, correlation_id: CorrelationId, flag: Flag) -> AuditResult<()>;

    /// Returns entries matching the filter, oldest first, with follow-up
    /// records joined in.
    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>>;

    /// Returns the total number of appended records.
    ///
    /// The count only ever grows; backends never delete.
    async fn count(&self) -> AuditResult<usize>;
}

/// Joins a record stream into complete entries, oldest first.
///
/// Follow-up records for unknown correlation ids are skipped: a reader must
/// tolerate a trail whose head was archived away.
pub(crate) fn join_records(records: impl IntoIterator<Item = AuditRecord>) -> Vec<AuditEntry> {
    let mut order: Vec<CorrelationId> = Vec::new();
    let mut entries: BTreeMap<String, AuditEntry> = BTreeMap::new();

    for record in records {
        match record {
            AuditRecord::Entry(entry) => {
                let id = entry.correlation_id();
                if entries.insert(id.to_string(), entry).is_none() {
                    order.push(id);
                }
            }
            AuditRecord::Execution {
                correlation_id,
                execution_result,
            } => {
                let key = correlation_id.to_string();
                if let Some(entry) = entries.remove(&key) {
                    entries.insert(key, entry.with_execution(execution_result));
                }
            }
            AuditRecord::Flag {
                correlation_id,
                flag,
            } => {
                let key = correlation_id.to_string();
                if let Some(entry) = entries.remove(&key) {
                    entries.insert(key, entry.with_flag(flag));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| entries.remove(&id.to_string()))
        .collect()
}

pub(crate) fn apply_filter(entries: Vec<AuditEntry>, filter: &AuditFilter) -> Vec<AuditEntry> {
    let mut matched: Vec<AuditEntry> = entries
        .into_iter()
        .filter(|entry| filter.matches(entry))
        .collect();

    if let Some(limit) = filter.limit {
        if matched.len() > limit {
            matched.drain(..matched.len() - limit);
        }
    }
    matched
}

struct StoredRecord {
    record: AuditRecord,
    hash: String,
}

/// In-memory audit log.
///
/// Suitable for tests and single-process deployments; the record vector is
/// append-only under a `tokio` read-write lock.
#[derive(Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<StoredRecord>>,
    seen: RwLock<HashSet<CorrelationId>>,
}

impl MemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content hash recorded for every appended record, in
    /// append order.
    pub async fn record_hashes(&self) -> Vec<String> {
        let guard = self.records.read().await;
        guard.iter().map(|stored| stored.hash.clone()).collect()
    }

    async fn push(&self, record: AuditRecord) -> AuditResult<()> {
        let bytes = serde_json::to_vec(&record)?;
        let hash = blake3::hash(&bytes).to_hex().to_string();
        let mut guard = self.records.write().await;
        guard.push(StoredRecord { record, hash });
        Ok(())
    }

    async fn require_seen(&self, correlation_id: CorrelationId) -> AuditResult<()> {
        let guard = self.seen.read().await;
        if guard.contains(&correlation_id) {
            Ok(())
        } else {
            Err(AuditError::UnknownCorrelation { correlation_id })
        }
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> AuditResult<CorrelationId> {
        let correlation_id = entry.correlation_id();
        self.push(AuditRecord::Entry(entry)).await?;
        self.seen.write().await.insert(correlation_id);
        debug!(%correlation_id, "audit entry appended");
        Ok(correlation_id)
    }

    async fn attach_execution(
        &self,
        correlation_id: CorrelationId,
        execution: ExecutionRecord,
    ) -> AuditResult<()> {
        self.require_seen(correlation_id).await?;
        self.push(AuditRecord::Execution {
            correlation_id,
            execution_result: execution,
        })
        .await
    }

    async fn attach_flag(&self, correlation_id: CorrelationId, flag: Flag) -> AuditResult<()> {
        self.require_seen(correlation_id).await?;
        self.push(AuditRecord::Flag {
            correlation_id,
            flag,
        })
        .await
    }

    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let records: Vec<AuditRecord> = {
            let guard = self.records.read().await;
            guard.iter().map(|stored| stored.record.clone()).collect()
        };
        Ok(apply_filter(join_records(records), filter))
    }

    async fn count(&self) -> AuditResult<usize> {
        Ok(self.records.read().await.len())
    }
}
