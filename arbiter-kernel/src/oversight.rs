//! Decoupled oversight pass reviewing every decision after the fact.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arbiter_audit::{AuditLog, Flag};
use arbiter_context::EvaluationContext;
use arbiter_oracle::{Decision, OracleRequest, ReviewOracle, ReviewRequest};
use arbiter_primitives::CorrelationId;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::notify::{NotificationDispatcher, OversightNotice};

/// Tunables for the oversight pass.
#[derive(Debug, Clone, Copy)]
pub struct OversightConfig {
    queue_capacity: usize,
    workers: NonZeroUsize,
    review_timeout: Duration,
}

impl OversightConfig {
    /// Creates a configuration with the default knobs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bounded queue capacity between producers and reviewers.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets how many reviews may run concurrently.
    #[must_use]
    pub const fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the per-review oracle timeout.
    #[must_use]
    pub const fn with_review_timeout(mut self, review_timeout: Duration) -> Self {
        self.review_timeout = review_timeout;
        self
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn queue_capacity(self) -> usize {
        self.queue_capacity
    }

    /// Returns the worker count.
    #[must_use]
    pub const fn workers(self) -> NonZeroUsize {
        self.workers
    }

    /// Returns the per-review timeout.
    #[must_use]
    pub const fn review_timeout(self) -> Duration {
        self.review_timeout
    }
}

impl Default for OversightConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: NonZeroUsize::new(2).expect("non-zero"),
            review_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot of oversight throughput counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversightStats {
    /// Pairs handed to [`OversightPass::submit`].
    pub submitted: u64,
    /// Reviews that produced a flag.
    pub completed: u64,
    /// Pairs dropped because the queue was full.
    pub dropped: u64,
    /// Reviews skipped because the oracle failed, timed out, or the flag
    /// could not be recorded.
    pub degraded: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    degraded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> OversightStats {
        OversightStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            degraded: self.degraded.load(Ordering::SeqCst),
        }
    }
}

struct ReviewTask {
    context: EvaluationContext,
    decision: Decision,
    correlation_id: CorrelationId,
}

/// Fire-and-forget review pass over `(context, decision)` pairs.
///
/// Producers enqueue through a bounded channel and never wait: under
/// sustained overload the incoming (newest) pair is dropped and counted
/// rather than queued unboundedly. Review workers run on their own tasks,
/// bounded by a semaphore, and attach their verdicts to the audit trail.
pub struct OversightPass {
    tx: mpsc::Sender<ReviewTask>,
    counters: Arc<Counters>,
    dispatcher: JoinHandle<()>,
}

impl OversightPass {
    /// Spawns the review dispatcher and returns the pass handle.
    #[must_use]
    pub fn spawn(
        oracle: Arc<dyn ReviewOracle>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: OversightConfig,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<ReviewTask>(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let workers = config.workers.get();
        let review_timeout = config.review_timeout;

        let dispatcher = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(workers));

            while let Some(task) = rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };

                let oracle = Arc::clone(&oracle);
                let audit = Arc::clone(&audit);
                let notifier = Arc::clone(&notifier);
                let counters = Arc::clone(&worker_counters);

                tokio::spawn(async move {
                    review_one(&*oracle, &*audit, &*notifier, &counters, task, review_timeout)
                        .await;
                    drop(permit);
                });
            }

            // Drain: wait for in-flight reviews before the dispatcher exits.
            let _ = semaphore
                .acquire_many(u32::try_from(workers).unwrap_or(u32::MAX))
                .await;
        });

        Self {
            tx,
            counters,
            dispatcher,
        }
    }

    /// Enqueues a decision for review without ever blocking the caller.
    ///
    /// A full queue drops this (newest) pair; a stopped pass counts the
    /// review as degraded. Either way the primary path continues untouched.
    pub fn submit(
        &self,
        context: &EvaluationContext,
        decision: &Decision,
        correlation_id: CorrelationId,
    ) {
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);

        let task = ReviewTask {
            context: context.clone(),
            decision: decision.clone(),
            correlation_id,
        };

        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(%correlation_id, "oversight queue full; dropping newest review");
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.degraded.fetch_add(1, Ordering::SeqCst);
                warn!(%correlation_id, "oversight pass stopped; review skipped");
            }
        }
    }

    /// Returns a snapshot of the throughput counters.
    #[must_use]
    pub fn stats(&self) -> OversightStats {
        self.counters.snapshot()
    }

    /// Stops accepting reviews and waits for in-flight ones to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.dispatcher.await;
    }
}

async fn review_one(
    oracle: &dyn ReviewOracle,
    audit: &dyn AuditLog,
    notifier: &dyn NotificationDispatcher,
    counters: &Counters,
    task: ReviewTask,
    review_timeout: Duration,
) {
    let request = ReviewRequest::new(
        OracleRequest::from_context(&task.context),
        task.decision.clone(),
    );

    let verdict = match timeout(review_timeout, oracle.review(&request)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => {
            counters.degraded.fetch_add(1, Ordering::SeqCst);
            warn!(
                correlation_id = %task.correlation_id,
                provider = oracle.provider(),
                error = %err,
                "oversight review degraded"
            );
            return;
        }
        Err(_) => {
            counters.degraded.fetch_add(1, Ordering::SeqCst);
            warn!(
                correlation_id = %task.correlation_id,
                provider = oracle.provider(),
                "oversight review timed out"
            );
            return;
        }
    };

    let flag = Flag::from_verdict(task.correlation_id, &verdict);
    if let Err(err) = audit.attach_flag(task.correlation_id, flag.clone()).await {
        counters.degraded.fetch_add(1, Ordering::SeqCst);
        warn!(
            correlation_id = %task.correlation_id,
            error = %err,
            "failed to record oversight flag"
        );
        return;
    }

    if flag.is_suspect() {
        let notice = OversightNotice::new(
            task.correlation_id,
            task.context.caller().clone(),
            task.context.key().clone(),
            flag,
        );
        notifier.notify(&notice);
    } else {
        debug!(correlation_id = %task.correlation_id, "decision reviewed clean");
    }

    counters.completed.fetch_add(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingNotifier;
    use arbiter_audit::{AuditEntry, AuditFilter, MemoryAuditLog};
    use arbiter_context::ContextBuilder;
    use arbiter_oracle::stub::{SlowOracle, StaticReviewOracle, UnavailableReviewOracle};
    use arbiter_oracle::{Decision, ReviewVerdict};
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

    async fn audited_decision(audit: &MemoryAuditLog, decision: &Decision) -> CorrelationId {
        audit
            .append(AuditEntry::builder(context(), decision.clone()).build())
            .await
            .unwrap()
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn suspect_reviews_flag_and_notify() {
        let audit = Arc::new(MemoryAuditLog::new());
        let notifier = CollectingNotifier::new();
        let pass = OversightPass::spawn(
            Arc::new(StaticReviewOracle::new(ReviewVerdict::suspect(
                "outcome disagrees with the rules",
                0.85,
            ))),
            audit.clone(),
            notifier.clone(),
            OversightConfig::new(),
        );

        let decision = Decision::allowed("within policy", 0.4);
        let id = audited_decision(&audit, &decision).await;
        pass.submit(&context(), &decision, id);

        wait_until(|| notifier.len() == 1).await;

        let entries = audit.query(&AuditFilter::new().flagged_only()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].flag().is_some_and(Flag::is_suspect));
        assert_eq!(pass.stats().completed, 1);

        pass.shutdown().await;
    }

    #[tokio::test]
    async fn clean_reviews_do_not_notify() {
        let audit = Arc::new(MemoryAuditLog::new());
        let notifier = CollectingNotifier::new();
        let pass = OversightPass::spawn(
            Arc::new(StaticReviewOracle::new(ReviewVerdict::clean("consistent", 0.95))),
            audit.clone(),
            notifier.clone(),
            OversightConfig::new(),
        );

        let decision = Decision::denied("too early", None, 0.9);
        let id = audited_decision(&audit, &decision).await;
        pass.submit(&context(), &decision, id);

        wait_until(|| pass.stats().completed == 1).await;
        assert!(notifier.is_empty());

        pass.shutdown().await;
    }

    #[tokio::test]
    async fn unavailable_review_oracle_degrades_quietly() {
        let audit = Arc::new(MemoryAuditLog::new());
        let notifier = CollectingNotifier::new();
        let pass = OversightPass::spawn(
            Arc::new(UnavailableReviewOracle),
            audit.clone(),
            notifier.clone(),
            OversightConfig::new(),
        );

        let decision = Decision::allowed("ok", 0.9);
        let id = audited_decision(&audit, &decision).await;
        pass.submit(&context(), &decision, id);

        wait_until(|| pass.stats().degraded == 1).await;
        assert!(notifier.is_empty());
        assert!(
            audit
                .query(&AuditFilter::new().flagged_only())
                .await
                .unwrap()
                .is_empty()
        );

        pass.shutdown().await;
    }

    #[tokio::test]
    async fn overload_drops_newest_without_blocking() {
        let audit = Arc::new(MemoryAuditLog::new());
        let notifier = CollectingNotifier::new();
        let slow = SlowOracle::new(
            StaticReviewOracle::new(ReviewVerdict::clean("ok", 0.9)),
            Duration::from_millis(200),
        );
        let pass = OversightPass::spawn(
            Arc::new(slow),
            audit.clone(),
            notifier.clone(),
            OversightConfig::new()
                .with_queue_capacity(1)
                .with_workers(NonZeroUsize::new(1).expect("non-zero")),
        );

        let decision = Decision::allowed("ok", 0.9);
        let id = audited_decision(&audit, &decision).await;

        let started = std::time::Instant::now();
        for _ in 0..10 {
            pass.submit(&context(), &decision, id);
        }
        // Submission must never wait on the slow reviewer.
        assert!(started.elapsed() < Duration::from_millis(100));

        let stats = pass.stats();
        assert_eq!(stats.submitted, 10);
        assert!(stats.dropped > 0);

        pass.shutdown().await;
    }
}
