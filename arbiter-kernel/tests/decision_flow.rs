//! End-to-end pipeline tests with deterministic stub oracles.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arbiter_audit::{AuditFilter, AuditLog, MemoryAuditLog};
use arbiter_kernel::{
    CollectingNotifier, DecisionEngineConfig, DecisionRequest, DecisionService, OversightConfig,
    OversightPass,
};
use arbiter_oracle::stub::{MalformedOracle, SlowOracle, StaticOracle, StaticReviewOracle};
use arbiter_oracle::{Decision, DecisionOracle, DecisionOutcome, ReviewVerdict};
use arbiter_primitives::{CallerId, FeatureActionKey};
use arbiter_rules::{RuleRepository, RulesDocument};
use arbiter_tools::{ToolMetadata, ToolRegistry};
use serde_json::{Value, json};

fn repository() -> Arc<RuleRepository> {
    let document = RulesDocument::new()
        .with_rule_set(
            "rule_set_1",
            "Standard Attendance Policy",
            ["[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00"],
        )
        .with_assignment("user_1", "rule_set_1")
        .with_environment("project_location", json!("ProjectSite"));
    Arc::new(RuleRepository::from_document(&document).unwrap())
}

fn check_in_key() -> FeatureActionKey {
    FeatureActionKey::new("ATTENDANCE", "CHECK-IN").unwrap()
}

fn counting_registry(invocations: &Arc<AtomicU32>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    let counter = Arc::clone(invocations);
    registry
        .register_tool(
            ToolMetadata::new(check_in_key(), "1.0.0")
                .unwrap()
                .with_description("Record an attendance check-in"),
            move |caller: CallerId, _: BTreeMap<String, Value>| {
                let counter = Arc::clone(&counter);
                async move {
                    let entry_id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(json!({ "entry_id": entry_id, "caller": caller.as_str() }))
                }
            },
        )
        .unwrap();
    registry
}

fn check_in_request(time: &str, location: &str) -> DecisionRequest {
    DecisionRequest::new("user_1", "ATTENDANCE", "CHECK-IN")
        .with_parameter("time", json!(time))
        .with_parameter("location", json!(location))
}

fn service(
    oracle: Arc<dyn DecisionOracle>,
    registry: Arc<ToolRegistry>,
    audit: Arc<MemoryAuditLog>,
) -> DecisionService {
    DecisionService::builder(repository(), oracle, registry, audit)
        .engine_config(
            DecisionEngineConfig::new().with_retry_backoff(Duration::from_millis(5)),
        )
        .build()
}

#[tokio::test]
async fn denied_decision_executes_nothing_and_audits_once() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service(
        Arc::new(StaticOracle::new(Decision::denied(
            "check-in before 08:00 is not permitted",
            Some("[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00".into()),
            0.9,
        ))),
        counting_registry(&invocations),
        audit.clone(),
    );

    let response = service
        .handle(check_in_request("07:30", "Home"))
        .await
        .unwrap();

    assert!(response.decision().is_denied());
    assert!(response.decision().rule_violated().is_some());
    assert!(response.execution_result().is_none());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    assert_eq!(audit.count().await.unwrap(), 1);
    let entries = audit.query(&AuditFilter::new()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].decision().is_denied());
    assert!(entries[0].execution().is_none());
}

#[tokio::test]
async fn allowed_decision_executes_the_tool_once() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service(
        Arc::new(StaticOracle::new(Decision::allowed(
            "check-in at the project site after 08:00 satisfies the policy",
            0.95,
        ))),
        counting_registry(&invocations),
        audit.clone(),
    );

    let response = service
        .handle(check_in_request("08:15", "ProjectSite"))
        .await
        .unwrap();

    assert!(response.decision().is_allowed());
    let execution = response.execution_result().expect("tool ran");
    assert!(execution.is_success());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // Decision entry plus its execution follow-up.
    assert_eq!(audit.count().await.unwrap(), 2);
    let entries = audit.query(&AuditFilter::new()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let joined = &entries[0];
    assert_eq!(joined.correlation_id(), response.correlation_id());
    assert!(joined.execution().is_some_and(|record| record.is_success()));
}

#[tokio::test]
async fn malformed_oracle_fails_closed_with_attempts_recorded() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let oracle = Arc::new(MalformedOracle::new());
    let service = service(oracle.clone(), counting_registry(&invocations), audit.clone());

    let response = service
        .handle(check_in_request("08:15", "ProjectSite"))
        .await
        .unwrap();

    assert_eq!(response.decision().outcome(), DecisionOutcome::Error);
    assert!(response.execution_result().is_none());
    assert_eq!(oracle.calls(), 3);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let entries = audit.query(&AuditFilter::new()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata().get("oracle_attempts"), Some(&json!(3)));
}

#[tokio::test]
async fn unassigned_callers_get_error_without_an_oracle_call() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let oracle = Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9)));
    let service = service(oracle.clone(), counting_registry(&invocations), audit.clone());

    let response = service
        .handle(
            DecisionRequest::new("user_9", "ATTENDANCE", "CHECK-IN")
                .with_parameter("time", json!("08:15"))
                .with_parameter("location", json!("ProjectSite")),
        )
        .await
        .unwrap();

    assert!(response.decision().is_error());
    assert_eq!(oracle.calls(), 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    // The rejection is still audited.
    assert_eq!(audit.count().await.unwrap(), 1);
}

#[tokio::test]
async fn validation_failures_reject_before_the_oracle() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let oracle = Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9)));
    let service = service(oracle.clone(), counting_registry(&invocations), audit.clone());

    // Missing LOCATION parameter required by the applicable rule.
    let response = service
        .handle(
            DecisionRequest::new("user_1", "ATTENDANCE", "CHECK-IN")
                .with_parameter("time", json!("08:15")),
        )
        .await
        .unwrap();

    assert!(response.decision().is_error());
    assert!(response.decision().reason().contains("LOCATION"));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(audit.count().await.unwrap(), 1);
}

#[tokio::test]
async fn allowed_without_a_tool_surfaces_an_execution_error() {
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service(
        Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9))),
        Arc::new(ToolRegistry::new()),
        audit.clone(),
    );

    let response = service
        .handle(check_in_request("08:15", "ProjectSite"))
        .await
        .unwrap();

    assert!(response.decision().is_allowed());
    let execution = response.execution_result().expect("failure surfaced");
    assert!(!execution.is_success());
    assert!(
        execution
            .failure_reason()
            .is_some_and(|reason| reason.contains("no tool registered"))
    );

    let entries = audit.query(&AuditFilter::new()).await.unwrap();
    assert!(entries[0].execution().is_some_and(|record| !record.is_success()));
}

#[tokio::test]
async fn replayed_requests_are_rejected_for_non_idempotent_tools() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service(
        Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9))),
        counting_registry(&invocations),
        audit.clone(),
    );

    let first = service
        .handle(check_in_request("08:15", "ProjectSite"))
        .await
        .unwrap();
    assert!(first.execution_result().is_some_and(|r| r.is_success()));

    let second = service
        .handle(check_in_request("08:15", "ProjectSite"))
        .await
        .unwrap();
    let replay = second.execution_result().expect("replay surfaced");
    assert!(!replay.is_success());
    assert!(
        replay
            .failure_reason()
            .is_some_and(|reason| reason.contains("not idempotent"))
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn suspect_decisions_reach_the_notifier() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let notifier = CollectingNotifier::new();
    let oversight = OversightPass::spawn(
        Arc::new(StaticReviewOracle::new(ReviewVerdict::suspect(
            "allow outcome conflicts with the 08:00 rule",
            0.8,
        ))),
        audit.clone(),
        notifier.clone(),
        OversightConfig::new(),
    );

    let service = DecisionService::builder(
        repository(),
        Arc::new(StaticOracle::new(Decision::allowed("ok", 0.5))),
        counting_registry(&invocations),
        audit.clone(),
    )
    .with_oversight(oversight)
    .build();

    let response = service
        .handle(check_in_request("07:30", "Home"))
        .await
        .unwrap();

    // The flag arrives asynchronously, attributable by correlation id.
    for _ in 0..200 {
        if notifier.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let notices = notifier.drain();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].correlation_id(), response.correlation_id());

    let flagged = audit.query(&AuditFilter::new().flagged_only()).await.unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].correlation_id(), response.correlation_id());

    service.shutdown().await;
}

#[tokio::test]
async fn slow_oversight_never_delays_the_primary_path() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let notifier = CollectingNotifier::new();
    let slow_reviewer = SlowOracle::new(
        StaticReviewOracle::new(ReviewVerdict::clean("ok", 0.9)),
        Duration::from_secs(2),
    );
    let oversight = OversightPass::spawn(
        Arc::new(slow_reviewer),
        audit.clone(),
        notifier.clone(),
        OversightConfig::new()
            .with_queue_capacity(1)
            .with_workers(NonZeroUsize::new(1).expect("non-zero")),
    );

    let service = DecisionService::builder(
        repository(),
        Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9))),
        counting_registry(&invocations),
        audit.clone(),
    )
    .with_oversight(oversight)
    .build();

    let started = Instant::now();
    for time in ["08:05", "08:10", "08:15", "08:20", "08:25"] {
        let response = service
            .handle(check_in_request(time, "ProjectSite"))
            .await
            .unwrap();
        assert!(response.decision().is_allowed());
    }
    // Five decisions against a reviewer that takes 2 s each: the primary
    // path must not have waited for any of them.
    assert!(started.elapsed() < Duration::from_secs(1));

    let stats = service.oversight_stats().expect("oversight configured");
    assert_eq!(stats.submitted, 5);
}

#[tokio::test]
async fn audit_trail_grows_monotonically_with_stable_hashes() {
    let invocations = Arc::new(AtomicU32::new(0));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service(
        Arc::new(StaticOracle::new(Decision::allowed("ok", 0.9))),
        counting_registry(&invocations),
        audit.clone(),
    );

    let mut last_count = 0;
    let mut earlier_hashes: Vec<String> = Vec::new();

    for time in ["08:05", "08:10", "08:15"] {
        service
            .handle(check_in_request(time, "ProjectSite"))
            .await
            .unwrap();

        let count = audit.count().await.unwrap();
        assert!(count > last_count);
        last_count = count;

        let hashes = audit.record_hashes().await;
        assert!(hashes.starts_with(&earlier_hashes));
        earlier_hashes = hashes;
    }
}
