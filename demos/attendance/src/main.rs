//! Attendance walkthrough: rules, decisions, execution, and oversight.
//!
//! Runs entirely against deterministic stub oracles so it works offline.
//! Swap in `ChatOracle::new(ChatOracleConfig::from_env("gpt-4o"))` to point
//! the same pipeline at a live OpenAI-compatible provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use arbiter::audit::{AuditFilter, AuditLog, MemoryAuditLog};
use arbiter::kernel::{
    DecisionRequest, DecisionService, OversightConfig, OversightPass, TracingNotifier,
};
use arbiter::oracle::stub::{StaticOracle, StaticReviewOracle};
use arbiter::oracle::{Decision, ReviewVerdict};
use arbiter::primitives::{CallerId, FeatureActionKey};
use arbiter::rules::{RuleRepository, RulesDocument};
use arbiter::tools::{ToolMetadata, ToolRegistry};
use serde_json::{Value, json};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    info!("=== Arbiter: attendance demo ===");

    let document = RulesDocument::new()
        .with_rule_set(
            "rule_set_1",
            "Standard Attendance Policy",
            [
                "[ATTENDANCE] can only be [CHECK-IN] at [LOCATION] after [TIME] 08:00",
                "[ATTENDANCE] can only be [CHECK-OUT] at [LOCATION] before [TIME] 20:00",
            ],
        )
        .with_assignment("user_1", "rule_set_1")
        .with_environment("project_location", json!("ProjectSite"));
    let repository = Arc::new(RuleRepository::from_document(&document)?);

    let registry = Arc::new(ToolRegistry::new());
    registry.register_tool(
        ToolMetadata::new(FeatureActionKey::new("ATTENDANCE", "CHECK-IN")?, "1.0.0")?
            .with_description("Record an attendance check-in"),
        |caller: CallerId, parameters: BTreeMap<String, Value>| async move {
            info!(caller = %caller, ?parameters, "attendance backend: check-in recorded");
            Ok(json!({ "entry_id": 1, "caller": caller.as_str() }))
        },
    )?;

    let audit = Arc::new(MemoryAuditLog::new());
    let oversight = OversightPass::spawn(
        Arc::new(StaticReviewOracle::new(ReviewVerdict::clean(
            "decision consistent with the attendance policy",
            0.97,
        ))),
        audit.clone(),
        Arc::new(TracingNotifier),
        OversightConfig::new(),
    );

    // A live deployment would plug ChatOracle in here.
    let oracle = Arc::new(StaticOracle::new(Decision::allowed(
        "check-in at the project site after 08:00 satisfies every rule",
        0.96,
    )));

    let service = DecisionService::builder(repository, oracle, registry, audit.clone())
        .with_oversight(oversight)
        .build();

    let response = service
        .handle(
            DecisionRequest::new("user_1", "ATTENDANCE", "CHECK-IN")
                .with_parameter("time", json!("08:15"))
                .with_parameter("location", json!("ProjectSite")),
        )
        .await?;

    info!(
        outcome = %response.decision().outcome(),
        reason = response.decision().reason(),
        executed = response.execution_result().is_some_and(|r| r.is_success()),
        "decision served"
    );

    // An unassigned caller fails closed.
    let stranger = service
        .handle(
            DecisionRequest::new("user_9", "ATTENDANCE", "CHECK-IN")
                .with_parameter("time", json!("08:15"))
                .with_parameter("location", json!("ProjectSite")),
        )
        .await?;
    info!(
        outcome = %stranger.decision().outcome(),
        reason = stranger.decision().reason(),
        "unassigned caller"
    );

    let entries = audit.query(&AuditFilter::new()).await?;
    info!(entries = entries.len(), "audit trail");

    service.shutdown().await;
    Ok(())
}
