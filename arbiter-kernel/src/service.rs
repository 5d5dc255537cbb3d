//! The primary decision pipeline.

use std::sync::Arc;

use arbiter_audit::{AuditEntry, AuditError, AuditLog};
use arbiter_context::{ContextBuilder, EvaluationContext};
use arbiter_oracle::{Decision, DecisionOracle};
use arbiter_primitives::{CallerId, CorrelationId, FeatureActionKey};
use arbiter_rules::RuleRepository;
use arbiter_tools::{ExecutionRecord, ToolRegistry};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{DecisionEngine, DecisionEngineConfig};
use crate::executor::{ActionExecutor, ExecutorConfig};
use crate::oversight::{OversightPass, OversightStats};
use crate::wire::{DecisionRequest, DecisionResponse};

/// Infrastructure failures the pipeline cannot fold into a decision.
///
/// Domain failures (unassigned caller, invalid parameters, oracle trouble,
/// tool trouble) never surface here — they become ERROR decisions or failed
/// execution results. Only a broken audit trail aborts a request, because a
/// decision that cannot be recorded must not be served.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The audit log rejected an append.
    #[error("audit log failure: {source}")]
    Audit {
        /// Source [`AuditError`].
        #[from]
        source: AuditError,
    },
}

/// Result alias for pipeline operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// The decision-and-oversight pipeline.
///
/// Per request: resolve the caller's rule set against one repository
/// snapshot, build the canonical context, consult the oracle (bounded, with
/// fail-closed retries), append the audit entry, dispatch the bound tool for
/// ALLOWED decisions, and hand the `(context, decision)` pair to the
/// oversight pass without waiting for it.
pub struct DecisionService {
    repository: Arc<RuleRepository>,
    builder: ContextBuilder,
    engine: DecisionEngine,
    executor: ActionExecutor,
    audit: Arc<dyn AuditLog>,
    oversight: Option<OversightPass>,
}

impl DecisionService {
    /// Starts building a service from its required collaborators.
    #[must_use]
    pub fn builder(
        repository: Arc<RuleRepository>,
        oracle: Arc<dyn DecisionOracle>,
        tools: Arc<ToolRegistry>,
        audit: Arc<dyn AuditLog>,
    ) -> DecisionServiceBuilder {
        DecisionServiceBuilder {
            repository,
            oracle,
            tools,
            audit,
            engine_config: DecisionEngineConfig::default(),
            executor_config: ExecutorConfig::default(),
            oversight: None,
        }
    }

    /// Returns the audit log backing this service.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Returns oversight throughput counters, when oversight is configured.
    #[must_use]
    pub fn oversight_stats(&self) -> Option<OversightStats> {
        self.oversight.as_ref().map(OversightPass::stats)
    }

    /// Serves one decision request end to end.
    ///
    /// Always yields one of the three decision outcomes; an ALLOWED decision
    /// additionally carries the execution result (successful or failed) of
    /// its bound tool.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Audit`] only when the audit trail cannot
    /// record the decision; everything else folds into the response.
    pub async fn handle(&self, request: DecisionRequest) -> ServiceResult<DecisionResponse> {
        let caller = match CallerId::new(request.user.as_str()) {
            Ok(caller) => caller,
            Err(err) => {
                warn!(user = %request.user, error = %err, "rejecting request with untypable caller");
                return Ok(DecisionResponse::new(
                    Decision::error(err.to_string()),
                    None,
                    CorrelationId::random(),
                ));
            }
        };

        let key = match FeatureActionKey::new(&request.feature, &request.action) {
            Ok(key) => key,
            Err(err) => {
                warn!(caller = %caller, error = %err, "rejecting request with untypable key");
                return Ok(DecisionResponse::new(
                    Decision::error(err.to_string()),
                    None,
                    CorrelationId::random(),
                ));
            }
        };

        // The repository snapshot is fixed here for the whole request.
        let snapshot = self.repository.snapshot();

        let rule_set = match snapshot.resolve(&caller) {
            Ok(rule_set) => rule_set,
            Err(err) => {
                let context =
                    EvaluationContext::unresolved(caller, key, request.parameters.clone());
                return self
                    .finish_without_oracle(context, Decision::error(err.to_string()), "resolution")
                    .await;
            }
        };

        let context = match self.builder.build(
            caller.clone(),
            &rule_set,
            snapshot.environment(),
            &request.feature,
            &request.action,
            request.parameters.clone(),
        ) {
            Ok(context) => context,
            Err(err) => {
                let context =
                    EvaluationContext::unresolved(caller, key, request.parameters.clone());
                return self
                    .finish_without_oracle(context, Decision::error(err.to_string()), "validation")
                    .await;
            }
        };

        let evaluation = self.engine.evaluate(&context).await;
        let decision = evaluation.decision().clone();

        let entry = AuditEntry::builder(context.clone(), decision.clone())
            .metadata("oracle_attempts", json!(evaluation.attempts()))
            .build();
        let correlation_id = self.audit.append(entry).await?;

        let mut execution = None;
        if decision.is_allowed() {
            let record = match self.executor.execute(correlation_id, &decision, &context).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(%correlation_id, error = %err, "execution rejected");
                    ExecutionRecord::failed(
                        correlation_id,
                        context.key().clone(),
                        context.parameters().clone(),
                        err.to_string(),
                    )
                }
            };
            self.audit
                .attach_execution(correlation_id, record.clone())
                .await?;
            execution = Some(record);
        }

        if let Some(oversight) = &self.oversight {
            oversight.submit(&context, &decision, correlation_id);
        }

        info!(
            caller = %context.caller(),
            key = %context.key(),
            outcome = %decision.outcome(),
            %correlation_id,
            executed = execution.as_ref().is_some_and(ExecutionRecord::is_success),
            "decision served"
        );

        Ok(DecisionResponse::new(decision, execution, correlation_id))
    }

    /// Shuts the service down, draining in-flight oversight reviews.
    pub async fn shutdown(self) {
        if let Some(oversight) = self.oversight {
            oversight.shutdown().await;
        }
    }

    /// Audits and reviews a decision made without consulting the oracle
    /// (unassigned caller or validation rejection).
    async fn finish_without_oracle(
        &self,
        context: EvaluationContext,
        decision: Decision,
        stage: &str,
    ) -> ServiceResult<DecisionResponse> {
        warn!(
            caller = %context.caller(),
            key = %context.key(),
            stage,
            reason = decision.reason(),
            "request failed before oracle evaluation"
        );

        let entry = AuditEntry::builder(context.clone(), decision.clone())
            .metadata("stage", json!(stage))
            .build();
        let correlation_id = self.audit.append(entry).await?;

        if let Some(oversight) = &self.oversight {
            oversight.submit(&context, &decision, correlation_id);
        }

        Ok(DecisionResponse::new(decision, None, correlation_id))
    }
}

/// Builder assembling a [`DecisionService`].
pub struct DecisionServiceBuilder {
    repository: Arc<RuleRepository>,
    oracle: Arc<dyn DecisionOracle>,
    tools: Arc<ToolRegistry>,
    audit: Arc<dyn AuditLog>,
    engine_config: DecisionEngineConfig,
    executor_config: ExecutorConfig,
    oversight: Option<OversightPass>,
}

impl DecisionServiceBuilder {
    /// Overrides the decision-engine tunables.
    #[must_use]
    pub fn engine_config(mut self, config: DecisionEngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Overrides the action-executor tunables.
    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Installs an oversight pass; without one, decisions go unreviewed.
    #[must_use]
    pub fn with_oversight(mut self, oversight: OversightPass) -> Self {
        self.oversight = Some(oversight);
        self
    }

    /// Finalises the service.
    #[must_use]
    pub fn build(self) -> DecisionService {
        DecisionService {
            repository: self.repository,
            builder: ContextBuilder::new(),
            engine: DecisionEngine::new(self.oracle, self.engine_config),
            executor: ActionExecutor::new(self.tools, self.executor_config),
            audit: self.audit,
            oversight: self.oversight,
        }
    }
}
