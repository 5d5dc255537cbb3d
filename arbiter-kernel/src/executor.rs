//! Tool dispatch for allowed decisions.

use std::collections::HashSet;
use std::sync::Arc;

use arbiter_context::EvaluationContext;
use arbiter_oracle::Decision;
use arbiter_primitives::{CorrelationId, FeatureActionKey};
use arbiter_tools::{ExecutionRecord, ToolRegistry};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Tunables for the action executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    max_idempotent_retries: u32,
}

impl ExecutorConfig {
    /// Creates a configuration with the default knobs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many automatic retries an idempotent tool gets on failure.
    ///
    /// Tools that did not declare idempotence are never retried.
    #[must_use]
    pub const fn with_max_idempotent_retries(mut self, retries: u32) -> Self {
        self.max_idempotent_retries = retries;
        self
    }

    /// Returns the configured idempotent retry count.
    #[must_use]
    pub const fn max_idempotent_retries(self) -> u32 {
        self.max_idempotent_retries
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_idempotent_retries: 1,
        }
    }
}

/// Errors raised before a tool invocation is attempted.
///
/// A tool that runs and fails is not an `ExecuteError`; its failure is
/// captured inside the returned [`ExecutionRecord`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The decision did not allow execution.
    #[error("execution requires an ALLOWED decision")]
    NotAllowed,
    /// The decision allowed the action but no tool is bound to the key.
    #[error("no tool registered for `{key}`")]
    NoToolRegistered {
        /// The unbound feature/action key.
        key: FeatureActionKey,
    },
    /// An identical request was already executed by a non-idempotent tool.
    #[error("tool for `{key}` is not idempotent and already executed this request")]
    NonIdempotentReplay {
        /// The key whose tool refused the replay.
        key: FeatureActionKey,
    },
}

/// Dispatches allowed decisions to their registered tools.
///
/// Executes if and only if the decision outcome is ALLOWED and a tool is
/// bound to the context's feature/action key. Replay of an identical request
/// is rejected deterministically unless the tool declared itself idempotent.
pub struct ActionExecutor {
    tools: Arc<ToolRegistry>,
    config: ExecutorConfig,
    executed: Mutex<HashSet<String>>,
}

impl ActionExecutor {
    /// Creates an executor over the supplied registry.
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        Self {
            tools,
            config,
            executed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the executor configuration.
    #[must_use]
    pub const fn config(&self) -> ExecutorConfig {
        self.config
    }

    /// Attempts the side effect bound to the context's feature/action key.
    ///
    /// The returned record captures success or failure; the audit trail gets
    /// it either way. Failures of the tool itself never become `Err` — those
    /// are reserved for conditions where no invocation was attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] when the decision is not ALLOWED, no tool is
    /// registered, or a non-idempotent tool already executed this request.
    pub async fn execute(
        &self,
        correlation_id: CorrelationId,
        decision: &Decision,
        context: &EvaluationContext,
    ) -> Result<ExecutionRecord, ExecuteError> {
        if !decision.is_allowed() {
            return Err(ExecuteError::NotAllowed);
        }

        let key = context.key().clone();
        let Some(handle) = self.tools.get(&key) else {
            warn!(%key, %correlation_id, "allowed decision has no registered tool");
            return Err(ExecuteError::NoToolRegistered { key });
        };

        let idempotent = handle.metadata().is_idempotent();
        let replay_key = replay_key(context);

        if !idempotent {
            let executed = self.executed.lock().await;
            if executed.contains(&replay_key) {
                warn!(%key, %correlation_id, "rejecting replay for non-idempotent tool");
                return Err(ExecuteError::NonIdempotentReplay { key });
            }
        }

        let retries = if idempotent {
            self.config.max_idempotent_retries
        } else {
            0
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match handle
                .invoke(context.caller().clone(), context.parameters().clone())
                .await
            {
                Ok(output) => {
                    self.executed.lock().await.insert(replay_key);
                    info!(%key, %correlation_id, attempt, "tool executed");
                    return Ok(ExecutionRecord::completed(
                        correlation_id,
                        key,
                        context.parameters().clone(),
                        output,
                    ));
                }
                Err(err) if attempt <= retries => {
                    warn!(%key, %correlation_id, attempt, error = %err, "idempotent tool failed; retrying");
                }
                Err(err) => {
                    warn!(%key, %correlation_id, attempt, error = %err, "tool execution failed");
                    return Ok(ExecutionRecord::failed(
                        correlation_id,
                        key,
                        context.parameters().clone(),
                        err.to_string(),
                    ));
                }
            }
        }
    }
}

fn replay_key(context: &EvaluationContext) -> String {
    context
        .fingerprint()
        .map_or_else(|_| format!("{}:{}", context.caller(), context.key()), |f| {
            f.as_str().to_owned()
        })
}
