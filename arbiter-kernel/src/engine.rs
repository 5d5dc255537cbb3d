//! Oracle-backed decision evaluation with bounded retry and de-duplication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbiter_context::EvaluationContext;
use arbiter_oracle::{Decision, DecisionOracle, OracleRequest};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Tunables for the decision engine.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngineConfig {
    oracle_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    dedup_window: Duration,
}

impl DecisionEngineConfig {
    /// Creates a configuration with the default knobs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt oracle timeout.
    #[must_use]
    pub const fn with_oracle_timeout(mut self, oracle_timeout: Duration) -> Self {
        self.oracle_timeout = oracle_timeout;
        self
    }

    /// Sets how many retries follow the initial attempt.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff delay; attempt `n` waits `backoff * 2^(n-1)`.
    #[must_use]
    pub const fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Sets how long a completed evaluation stays shareable with duplicate
    /// requests for the same context fingerprint.
    #[must_use]
    pub const fn with_dedup_window(mut self, dedup_window: Duration) -> Self {
        self.dedup_window = dedup_window;
        self
    }

    /// Returns the per-attempt oracle timeout.
    #[must_use]
    pub const fn oracle_timeout(self) -> Duration {
        self.oracle_timeout
    }

    /// Returns the configured retry count.
    #[must_use]
    pub const fn max_retries(self) -> u32 {
        self.max_retries
    }

    /// Returns the base backoff delay.
    #[must_use]
    pub const fn retry_backoff(self) -> Duration {
        self.retry_backoff
    }

    /// Returns the de-duplication window.
    #[must_use]
    pub const fn dedup_window(self) -> Duration {
        self.dedup_window
    }
}

impl Default for DecisionEngineConfig {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            dedup_window: Duration::from_secs(2),
        }
    }
}

/// A decision together with how many oracle attempts produced it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    decision: Decision,
    attempts: u32,
}

impl Evaluation {
    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Returns how many oracle calls were made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consumes the evaluation, yielding the decision.
    #[must_use]
    pub fn into_decision(self) -> Decision {
        self.decision
    }
}

struct InflightSlot {
    cell: Arc<OnceCell<Evaluation>>,
    created: Instant,
}

/// Evaluates contexts through the reasoning oracle, failing closed.
///
/// Each context is evaluated at most once per request. Concurrent duplicates
/// for the same context fingerprint share a single oracle call, and a
/// completed evaluation stays shareable for the configured window.
pub struct DecisionEngine {
    oracle: Arc<dyn DecisionOracle>,
    config: DecisionEngineConfig,
    inflight: Mutex<HashMap<String, InflightSlot>>,
}

impl DecisionEngine {
    /// Creates an engine backed by the supplied oracle.
    #[must_use]
    pub fn new(oracle: Arc<dyn DecisionOracle>, config: DecisionEngineConfig) -> Self {
        Self {
            oracle,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> DecisionEngineConfig {
        self.config
    }

    /// Evaluates the context, never panicking and never defaulting open:
    /// every failure mode surfaces as a `Decision` with the ERROR outcome.
    pub async fn evaluate(&self, context: &EvaluationContext) -> Evaluation {
        let fingerprint = match context.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(error = %err, "context fingerprint failed; evaluating without dedup");
                return self.consult_oracle(context).await;
            }
        };

        let cell = {
            let mut guard = self.inflight.lock().await;
            guard.retain(|_, slot| {
                slot.cell.get().is_none() || slot.created.elapsed() <= self.config.dedup_window
            });
            let slot = guard
                .entry(fingerprint.as_str().to_owned())
                .or_insert_with(|| InflightSlot {
                    cell: Arc::new(OnceCell::new()),
                    created: Instant::now(),
                });
            Arc::clone(&slot.cell)
        };

        cell.get_or_init(|| self.consult_oracle(context)).await.clone()
    }

    async fn consult_oracle(&self, context: &EvaluationContext) -> Evaluation {
        let request = OracleRequest::from_context(context);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let result = match timeout(self.config.oracle_timeout, self.oracle.judge(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(arbiter_oracle::OracleError::Timeout {
                    after: self.config.oracle_timeout,
                }),
            };

            match result {
                Ok(decision) => {
                    debug!(
                        provider = self.oracle.provider(),
                        outcome = %decision.outcome(),
                        attempts,
                        "oracle verdict received"
                    );
                    return Evaluation { decision, attempts };
                }
                Err(err) if err.is_retryable() && attempts <= self.config.max_retries => {
                    let backoff = self.config.retry_backoff * 2_u32.pow(attempts - 1);
                    warn!(
                        provider = self.oracle.provider(),
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "oracle attempt failed; backing off"
                    );
                    sleep(backoff).await;
                }
                Err(err) => {
                    warn!(
                        provider = self.oracle.provider(),
                        attempts,
                        error = %err,
                        "oracle unavailable; failing closed"
                    );
                    return Evaluation {
                        decision: Decision::error(format!("rule evaluation unavailable: {err}")),
                        attempts,
                    };
                }
            }
        }
    }
}
