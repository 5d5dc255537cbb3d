//! Deterministic oracle stubs for tests and demos.
//!
//! The reasoning step is irreducibly non-deterministic in production; tests
//! must never talk to a live model. These stubs give scripted, repeatable
//! behaviour for both the decision and review contracts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::contract::{Decision, DecisionOracle, OracleError, OracleRequest, OracleResult};
use crate::review::{ReviewOracle, ReviewRequest, ReviewVerdict};

/// Oracle that always answers with the same decision.
#[derive(Debug, Clone)]
pub struct StaticOracle {
    decision: Decision,
    calls: Arc<AtomicU64>,
}

impl StaticOracle {
    /// Creates a stub returning the supplied decision on every call.
    #[must_use]
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many times the stub has been consulted.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for StaticOracle {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn judge(&self, _request: &OracleRequest) -> OracleResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.decision.clone())
    }
}

/// Oracle that replays a scripted sequence of results, then repeats the last
/// scripted error kind (or fails the test by returning a transport error).
pub struct ScriptedOracle {
    script: Mutex<VecDeque<OracleResult<Decision>>>,
    calls: AtomicU64,
}

impl ScriptedOracle {
    /// Creates a stub that answers with the supplied results in order.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = OracleResult<Decision>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU64::new(0),
        }
    }

    /// Returns how many times the stub has been consulted.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn judge(&self, _request: &OracleRequest) -> OracleResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.script.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::transport("scripted oracle exhausted")))
    }
}

/// Oracle whose reply always violates the contract.
///
/// Stands in for a model that ignores the response-format instructions.
#[derive(Debug, Default, Clone)]
pub struct MalformedOracle {
    calls: Arc<AtomicU64>,
}

impl MalformedOracle {
    /// Creates the stub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the stub has been consulted.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for MalformedOracle {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn judge(&self, _request: &OracleRequest) -> OracleResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Decision::parse_strict("Decision: ALLOWED\nReason: looks fine")
    }
}

/// Wrapper that delays the inner oracle's reply.
pub struct SlowOracle<O> {
    inner: O,
    delay: Duration,
}

impl<O> SlowOracle<O> {
    /// Wraps an oracle, sleeping for `delay` before each reply.
    #[must_use]
    pub fn new(inner: O, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<O> DecisionOracle for SlowOracle<O>
where
    O: DecisionOracle,
{
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    async fn judge(&self, request: &OracleRequest) -> OracleResult<Decision> {
        tokio::time::sleep(self.delay).await;
        self.inner.judge(request).await
    }
}

#[async_trait]
impl<O> ReviewOracle for SlowOracle<O>
where
    O: ReviewOracle,
{
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    async fn review(&self, request: &ReviewRequest) -> OracleResult<ReviewVerdict> {
        tokio::time::sleep(self.delay).await;
        self.inner.review(request).await
    }
}

/// Review oracle that always answers with the same verdict.
#[derive(Debug, Clone)]
pub struct StaticReviewOracle {
    verdict: ReviewVerdict,
    calls: Arc<AtomicU64>,
}

impl StaticReviewOracle {
    /// Creates a stub returning the supplied verdict on every call.
    #[must_use]
    pub fn new(verdict: ReviewVerdict) -> Self {
        Self {
            verdict,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many times the stub has been consulted.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewOracle for StaticReviewOracle {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn review(&self, _request: &ReviewRequest) -> OracleResult<ReviewVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

/// Review oracle that always fails at the transport level.
#[derive(Debug, Default, Clone)]
pub struct UnavailableReviewOracle;

#[async_trait]
impl ReviewOracle for UnavailableReviewOracle {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn review(&self, _request: &ReviewRequest) -> OracleResult<ReviewVerdict> {
        Err(OracleError::transport("review oracle unavailable"))
    }
}
