//! Reasoning-oracle contract and transports for Arbiter.
//!
//! The oracle is a black box that interprets natural-language rules against
//! an evaluation context and answers with a strictly-shaped decision. This
//! crate defines that contract, a chat-completions HTTPS adapter for
//! OpenAI-compatible providers, the independent review (oversight) contract,
//! and deterministic stubs for tests.

#![warn(missing_docs, clippy::pedantic)]

pub mod chat;
pub mod contract;
pub mod prompt;
pub mod review;
pub mod stub;

mod http_client;

pub use chat::{ChatOracle, ChatOracleConfig};
pub use contract::{
    Decision, DecisionOracle, DecisionOutcome, OracleError, OracleRequest, OracleResult,
};
pub use review::{ReviewOracle, ReviewOutcome, ReviewRequest, ReviewVerdict};
