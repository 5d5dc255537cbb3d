//! Decision pipeline for Arbiter.
//!
//! This crate wires the subsystems into the primary request path — resolve
//! rules, build the context, consult the oracle, execute the bound tool,
//! audit — and runs the decoupled oversight pass beside it. The oracle call
//! is the only blocking point on the primary path; oversight consumes a
//! bounded, lossy queue and can never hold a decision back.

#![warn(missing_docs, clippy::pedantic)]

mod engine;
mod executor;
mod notify;
mod oversight;
mod service;
mod wire;

pub use engine::{DecisionEngine, DecisionEngineConfig, Evaluation};
pub use executor::{ActionExecutor, ExecuteError, ExecutorConfig};
pub use notify::{CollectingNotifier, NotificationDispatcher, OversightNotice, TracingNotifier};
pub use oversight::{OversightConfig, OversightPass, OversightStats};
pub use service::{DecisionService, DecisionServiceBuilder, ServiceError, ServiceResult};
pub use wire::{DecisionRequest, DecisionResponse};
