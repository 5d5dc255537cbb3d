//! Canonical evaluation contexts for Arbiter.
//!
//! The context is the single immutable snapshot handed to the reasoning
//! oracle: caller, feature/action, canonicalized parameters, the full rule
//! texts, and environmental facts. Construction is pure — identical inputs
//! produce byte-identical contexts, which the engine relies on for
//! de-duplication and the audit trail relies on for stable hashing.

#![warn(missing_docs, clippy::pedantic)]

mod builder;
mod context;
mod error;

/// Pure validation and construction of evaluation contexts.
pub use builder::ContextBuilder;
/// Immutable context snapshot plus its stable fingerprint.
pub use context::{ContextFingerprint, EvaluationContext};
/// Validation error taxonomy raised before any oracle call.
pub use error::{ContextError, ContextResult};
