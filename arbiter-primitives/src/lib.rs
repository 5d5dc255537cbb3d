//! Core shared types for the Arbiter decision-and-oversight engine.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod keys;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Validated caller and rule-set identifiers plus audit correlation ids.
pub use ids::{CallerId, CorrelationId, RuleSetId};
/// Normalized feature/action pair used to key rules and tools.
pub use keys::FeatureActionKey;
