//! Rule sets, tag extraction, and caller assignment for Arbiter.
//!
//! Rule text is opaque natural language; the only structure this crate reads
//! out of it is the set of bracketed `[TAG]` placeholders, which drive
//! parameter-schema inference and feature/action lookup. Interpretation of
//! rule semantics is delegated to the reasoning oracle.

#![warn(missing_docs, clippy::pedantic)]

mod document;
mod error;
mod model;
mod repository;
mod tags;

/// Persisted rules document shape owned by the external rule editor.
pub use document::{RuleSetSpec, RulesDocument};
/// Error type and result alias for rule operations.
pub use error::{RuleError, RuleResult};
/// In-memory rule model with pre-extracted tags.
pub use model::{Rule, RuleSet};
/// Hot-swappable repository resolving callers to rule-set snapshots.
pub use repository::{RuleRepository, RulesSnapshot};
/// Tag extraction and parameter type inference.
pub use tags::{ParamType, Tag, TagParser};
