//! Arbiter SDK facade.
//!
//! Depend on this crate via `cargo add arbiter`. It bundles the engine
//! crates behind feature flags so deployments can enable or disable
//! subsystems as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use arbiter_primitives as primitives;

/// Rule sets, tags, and the caller-to-rule-set repository (enabled by `rules`).
#[cfg(feature = "rules")]
pub use arbiter_rules as rules;

/// Canonical evaluation contexts (enabled by `context`).
#[cfg(feature = "context")]
pub use arbiter_context as context;

/// Reasoning-oracle contract and transports (enabled by `oracle`).
#[cfg(feature = "oracle")]
pub use arbiter_oracle as oracle;

/// Tool registry and execution records (enabled by `tools`).
#[cfg(feature = "tools")]
pub use arbiter_tools as tools;

/// Append-only audit trail (enabled by `audit`).
#[cfg(feature = "audit")]
pub use arbiter_audit as audit;

/// Decision pipeline and oversight pass (enabled by `kernel`).
#[cfg(feature = "kernel")]
pub use arbiter_kernel as kernel;
