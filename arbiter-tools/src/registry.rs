//! Runtime registry for tool metadata and execution.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};

use arbiter_primitives::{CallerId, FeatureActionKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    key: FeatureActionKey,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    idempotent: bool,
}

impl ToolMetadata {
    /// Creates metadata for the supplied feature/action key and version.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the version is empty.
    pub fn new(key: FeatureActionKey, version: impl Into<String>) -> ToolResult<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool version cannot be empty".into(),
            });
        }

        Ok(Self {
            key,
            version,
            description: None,
            idempotent: false,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares the tool idempotent and retry-safe.
    ///
    /// Only tools that make this declaration are ever re-invoked for an
    /// identical request or retried after a failure.
    #[must_use]
    pub fn declare_idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Returns the feature/action key the tool is bound to.
    #[must_use]
    pub fn key(&self) -> &FeatureActionKey {
        &self.key
    }

    /// Returns the semantic version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns `true` when the tool declared itself idempotent.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

/// Trait implemented by tool executors.
///
/// Tools receive exactly the canonical parameter map from the evaluation
/// context plus the caller identity, and answer with a JSON payload or a
/// typed error.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Performs the side effect.
    async fn invoke(
        &self,
        caller: CallerId,
        parameters: BTreeMap<String, Value>,
    ) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(CallerId, BTreeMap<String, Value>) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(
        &self,
        caller: CallerId,
        parameters: BTreeMap<String, Value>,
    ) -> ToolResult<Value> {
        (self)(caller, parameters).await
    }
}

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct ToolHandle {
    metadata: ToolMetadata,
    executor: Arc<dyn Tool>,
}

impl ToolHandle {
    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any [`ToolError::Execution`] returned by the underlying
    /// implementation.
    pub async fn invoke(
        &self,
        caller: CallerId,
        parameters: BTreeMap<String, Value>,
    ) -> ToolResult<Value> {
        self.executor.invoke(caller, parameters).await
    }
}

/// Registry that stores tool implementations keyed by feature/action pair.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<HashMap<FeatureActionKey, ToolHandle>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let keys: Vec<String> = inner.keys().map(ToString::to_string).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &keys)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the key is already bound.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_tool<T>(&self, metadata: ToolMetadata, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let key = metadata.key().clone();
        if inner.contains_key(&key) {
            return Err(ToolError::DuplicateTool { key });
        }

        inner.insert(
            key,
            ToolHandle {
                metadata,
                executor: Arc::new(tool),
            },
        );

        Ok(())
    }

    /// Returns a handle to the tool bound to the supplied key.
    #[must_use]
    pub fn get(&self, key: &FeatureActionKey) -> Option<ToolHandle> {
        let inner = self.inner.read().ok()?;
        inner.get(key).cloned()
    }

    /// Invokes a registered tool directly.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when no tool is bound to the key or
    /// propagates [`ToolError::Execution`] when the implementation fails.
    pub async fn invoke(
        &self,
        key: &FeatureActionKey,
        caller: CallerId,
        parameters: BTreeMap<String, Value>,
    ) -> ToolResult<Value> {
        let handle = self
            .get(key)
            .ok_or_else(|| ToolError::UnknownTool { key: key.clone() })?;
        handle.invoke(caller, parameters).await
    }

    /// Lists the metadata of all registered tools.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ToolMetadata> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .values()
            .map(|handle| handle.metadata.clone())
            .collect()
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Feature/action key collided with an existing registration.
    #[error("a tool is already registered for `{key}`")]
    DuplicateTool {
        /// The offending key.
        key: FeatureActionKey,
    },

    /// No tool is bound to the requested key.
    #[error("no tool registered for `{key}`")]
    UnknownTool {
        /// The missing key.
        key: FeatureActionKey,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}
