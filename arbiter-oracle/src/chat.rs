//! Chat-completions oracle for OpenAI-compatible providers.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use crate::contract::{Decision, DecisionOracle, OracleError, OracleRequest, OracleResult};
use crate::http_client::{HyperClient, build_https_client};
use crate::prompt::{DECISION_SYSTEM_PROMPT, REVIEW_SYSTEM_PROMPT, decision_prompt, review_prompt};
use crate::review::{ReviewOracle, ReviewRequest, ReviewVerdict};

/// Environment variable used when loading configuration automatically.
pub const ORACLE_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for the chat-completions oracle.
#[derive(Clone, Debug)]
pub struct ChatOracleConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    temperature: f32,
}

impl ChatOracleConfig {
    /// Creates a configuration using the supplied model identifier.
    ///
    /// Temperature defaults to 0.0: rule evaluation wants the most
    /// deterministic reply the provider can give.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout: Duration::from_secs(60),
            temperature: 0.0,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(ORACLE_API_KEY_ENV).ok();
        cfg
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> OracleResult<Self> {
        let sanitized = sanitize_base_url(base_url.as_ref())?;
        self.base_url = sanitized;
        Ok(self)
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Oracle that calls an OpenAI-compatible chat-completions endpoint.
pub struct ChatOracle {
    client: HyperClient,
    endpoint: Uri,
    model: String,
    api_key: String,
    timeout: Duration,
    temperature: f32,
}

impl fmt::Debug for ChatOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOracle")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ChatOracle {
    /// Constructs a new oracle with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Configuration`] if the API key is missing or
    /// the endpoint cannot be built.
    pub fn new(config: ChatOracleConfig) -> OracleResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| OracleError::configuration("chat oracle requires an API key"))?;

        let endpoint = format!("{}v1/chat/completions", config.base_url)
            .parse::<Uri>()
            .map_err(|err| OracleError::configuration(format!("invalid oracle endpoint: {err}")))?;

        let client = build_https_client()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key,
            timeout: config.timeout,
            temperature: config.temperature,
        })
    }

    /// Sends one chat completion and returns the assistant's text content.
    async fn complete(&self, system: &str, user: String) -> OracleResult<String> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let body = serde_json::to_vec(&payload).map_err(|err| {
            OracleError::invalid_request(format!("failed to encode oracle request: {err}"))
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .body(Body::from(body))
            .map_err(|err| OracleError::transport(format!("failed to build request: {err}")))?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| OracleError::Timeout { after: self.timeout })?
            .map_err(|err| OracleError::transport(format!("oracle request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| OracleError::transport(format!("failed to read reply: {err}")))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited { retry_after: None });
        }

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).to_string();
            return Err(OracleError::transport(format!(
                "oracle returned {status}: {reason}"
            )));
        }

        let reply: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|err| OracleError::schema(format!("undecodable completion: {err}")))?;

        let content = reply
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|message| message.content))
            .ok_or_else(|| OracleError::schema("completion carried no content"))?;

        debug!(model = %self.model, bytes = content.len(), "oracle completion received");
        Ok(content)
    }
}

#[async_trait]
impl DecisionOracle for ChatOracle {
    fn provider(&self) -> &str {
        "chat-completions"
    }

    async fn judge(&self, request: &OracleRequest) -> OracleResult<Decision> {
        let content = self
            .complete(DECISION_SYSTEM_PROMPT, decision_prompt(request))
            .await?;
        Decision::parse_strict(extract_json_object(&content))
    }
}

#[async_trait]
impl ReviewOracle for ChatOracle {
    fn provider(&self) -> &str {
        "chat-completions"
    }

    async fn review(&self, request: &ReviewRequest) -> OracleResult<ReviewVerdict> {
        let content = self
            .complete(REVIEW_SYSTEM_PROMPT, review_prompt(request))
            .await?;
        ReviewVerdict::parse_strict(extract_json_object(&content))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Strips a Markdown code fence if the model wrapped its JSON in one.
///
/// Anything beyond that courtesy is left to the strict parser to reject.
fn extract_json_object(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn sanitize_base_url(input: &str) -> OracleResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(OracleError::configuration(
            "oracle base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| OracleError::configuration(format!("invalid oracle base URL: {err}")))?;
    Ok(base)
}
