use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use withyou_common::{Result, WithYouError};

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::OpenAiCompatClient;
use crate::retry::{RetryPolicy, RetryingClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider family. "gemini" and "openai" both speak the
    /// OpenAI-compatible chat-completions dialect.
    pub provider: String,

    /// Base URL of the chat-completions endpoint.
    pub api_url: Option<String>,

    /// API key. Prefer `api_key_env`; a key stored here makes the config
    /// file subject to permission checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Model used by the safety gate.
    pub safety_model: String,

    /// Model used for triage routing.
    pub routing_model: String,

    /// Model used by the specialists.
    pub reasoning_model: String,

    pub timeout_ms: u64,

    pub max_concurrent_requests: usize,

    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            api_url: None,
            api_key: None,
            api_key_env: "GOOGLE_API_KEY".into(),
            safety_model: "gemini-1.5-flash".into(),
            routing_model: "gemini-1.5-flash".into(),
            reasoning_model: "gemini-1.5-pro".into(),
            timeout_ms: 60_000,
            max_concurrent_requests: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key: explicit `api_key` first, then the variable
    /// named by `api_key_env` through `lookup` (normally `std::env::var`).
    ///
    /// A missing or blank key is a configuration error: the assistant must
    /// not start without a model.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        match lookup(&self.api_key_env) {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(WithYouError::Config(format!(
                "{} is not set. The assistant needs a model API key to start.",
                self.api_key_env
            ))),
        }
    }
}

/// Limits in-flight requests across every client sharing the semaphore.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, semaphore: Arc<Semaphore>) -> Self {
        Self { inner, semaphore }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| WithYouError::Llm(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// One client per model role.
#[derive(Clone)]
pub struct ModelClients {
    pub safety: Arc<dyn LlmClient>,
    pub routing: Arc<dyn LlmClient>,
    pub reasoning: Arc<dyn LlmClient>,
}

pub fn build_llm_client(
    config: &LlmConfig,
    model: &str,
    api_key: &str,
    semaphore: Arc<Semaphore>,
) -> Result<Arc<dyn LlmClient>> {
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "gemini" | "openai" => Box::new(OpenAiCompatClient::new(
            config.api_url.clone(),
            model.to_string(),
            Some(api_key.to_string()),
            Some(config.timeout_ms),
        )?),
        other => {
            return Err(WithYouError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    Ok(Arc::new(SemaphoredClient::new(Arc::from(retrying), semaphore)))
}

/// Build the safety, routing and reasoning clients behind one shared
/// concurrency limit.
pub fn build_model_clients(config: &LlmConfig, api_key: &str) -> Result<ModelClients> {
    if config.max_concurrent_requests == 0 {
        return Err(WithYouError::Config(
            "llm.max_concurrent_requests must be at least 1".into(),
        ));
    }
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests));
    Ok(ModelClients {
        safety: build_llm_client(config, &config.safety_model, api_key, semaphore.clone())?,
        routing: build_llm_client(config, &config.routing_model, api_key, semaphore.clone())?,
        reasoning: build_llm_client(config, &config.reasoning_model, api_key, semaphore)?,
    })
}
