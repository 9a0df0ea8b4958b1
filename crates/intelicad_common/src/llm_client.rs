//! LLM client abstraction.
//!
//! Provides a generic async interface for sending one prompt pair to a model
//! and getting the raw reply text back. Supports both real HTTP backends
//! (Ollama, OpenAI-compatible) and a scripted fake for tests. Parsing the
//! reply is the caller's job, see [`crate::llm_parse`].

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::gateway::CompletionRequest;

/// Environment variable holding the bearer key for hosted endpoints.
pub const API_KEY_ENV: &str = "INTELICAD_LLM_API_KEY";

/// LLM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_endpoint() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_model() -> String {
    "nvidia/llama-3.3-nemotron-super-49b-v1.5".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// Fill `api_key` from the environment when the file left it empty.
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        }
        self
    }

    /// Check if endpoint is Ollama-style
    pub fn is_ollama(&self) -> bool {
        self.endpoint.contains("11434") || self.endpoint.contains("ollama")
    }
}

/// LLM errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unexpected response shape: {0}")]
    BadResponse(String),

    #[error("LLM returned empty response")]
    EmptyResponse,
}

/// Generic LLM client trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one system/user prompt pair and return the raw reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Real LLM client implementation using HTTP
pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::HttpError(format!("Request failed: {}", e))
        }
    }

    /// Call Ollama-style API
    async fn call_ollama(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let model = request.model.as_deref().unwrap_or(&self.config.model);

        let body = json!({
            "model": model,
            "system": request.system_prompt,
            "prompt": request.user_message,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("Failed to parse response: {}", e)))?;

        non_empty(value.get("response").and_then(|v| v.as_str()))
    }

    /// Call OpenAI-compatible API
    async fn call_openai_compatible(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let model = request.model.as_deref().unwrap_or(&self.config.model);

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_message},
            ],
            "max_tokens": request.max_tokens,
            "temperature": self.config.temperature,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from OpenAI-compatible API",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("Failed to parse response: {}", e)))?;

        // Some reasoning models put the text in `reasoning_content` when
        // `content` is null.
        let message = value
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"));
        let content = message
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .or_else(|| {
                message
                    .and_then(|m| m.get("reasoning_content"))
                    .and_then(|v| v.as_str())
            });
        non_empty(content)
    }
}

fn non_empty(text: Option<&str>) -> Result<String, LlmError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.to_string()),
        _ => Err(LlmError::EmptyResponse),
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(
            "LLM request to {} ({} chars of prompt)",
            self.config.endpoint,
            request.system_prompt.len() + request.user_message.len()
        );
        if self.config.is_ollama() {
            self.call_ollama(request).await
        } else {
            self.call_openai_compatible(request).await
        }
    }
}

/// Fake LLM client for testing.
///
/// Routed responses are picked when their key occurs in the prompt
/// (`system` + `"\n"` + `user`); otherwise the scripted queue is consumed in
/// order, with the last entry repeating.
pub struct FakeLlmClient {
    responses: Mutex<Vec<Result<String, LlmError>>>,
    routes: Vec<(String, Result<String, LlmError>)>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeLlmClient {
    /// Create a fake client with pre-defined responses
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            routes: Vec::new(),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a fake client that always returns the same text
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// Create a fake client that always returns an error
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Answer any prompt containing `needle` with `text`.
    pub fn with_route(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.routes.push((needle.into(), Ok(text.into())));
        self
    }

    pub fn with_route_error(mut self, needle: impl Into<String>, error: LlmError) -> Self {
        self.routes.push((needle.into(), Err(error)));
        self
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        *lock(&self.call_count) += 1;
        lock(&self.requests).push(request.clone());

        let prompt = format!("{}\n{}", request.system_prompt, request.user_message);
        if let Some((_, response)) = self.routes.iter().find(|(needle, _)| prompt.contains(needle)) {
            return response.clone();
        }

        let mut responses = lock(&self.responses);
        match responses.len() {
            0 => Err(LlmError::EmptyResponse),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system: &str, user: &str) -> CompletionRequest {
        CompletionRequest::new(system, user)
    }

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.endpoint, "https://integrate.api.nvidia.com/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.is_ollama());
    }

    #[test]
    fn test_llm_config_partial_toml_shape() {
        let config: LlmConfig =
            serde_json::from_value(json!({"endpoint": "http://localhost:11434"})).unwrap();
        assert!(config.is_ollama());
        assert_eq!(config.timeout_secs, 60);
    }

    #[tokio::test]
    async fn test_fake_client_sequence_then_repeat() {
        let client = FakeLlmClient::new(vec![Ok("one".into()), Ok("two".into())]);
        assert_eq!(client.complete(&request("s", "u")).await.unwrap(), "one");
        assert_eq!(client.complete(&request("s", "u")).await.unwrap(), "two");
        assert_eq!(client.complete(&request("s", "u")).await.unwrap(), "two");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fake_client_routes_take_priority() {
        let client = FakeLlmClient::always("fallback")
            .with_route("ROLE: intent", "intent reply")
            .with_route_error("ROLE: retry", LlmError::Timeout(60));

        let r = client.complete(&request("ROLE: intent-analysis", "x")).await;
        assert_eq!(r.unwrap(), "intent reply");
        let r = client.complete(&request("ROLE: retry-adjustment", "x")).await;
        assert_eq!(r, Err(LlmError::Timeout(60)));
        let r = client.complete(&request("other", "x")).await;
        assert_eq!(r.unwrap(), "fallback");
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_fake_client_always_error() {
        let client = FakeLlmClient::always_error(LlmError::HttpError("down".into()));
        assert!(client.complete(&request("s", "u")).await.is_err());
        assert_eq!(client.call_count(), 1);
    }
}
