//! One-shot structured completions on top of an [`LlmClient`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm_client::LlmClient;
use crate::llm_parse::{extract_structured, strip_reasoning_blocks, ParseOutcome};

pub const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub max_tokens: u32,
    /// Overrides the client's configured model.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            model: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Clone)]
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Send the request and parse a JSON object out of the reply.
    ///
    /// Transport failures come back as a degraded outcome; the call is not
    /// retried.
    pub async fn complete(&self, request: &CompletionRequest) -> ParseOutcome {
        match self.client.complete(request).await {
            Ok(text) => {
                let outcome = extract_structured(&text);
                if let Some(diag) = outcome.diagnostic() {
                    warn!("LLM reply could not be parsed: {}", diag);
                }
                outcome
            }
            Err(e) => {
                warn!("LLM request failed: {}", e);
                ParseOutcome::transport(e)
            }
        }
    }

    /// Free-text completion with reasoning blocks removed.
    pub async fn complete_text(&self, request: &CompletionRequest) -> Option<String> {
        match self.client.complete(request).await {
            Ok(text) => {
                let cleaned = strip_reasoning_blocks(&text).trim().to_string();
                debug!("Reasoning reply: {} chars", cleaned.len());
                Some(cleaned).filter(|t| !t.is_empty())
            }
            Err(e) => {
                warn!("LLM reasoning request failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{FakeLlmClient, LlmError};
    use crate::llm_parse::ParseFailure;
    use serde_json::json;

    #[tokio::test]
    async fn test_transport_error_is_degraded() {
        let gateway = LlmGateway::new(Arc::new(FakeLlmClient::always_error(LlmError::Timeout(60))));
        let outcome = gateway.complete(&CompletionRequest::new("s", "u")).await;
        assert_eq!(outcome.diagnostic().unwrap().kind, ParseFailure::Transport);
    }

    #[tokio::test]
    async fn test_complete_parses_reply() {
        let gateway = LlmGateway::new(Arc::new(FakeLlmClient::always(
            "Sure!\n```json\n{\"operations\": [{\"type\": \"scale\"}]}\n```",
        )));
        let outcome = gateway.complete(&CompletionRequest::new("s", "u")).await;
        assert_eq!(
            outcome,
            ParseOutcome::Parsed(json!({"operations": [{"type": "scale"}]}))
        );
    }

    #[tokio::test]
    async fn test_complete_text_strips_reasoning() {
        let gateway = LlmGateway::new(Arc::new(FakeLlmClient::always(
            "<think>internal</think>\nUse a 2.5 mm shell.",
        )));
        let text = gateway.complete_text(&CompletionRequest::new("s", "u")).await;
        assert_eq!(text.as_deref(), Some("Use a 2.5 mm shell."));
    }
}
