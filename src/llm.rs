//! Chat-completions client for SQL generation.
//!
//! The pipeline talks to the model through the [`SqlGenerator`] trait so
//! tests can substitute a mock. The real implementation posts a single
//! user message to an OpenAI-compatible `/chat/completions` endpoint with
//! the stop sequence from [`crate::prompt`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{ScribeError, ScribeResult};
use crate::prompt::STOP_SEQUENCE;

/// Anything that can turn a rendered prompt into SQL text.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> ScribeResult<String>;
}

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    config: ModelConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a client. An empty API key is a configuration error.
    pub fn new(config: ModelConfig) -> ScribeResult<Self> {
        if config.api_key.is_empty() {
            return Err(ScribeError::config(
                "model API key is required (set OPENAI_API_KEY)",
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScribeError::Model(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl SqlGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> ScribeResult<String> {
        let request = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stop: Some(vec![STOP_SEQUENCE.to_string()]),
            temperature: Some(0.0),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ScribeError::Model(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ScribeError::Model(format!("api error ({status}): {body}")));
        }

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| ScribeError::Model(format!("malformed response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "model call finished"
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ScribeError::Model("response carried no choices".to_string()))?;

        Ok(clean_sql_response(&choice.message.content))
    }
}

/// Truncate at any `SQLResult:` continuation the stop sequence let
/// through, then unwrap a markdown code fence.
pub fn clean_sql_response(raw: &str) -> String {
    let cut = match raw.find("SQLResult:") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let trimmed = cut.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[allow(dead_code)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model_config() -> ModelConfig {
        ModelConfig {
            api_key: "test-key".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = ModelConfig {
            api_key: String::new(),
            ..model_config()
        };
        assert!(OpenAiClient::new(config).is_err());
    }

    #[test]
    fn test_request_carries_stop_sequence() {
        let request = ChatCompletionsRequest {
            model: "gpt-4-turbo-preview".to_string(),
            messages: vec![],
            stop: Some(vec![STOP_SEQUENCE.to_string()]),
            temperature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"stop\":[\"\\nSQLResult:\"]"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_clean_truncates_at_stop_token() {
        let raw = "SELECT 1\nSQLResult: 1 row";
        assert_eq!(clean_sql_response(raw), "SELECT 1");
    }

    #[test]
    fn test_clean_truncates_mid_line_stop_token() {
        let raw = "SELECT po.name FROM `tabPurchase Order` po SQLResult: ...";
        assert_eq!(
            clean_sql_response(raw),
            "SELECT po.name FROM `tabPurchase Order` po"
        );
    }

    #[test]
    fn test_clean_strips_code_fence() {
        let raw = "```sql\nSELECT 1\n```";
        assert_eq!(clean_sql_response(raw), "SELECT 1");
    }

    #[test]
    fn test_clean_passes_plain_sql_through() {
        assert_eq!(clean_sql_response("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_mocked_response_parses() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "SELECT 1\nSQLResult:"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatCompletionsResponse = serde_json::from_str(body).unwrap();
        let content = &parsed.choices[0].message.content;
        assert_eq!(clean_sql_response(content), "SELECT 1");
    }
}
