//! Anthropic Claude provider implementation

use super::types::{LlmRequest, LlmResponse, Usage};
use super::{http_client, transport_error, LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic model variants
#[derive(Debug, Clone, Copy)]
pub enum AnthropicModel {
    Sonnet45,
    Haiku45,
}

impl AnthropicModel {
    pub fn api_name(self) -> &'static str {
        match self {
            AnthropicModel::Sonnet45 => "claude-sonnet-4-5-20250929",
            AnthropicModel::Haiku45 => "claude-haiku-4-5-20251001",
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            AnthropicModel::Sonnet45 => "claude-4.5-sonnet",
            AnthropicModel::Haiku45 => "claude-4.5-haiku",
        }
    }
}

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: AnthropicModel,
    base_url: String,
}

impl AnthropicService {
    pub fn new(
        api_key: String,
        model: AnthropicModel,
        gateway: Option<&str>,
    ) -> Result<Self, String> {
        let base_url = match gateway {
            Some(gw) => format!("{}/anthropic/v1/messages", gw.trim_end_matches('/')),
            None => "https://api.anthropic.com/v1/messages".to_string(),
        };

        Ok(Self {
            client: http_client()?,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let system = request
            .system
            .iter()
            .map(|s| AnthropicSystemBlock {
                r#type: "text",
                text: s.text.clone(),
                cache_control: s.cache.then_some(CacheControl {
                    r#type: "ephemeral",
                }),
            })
            .collect();

        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: "user",
                content: m.text.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model.api_name(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            system,
            messages,
        }
    }

    fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
        let parts = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        LlmResponse {
            parts,
            finish_reason: resp.stop_reason,
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
                cache_creation_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
                cache_read_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
            },
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(|m| m.as_str())
            .unwrap_or(body);
        let mut err = LlmError::from_status(status.as_u16(), message);

        if let Some(retry_after) = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/retry_after"))
            .and_then(serde_json::Value::as_f64)
        {
            err = err.with_retry_after(Duration::from_secs_f64(retry_after));
        }
        err
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &text));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::malformed(format!("Failed to parse response: {e}")))?;

        Ok(Self::normalize_response(parsed))
    }

    fn model_id(&self) -> &str {
        self.model.model_id()
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}
