//! Common types for LLM interactions

use serde::{Deserialize, Serialize};

/// LLM request
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Vec<SystemContent>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Single user turn on top of the given system blocks
    pub fn user(system: Vec<SystemContent>, text: impl Into<String>) -> Self {
        Self {
            system,
            messages: vec![LlmMessage::user(text)],
            ..Self::default()
        }
    }

    /// All system blocks joined, for providers that take a single string
    pub fn system_text(&self) -> String {
        self.system
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// System prompt content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemContent {
    pub text: String,
    /// Ask the provider to cache this block across requests
    pub cache: bool,
}

impl SystemContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: false,
        }
    }

    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: true,
        }
    }
}

/// User turn of a request; every participant step is a single exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmMessage {
    pub text: String,
}

impl LlmMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// LLM response
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Text parts in the order the provider returned them
    pub parts: Vec<String>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![text.into()],
            ..Self::default()
        }
    }

    /// Get text content from the response
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}
