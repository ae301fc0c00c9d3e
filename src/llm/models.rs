//! Model definitions for the supported providers

use super::anthropic::AnthropicModel;
use super::gemini::GeminiModel;
use super::{AnthropicService, GeminiService, LlmService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    Anthropic,
}

impl Provider {
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gemini => "Google Gemini",
            Provider::Anthropic => "Anthropic",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

type Factory = fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID
    pub id: &'static str,
    pub provider: Provider,
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
    /// Creates the service from an API key and optional gateway
    pub factory: Factory,
}

fn gemini(
    model: GeminiModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires GEMINI_API_KEY or gateway", model.api_name()));
    }
    Ok(Arc::new(GeminiService::new(api_key.to_string(), model, gateway)?))
}

fn anthropic(
    model: AnthropicModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires ANTHROPIC_API_KEY or gateway", model.model_id()));
    }
    Ok(Arc::new(AnthropicService::new(api_key.to_string(), model, gateway)?))
}

/// Get all available model definitions.
///
/// The first entry is the preferred default.
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gemini-2.0-flash",
            provider: Provider::Gemini,
            description: "Gemini 2.0 Flash (fast, long context)",
            context_window: 1_048_576,
            factory: |key, gw| gemini(GeminiModel::Flash20, key, gw),
        },
        ModelDef {
            id: "gemini-2.5-flash",
            provider: Provider::Gemini,
            description: "Gemini 2.5 Flash (balanced)",
            context_window: 1_048_576,
            factory: |key, gw| gemini(GeminiModel::Flash25, key, gw),
        },
        ModelDef {
            id: "gemini-2.5-pro",
            provider: Provider::Gemini,
            description: "Gemini 2.5 Pro (most capable Gemini)",
            context_window: 1_048_576,
            factory: |key, gw| gemini(GeminiModel::Pro25, key, gw),
        },
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced performance)",
            context_window: 200_000,
            factory: |key, gw| anthropic(AnthropicModel::Sonnet45, key, gw),
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, efficient)",
            context_window: 200_000,
            factory: |key, gw| anthropic(AnthropicModel::Haiku45, key, gw),
        },
    ]
}
