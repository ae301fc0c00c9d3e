//! Model registry for managing available LLM providers

use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Proxy that authenticates on our behalf
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            gemini_api_key: var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            gateway: var("LLM_GATEWAY"),
            default_model: var("DEFAULT_MODEL"),
        }
    }
}

/// Public description of a registered model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Registry with no models, for tests
    #[cfg(test)]
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: "test-model".to_string(),
        }
    }

    /// Registry holding exactly the given services, for tests
    #[cfg(test)]
    pub fn with_services(services: Vec<Arc<dyn LlmService>>) -> Self {
        let default_model = services
            .first()
            .map_or_else(|| "test-model".to_string(), |s| s.model_id().to_string());
        Self {
            services: services
                .into_iter()
                .map(|s| (s.model_id().to_string(), s))
                .collect(),
            default_model,
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        // Configured default, else the first available model in definition order
        let default_model = config
            .default_model
            .clone()
            .filter(|id| services.contains_key(id))
            .or_else(|| {
                all_models()
                    .iter()
                    .find(|m| services.contains_key(m.id))
                    .map(|m| m.id.to_string())
            })
            .unwrap_or_else(|| all_models()[0].id.to_string());

        if let Some(requested) = &config.default_model {
            if requested != &default_model {
                tracing::warn!(
                    requested = %requested,
                    using = %default_model,
                    "Configured default model is unavailable"
                );
            }
        }

        Self {
            services,
            default_model,
        }
    }

    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        // Gateway mode handles authentication itself
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            match model_def.provider {
                Provider::Gemini => config.gemini_api_key.as_ref()?,
                Provider::Anthropic => config.anthropic_api_key.as_ref()?,
            }
            .clone()
        };

        match (model_def.factory)(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::warn!(
                    model = model_def.id,
                    env_var = model_def.provider.api_key_env_var(),
                    error = %e,
                    "Model unavailable"
                );
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// Resolve a role's model, falling back to the default for unknown ids
    pub fn resolve(&self, model_id: Option<&str>) -> Option<Arc<dyn LlmService>> {
        match model_id {
            Some(id) => self.get(id).or_else(|| {
                tracing::warn!(
                    requested = %id,
                    fallback = %self.default_model,
                    "Unknown model, using default"
                );
                self.default()
            }),
            None => self.default(),
        }
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    pub fn available_model_info(&self) -> Vec<ModelInfo> {
        all_models()
            .iter()
            .filter(|m| self.services.contains_key(m.id))
            .map(|m| ModelInfo {
                id: m.id.to_string(),
                provider: m.provider.display_name().to_string(),
                description: m.description.to_string(),
                context_window: m.context_window,
            })
            .collect()
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}
