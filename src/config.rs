//! Environment-driven configuration
//!
//! Everything is read once at startup and passed down explicitly.

use crate::state_machine::Limits;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid value: {value:?}")]
    Malformed { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sampling settings shared by every participant request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on one collaborator call
    pub step_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1500,
            step_timeout: Duration::from_secs(300),
        }
    }
}

/// Model ids per role; `None` means the registry default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleModels {
    pub student: Option<String>,
    pub teacher: Option<String>,
    pub observer: Option<String>,
}

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub limits: Limits,
    /// Questions requested in the opening batch
    pub first_batch_size: usize,
    /// Questions requested in each follow-up batch
    pub follow_up_batch_size: usize,
    pub models: RoleModels,
    pub generation: GenerationSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            first_batch_size: 6,
            follow_up_batch_size: 3,
            models: RoleModels::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let observer_interval = parse_var(
            &lookup,
            "DIALECTIC_OBSERVER_INTERVAL",
            defaults.limits.observer_interval,
        )?;
        let turn_limit = parse_var(&lookup, "DIALECTIC_TURN_LIMIT", defaults.limits.turn_limit)?;
        let limits = Limits::new(observer_interval, turn_limit).map_err(ConfigError::Invalid)?;

        let step_timeout_secs = parse_var(
            &lookup,
            "DIALECTIC_STEP_TIMEOUT_SECS",
            defaults.generation.step_timeout.as_secs(),
        )?;

        let config = Self {
            limits,
            first_batch_size: parse_var(&lookup, "DIALECTIC_FIRST_BATCH", defaults.first_batch_size)?,
            follow_up_batch_size: parse_var(
                &lookup,
                "DIALECTIC_FOLLOW_UP_BATCH",
                defaults.follow_up_batch_size,
            )?,
            models: RoleModels {
                student: lookup("DIALECTIC_STUDENT_MODEL"),
                teacher: lookup("DIALECTIC_TEACHER_MODEL"),
                observer: lookup("DIALECTIC_OBSERVER_MODEL"),
            },
            generation: GenerationSettings {
                temperature: parse_var(
                    &lookup,
                    "DIALECTIC_TEMPERATURE",
                    defaults.generation.temperature,
                )?,
                max_tokens: parse_var(&lookup, "DIALECTIC_MAX_TOKENS", defaults.generation.max_tokens)?,
                step_timeout: Duration::from_secs(step_timeout_secs),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_batch_size == 0 || self.follow_up_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "question batch sizes must be at least 1".to_string(),
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid("max tokens must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} outside 0.0..=2.0",
                self.generation.temperature
            )));
        }
        if self.generation.step_timeout.is_zero() {
            return Err(ConfigError::Invalid("step timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("DIALECTIC_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".dialectic").join("dialectic.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            db_path,
            port: parse_var(&lookup, "DIALECTIC_PORT", 8000)?,
            cors_origin: lookup("DIALECTIC_CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Malformed { name, value }),
        None => Ok(default),
    }
}
