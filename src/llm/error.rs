//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// A failed completion, classified by where it went wrong
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Provider-suggested wait before another request
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Provider, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Malformed, message)
    }

    /// Classify a non-success HTTP status from either provider
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::rate_limit(format!("Rate limit exceeded: {body}")),
            500..=599 => Self::provider(format!("Provider error {status}: {body}")),
            400..=499 => Self::new(
                LlmErrorKind::Rejected,
                format!("Request rejected ({status}): {body}"),
            ),
            _ => Self::malformed(format!("Unexpected HTTP {status}: {body}")),
        }
    }
}

/// Participants never retry, so the kind only feeds logs and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection failures and timeouts
    Transport,
    /// 429
    RateLimit,
    /// 5xx
    Provider,
    /// Other 4xx, including bad credentials
    Rejected,
    /// A body that could not be understood
    Malformed,
}

impl LlmErrorKind {
    /// Whether the same request could succeed later
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transport | Self::RateLimit | Self::Provider)
    }
}
