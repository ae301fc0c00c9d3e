//! Events that drive a run forward

use super::state::{Participant, StepDelta};
use std::fmt;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Init events
    DocumentLoaded {
        document_text: String,
    },
    SetupFailed {
        message: String,
    },

    // Participant events
    StepSucceeded {
        participant: Participant,
        delta: StepDelta,
    },
    StepFailed {
        participant: Participant,
        failure: StepFailure,
    },

    // Control events
    Cancelled,
}

impl Event {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DocumentLoaded { .. } => "document_loaded",
            Event::SetupFailed { .. } => "setup_failed",
            Event::StepSucceeded { .. } => "step_succeeded",
            Event::StepFailed { .. } => "step_failed",
            Event::Cancelled => "cancelled",
        }
    }
}

/// Classification of a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Document or collaborators could not be prepared
    Setup,
    /// Collaborator call failed, timed out, or a precondition was unmet
    Generation,
    /// Collaborator answered but the output did not match the expected shape
    Parse,
    /// The run was cancelled while the step was in flight
    Cancelled,
}

/// Error a participant step reports instead of a delta
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn setup(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Setup,
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Generation,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Parse,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "Run cancelled".to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            FailureKind::Setup => "setup failed",
            FailureKind::Generation => "generation failed",
            FailureKind::Parse => "unparseable output",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{label}: {}", self.message)
    }
}
