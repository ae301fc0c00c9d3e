//! Effects produced by state transitions

use super::state::{Participant, Phase};
use serde::{Deserialize, Serialize};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { message: String },
    Cancelled,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// Failure message, for failed runs
    pub fn error(&self) -> Option<&str> {
        match self {
            RunOutcome::Failed { message } => Some(message),
            RunOutcome::Completed | RunOutcome::Cancelled => None,
        }
    }
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the document and assemble the participants
    LoadDocument,

    /// Run one participant step against the current state
    InvokeParticipant(Participant),

    /// Persist a sanitized snapshot of the new state
    PersistCheckpoint { produced_by: Phase },

    /// Stream the content of a committed step
    EmitFragment {
        participant: Participant,
        content: String,
    },

    /// Tell streaming consumers the run failed
    NotifyError { message: String },

    /// The run reached Terminal
    Finish { outcome: RunOutcome },
}

impl Effect {
    pub fn invoke(participant: Participant) -> Self {
        Effect::InvokeParticipant(participant)
    }

    pub fn checkpoint(produced_by: Phase) -> Self {
        Effect::PersistCheckpoint { produced_by }
    }

    pub fn fragment(participant: Participant, content: impl Into<String>) -> Self {
        Effect::EmitFragment {
            participant,
            content: content.into(),
        }
    }

    pub fn completed() -> Self {
        Effect::Finish {
            outcome: RunOutcome::Completed,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Effect::Finish {
            outcome: RunOutcome::Failed {
                message: message.into(),
            },
        }
    }
}
