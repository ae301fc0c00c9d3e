//! Run recovery logic
//!
//! Decides how an unfinished run continues from its latest checkpoint.

use crate::checkpoint::{self, Checkpoint};
use crate::db::{RunRecord, RunStatus};
use crate::state_machine::{ConversationState, Phase, RunOutcome};

/// What resuming a run should do
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// The run already ended; nothing to do
    AlreadyFinished(RunStatus),
    /// No checkpoint was written; start again from Init
    Restart,
    /// Re-enter `phase` with the checkpointed state
    Continue {
        phase: Phase,
        state: ConversationState,
        next_sequence: u32,
    },
    /// The last checkpoint is terminal but the run record never caught up
    Finalize {
        state: ConversationState,
        outcome: RunOutcome,
    },
    /// The latest checkpoint cannot be restored
    Corrupt(String),
}

/// Analyze a run and its latest checkpoint to decide how to resume it.
pub fn plan_resume(run: &RunRecord, latest: Option<Checkpoint>) -> RecoveryDecision {
    if run.status.is_terminal() {
        return RecoveryDecision::AlreadyFinished(run.status);
    }

    let Some(latest) = latest else {
        return RecoveryDecision::Restart;
    };

    let state = match checkpoint::restore(latest.snapshot) {
        Ok(state) => state,
        Err(e) => {
            return RecoveryDecision::Corrupt(format!(
                "checkpoint {} of run {}: {e}",
                latest.sequence, run.id
            ))
        }
    };

    if latest.next_phase.is_terminal() {
        let outcome = match state.error() {
            Some(message) => RunOutcome::Failed {
                message: message.to_string(),
            },
            None => RunOutcome::Completed,
        };
        return RecoveryDecision::Finalize { state, outcome };
    }

    // Init is never re-entered once its checkpoint exists
    if latest.next_phase == Phase::Init {
        return RecoveryDecision::Corrupt(format!(
            "checkpoint {} of run {} routes back to init",
            latest.sequence, run.id
        ));
    }

    RecoveryDecision::Continue {
        phase: latest.next_phase,
        state,
        next_sequence: latest.sequence + 1,
    }
}
