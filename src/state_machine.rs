//! Turn orchestration state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.
//! The executor in `runtime` performs the effects and feeds the resulting
//! events back in.

mod effect;
pub mod event;
pub mod router;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, RunOutcome};
pub use event::{Event, FailureKind, StepFailure};
pub use router::{next_phase, Limits};
pub use state::{
    ConversationState, Message, MessageMeta, Participant, Phase, QuestionBatch, RunContext,
    StepDelta, StructuredQuestion,
};
pub use transition::transition;
