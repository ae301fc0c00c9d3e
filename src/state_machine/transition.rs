//! Pure state transition function
//!
//! Given the current phase, state and an event, produce the next phase, the
//! next state and the effects the executor must run. No I/O happens here.

use super::effect::RunOutcome;
use super::event::{FailureKind, StepFailure};
use super::router::next_phase;
use super::state::{ConversationState, Participant, Phase, RunContext, StepDelta};
use super::{Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: Phase,
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: Phase, state: ConversationState) -> Self {
        Self {
            new_phase: phase,
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Run already finished")]
    AlreadyTerminal,
    #[error("Step reported by {reported} while {phase} was expected")]
    WrongParticipant {
        phase: Phase,
        reported: Participant,
    },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    phase: Phase,
    state: &ConversationState,
    context: &RunContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if phase.is_terminal() {
        return Err(TransitionError::AlreadyTerminal);
    }

    match (phase, event) {
        // ============================================================
        // Setup
        // ============================================================

        (Phase::Init, Event::DocumentLoaded { document_text }) => {
            let mut new_state = state.clone();
            new_state
                .set_document(document_text)
                .map_err(TransitionError::InvalidTransition)?;
            let new_phase = next_phase(Phase::Init, &new_state, context.limits);
            let result = TransitionResult::new(new_phase, new_state)
                .with_effect(Effect::checkpoint(Phase::Init));
            Ok(match new_phase.participant() {
                Some(next) => result.with_effect(Effect::invoke(next)),
                None => result.with_effect(Effect::completed()),
            })
        }

        (Phase::Init, Event::SetupFailed { message }) => {
            Ok(fail(Phase::Init, state, StepFailure::setup(message)))
        }

        // ============================================================
        // Participant Steps
        // ============================================================

        (_, Event::StepSucceeded { participant, delta }) => {
            check_participant(phase, participant)?;
            if let Err(violation) = check_delta_shape(participant, &delta) {
                return Ok(fail(phase, state, StepFailure::generation(violation)));
            }
            Ok(commit_step(phase, state, context, participant, delta))
        }

        (_, Event::StepFailed { participant, failure }) => {
            check_participant(phase, participant)?;
            if failure.kind == FailureKind::Cancelled {
                return Ok(cancel(state));
            }
            Ok(fail(phase, state, failure))
        }

        // ============================================================
        // Cancellation
        // ============================================================

        (_, Event::Cancelled) => Ok(cancel(state)),

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{} in phase {phase}",
            event.kind()
        ))),
    }
}

fn check_participant(phase: Phase, reported: Participant) -> Result<(), TransitionError> {
    if phase.participant() == Some(reported) {
        Ok(())
    } else {
        Err(TransitionError::WrongParticipant { phase, reported })
    }
}

/// Each role contributes a fixed set of fields
fn check_delta_shape(participant: Participant, delta: &StepDelta) -> Result<(), String> {
    match participant {
        Participant::Student if delta.question_batch.is_none() => {
            Err("student step produced no question batch".to_string())
        }
        Participant::Student | Participant::Teacher if delta.insight.is_some() => {
            Err(format!("{participant} step produced an insight"))
        }
        Participant::Teacher | Participant::Observer if delta.question_batch.is_some() => {
            Err(format!("{participant} step produced a question batch"))
        }
        Participant::Observer if delta.insight.is_none() => {
            Err("observer step produced no insight".to_string())
        }
        _ => Ok(()),
    }
}

fn commit_step(
    phase: Phase,
    state: &ConversationState,
    context: &RunContext,
    participant: Participant,
    delta: StepDelta,
) -> TransitionResult {
    let content = delta.content.clone();
    let mut new_state = state.clone();
    new_state.fold(participant, delta);

    let new_phase = next_phase(phase, &new_state, context.limits);
    let result = TransitionResult::new(new_phase, new_state)
        .with_effect(Effect::checkpoint(phase))
        .with_effect(Effect::fragment(participant, content));

    match new_phase.participant() {
        Some(next) => result.with_effect(Effect::invoke(next)),
        None => result.with_effect(Effect::completed()),
    }
}

fn fail(phase: Phase, state: &ConversationState, failure: StepFailure) -> TransitionResult {
    let message = failure.to_string();
    let mut new_state = state.clone();
    new_state.record_error(message.clone());

    TransitionResult::new(Phase::Terminal, new_state).with_effects([
        Effect::checkpoint(phase),
        Effect::NotifyError {
            message: message.clone(),
        },
        Effect::failed(message),
    ])
}

fn cancel(state: &ConversationState) -> TransitionResult {
    TransitionResult::new(Phase::Terminal, state.clone()).with_effect(Effect::Finish {
        outcome: RunOutcome::Cancelled,
    })
}
