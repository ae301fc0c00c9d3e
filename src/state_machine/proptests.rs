//! Property-based tests for the state machine
//!
//! Drive whole runs through `transition` with arbitrary limits and failure
//! points and check the invariants that must hold for every run.

use super::effect::RunOutcome;
use super::event::StepFailure;
use super::router::{next_phase, Limits};
use super::state::*;
use super::transition::*;
use super::*;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn delta_for(participant: Participant, state: &ConversationState) -> StepDelta {
    let content = format!("{participant} at {}", state.turn_count());
    match participant {
        Participant::Student if state.turn_count() == 0 => {
            StepDelta::message(content).with_questions(QuestionBatch::Opening {
                questions: vec![StructuredQuestion {
                    title: "t".to_string(),
                    prompt: "p".to_string(),
                    category: "c".to_string(),
                }],
            })
        }
        Participant::Student => StepDelta::message(content).with_questions(
            QuestionBatch::FollowUp {
                questions: vec!["q".to_string()],
            },
        ),
        Participant::Teacher => StepDelta::message(content),
        Participant::Observer => StepDelta::message(content.clone()).with_insight(content),
    }
}

struct Trace {
    /// (participant, turn_count before the step, phase chosen after it)
    steps: Vec<(Participant, u32, Phase)>,
    state: ConversationState,
    outcome: Option<RunOutcome>,
}

/// Run to Terminal, failing the step at index `fail_at` if given
fn simulate(limits: Limits, fail_at: Option<usize>) -> Trace {
    let context = RunContext::new("prop-run", limits);
    let loaded = transition(
        Phase::Init,
        &ConversationState::new(),
        &context,
        Event::DocumentLoaded {
            document_text: "doc".to_string(),
        },
    )
    .unwrap();

    let mut phase = loaded.new_phase;
    let mut state = loaded.new_state;
    let mut steps = vec![];
    let mut outcome = None;
    // Guard against a broken router looping forever
    let cap = limits.step_bound() as usize * 4;

    while let Some(participant) = phase.participant() {
        if steps.len() > cap {
            break;
        }
        let event = if fail_at == Some(steps.len()) {
            Event::StepFailed {
                participant,
                failure: StepFailure::generation("collaborator unavailable"),
            }
        } else {
            Event::StepSucceeded {
                participant,
                delta: delta_for(participant, &state),
            }
        };
        let before = state.turn_count();
        let result = transition(phase, &state, &context, event).unwrap();
        for effect in &result.effects {
            if let Effect::Finish { outcome: o } = effect {
                outcome = Some(o.clone());
            }
        }
        steps.push((participant, before, result.new_phase));
        phase = result.new_phase;
        state = result.new_state;
    }

    Trace {
        steps,
        state,
        outcome,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_limits() -> impl Strategy<Value = Limits> {
    (1u32..8, 1u32..40).prop_map(|(k, n)| Limits::new(k, n).unwrap())
}

fn arb_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Init),
        Just(Phase::Student),
        Just(Phase::Teacher),
        Just(Phase::Observer),
        Just(Phase::Terminal),
    ]
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    (0u32..50, any::<bool>()).prop_map(|(turns, errored)| {
        let mut state = ConversationState::new();
        state.set_document("doc".to_string()).unwrap();
        for _ in 0..turns {
            state.fold(Participant::Teacher, StepDelta::message("x"));
        }
        if errored {
            state.record_error("failed".to_string());
        }
        state
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_terminates_within_bound(limits in arb_limits()) {
        let trace = simulate(limits, None);
        prop_assert!(
            trace.steps.len() <= limits.step_bound() as usize,
            "{} steps exceed bound {} for {:?}",
            trace.steps.len(),
            limits.step_bound(),
            limits
        );
        prop_assert_eq!(trace.outcome, Some(RunOutcome::Completed));
    }

    #[test]
    fn prop_turn_count_tracks_completed_steps(limits in arb_limits()) {
        let trace = simulate(limits, None);
        let steps = u32::try_from(trace.steps.len()).unwrap();
        prop_assert_eq!(trace.state.turn_count(), steps);
        prop_assert_eq!(trace.state.messages().len(), trace.steps.len());
        for (i, message) in trace.state.messages().iter().enumerate() {
            prop_assert_eq!(message.turn as usize, i + 1);
        }
    }

    #[test]
    fn prop_insights_match_observer_steps(limits in arb_limits()) {
        let trace = simulate(limits, None);
        let observers = trace
            .steps
            .iter()
            .filter(|(p, _, _)| *p == Participant::Observer)
            .count();
        prop_assert_eq!(trace.state.insights().len(), observers);
    }

    #[test]
    fn prop_observer_runs_only_on_cadence(limits in arb_limits()) {
        let trace = simulate(limits, None);
        for window in trace.steps.windows(2) {
            let (prev, prev_turn, chosen) = window[0];
            let (current, _, _) = window[1];
            let turn_after = prev_turn + 1;
            let on_cadence = turn_after % limits.observer_interval == 0;
            if prev != Participant::Observer {
                prop_assert_eq!(
                    current == Participant::Observer,
                    on_cadence,
                    "after {} at turn {} chose {}",
                    prev,
                    turn_after,
                    chosen
                );
            } else {
                prop_assert_ne!(current, Participant::Observer);
            }
        }
    }

    #[test]
    fn prop_error_short_circuits(limits in arb_limits(), fail_at in 0usize..20) {
        let trace = simulate(limits, Some(fail_at));
        let clean = simulate(limits, None);

        if fail_at < clean.steps.len() {
            prop_assert_eq!(trace.steps.len(), fail_at + 1);
            prop_assert!(trace.state.has_error());
            prop_assert_eq!(trace.state.turn_count() as usize, fail_at);
            prop_assert_eq!(trace.state.messages().len(), fail_at);
            let failed = matches!(trace.outcome, Some(RunOutcome::Failed { .. }));
            prop_assert!(failed);
        } else {
            prop_assert!(!trace.state.has_error());
        }
    }

    #[test]
    fn prop_router_is_idempotent(
        from in arb_phase(),
        state in arb_state(),
        limits in arb_limits(),
    ) {
        let before = state.clone();
        let first = next_phase(from, &state, limits);
        let second = next_phase(from, &state, limits);
        prop_assert_eq!(first, second);
        prop_assert_eq!(&state, &before);
        if state.has_error() {
            prop_assert_eq!(first, Phase::Terminal);
        }
    }
}
