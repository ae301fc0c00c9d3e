//! Run executor
//!
//! Drives one run: feeds events through the pure transition function and
//! performs the effects it returns until the run reaches Terminal.

use super::traits::{CastFactory, DocumentSource, Storage};
use super::StreamItem;

use crate::checkpoint::{capture, Checkpoint};
use crate::db::RunStatus;
use crate::participant::Cast;
use crate::state_machine::{
    transition, ConversationState, Effect, Event, Participant, Phase, RunContext, RunOutcome,
    StepFailure,
};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Final result of driving a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub phase: Phase,
    pub outcome: RunOutcome,
    pub state: ConversationState,
}

/// Generic run executor that can work with any storage, document and cast implementations
pub struct Orchestrator<S, D, F>
where
    S: Storage,
    D: DocumentSource,
    F: CastFactory,
{
    context: RunContext,
    source_ref: String,
    phase: Phase,
    state: ConversationState,
    /// Sequence number of the next checkpoint
    next_sequence: u32,
    storage: S,
    documents: D,
    cast_factory: F,
    /// Bound once the document text is known
    cast: Option<Cast>,
    stream: Option<mpsc::Sender<StreamItem>>,
    cancel: CancellationToken,
    outcome: Option<RunOutcome>,
}

impl<S, D, F> Orchestrator<S, D, F>
where
    S: Storage,
    D: DocumentSource,
    F: CastFactory,
{
    pub fn new(
        context: RunContext,
        source_ref: impl Into<String>,
        storage: S,
        documents: D,
        cast_factory: F,
    ) -> Self {
        Self {
            context,
            source_ref: source_ref.into(),
            phase: Phase::Init,
            state: ConversationState::new(),
            next_sequence: 0,
            storage,
            documents,
            cast_factory,
            cast: None,
            stream: None,
            cancel: CancellationToken::new(),
            outcome: None,
        }
    }

    /// Continue from a checkpointed phase instead of Init
    pub fn resume_at(mut self, phase: Phase, state: ConversationState, next_sequence: u32) -> Self {
        self.phase = phase;
        self.state = state;
        self.next_sequence = next_sequence;
        self
    }

    /// Send one fragment per committed step to `tx`
    pub fn with_stream(mut self, tx: mpsc::Sender<StreamItem>) -> Self {
        self.stream = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive the run to Terminal
    pub async fn run(mut self) -> RunReport {
        let start = Instant::now();
        tracing::info!(
            run_id = %self.context.run_id,
            phase = %self.phase,
            source_ref = %self.source_ref,
            "Starting run"
        );

        let first = match (self.phase, self.phase.participant()) {
            (Phase::Init, _) => Some(Effect::LoadDocument),
            (_, Some(participant)) => Some(Effect::invoke(participant)),
            (_, None) => None,
        };
        if let Some(effect) = first {
            if let Err(e) = self.drive(effect).await {
                self.abort(&e).await;
            }
        }

        let outcome = self.outcome.take().unwrap_or_else(|| RunOutcome::Failed {
            message: "run stopped before reaching a terminal phase".to_string(),
        });
        tracing::info!(
            run_id = %self.context.run_id,
            outcome = ?outcome,
            turns = self.state.turn_count(),
            duration_ms = %start.elapsed().as_millis(),
            "Run finished"
        );

        RunReport {
            run_id: self.context.run_id,
            phase: self.phase,
            outcome,
            state: self.state,
        }
    }

    async fn drive(&mut self, first: Effect) -> Result<(), String> {
        let step_bound = self.context.limits.step_bound();
        let mut events_to_process = Vec::new();
        if let Some(event) = self.execute_effect(first).await? {
            events_to_process.push(event);
        }

        while let Some(current_event) = events_to_process.pop() {
            if self.state.turn_count() > step_bound {
                return Err(format!(
                    "run exceeded {step_bound} steps without reaching a terminal phase"
                ));
            }
            let kind = current_event.kind();
            let result = transition(self.phase, &self.state, &self.context, current_event)
                .map_err(|e| format!("{kind} rejected: {e}"))?;

            let old_phase = std::mem::replace(&mut self.phase, result.new_phase);
            self.state = result.new_state;
            tracing::debug!(
                run_id = %self.context.run_id,
                event = kind,
                from = %old_phase,
                to = %self.phase,
                turn = self.state.turn_count(),
                "Transition"
            );

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Errors returned here are storage or protocol failures that end the run
    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, String> {
        match effect {
            Effect::LoadDocument => Ok(Some(self.load_document().await)),

            Effect::InvokeParticipant(participant) => Ok(Some(self.invoke(participant).await)),

            Effect::PersistCheckpoint { produced_by } => {
                let checkpoint = Checkpoint {
                    run_id: self.context.run_id.clone(),
                    sequence: self.next_sequence,
                    produced_by,
                    next_phase: self.phase,
                    snapshot: capture(&self.state),
                    created_at: chrono::Utc::now(),
                };
                self.storage.save_checkpoint(&checkpoint).await?;
                self.next_sequence += 1;
                tracing::debug!(
                    run_id = %self.context.run_id,
                    sequence = checkpoint.sequence,
                    produced_by = %produced_by,
                    "Checkpoint saved"
                );
                Ok(None)
            }

            Effect::EmitFragment {
                participant,
                content,
            } => {
                self.emit(StreamItem::Fragment {
                    participant,
                    content,
                })
                .await;
                Ok(None)
            }

            Effect::NotifyError { message } => {
                tracing::warn!(run_id = %self.context.run_id, error = %message, "Run failed");
                self.emit(StreamItem::Failed { message }).await;
                Ok(None)
            }

            Effect::Finish { outcome } => {
                self.storage
                    .set_status(&self.context.run_id, (&outcome).into(), outcome.error())
                    .await?;
                self.outcome = Some(outcome);
                Ok(None)
            }
        }
    }

    async fn load_document(&mut self) -> Event {
        let fetched = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return Event::Cancelled,

            result = self.documents.fetch_text(&self.source_ref) => result,
        };

        let document_text = match fetched {
            Ok(text) => text,
            Err(e) => {
                return Event::SetupFailed {
                    message: e.to_string(),
                }
            }
        };

        match self.cast_factory.assemble(&document_text) {
            Ok(cast) => {
                self.cast = Some(cast);
                Event::DocumentLoaded { document_text }
            }
            Err(failure) => Event::SetupFailed {
                message: failure.message,
            },
        }
    }

    async fn invoke(&mut self, participant: Participant) -> Event {
        if self.cast.is_none() {
            // Resumed runs bind their participants on the first step
            let Some(document_text) = self.state.document_text() else {
                return Event::StepFailed {
                    participant,
                    failure: StepFailure::setup("no document loaded"),
                };
            };
            match self.cast_factory.assemble(document_text) {
                Ok(cast) => self.cast = Some(cast),
                Err(failure) => return Event::StepFailed { participant, failure },
            }
        }
        let Some(cast) = &self.cast else {
            return Event::StepFailed {
                participant,
                failure: StepFailure::setup("participants are not bound"),
            };
        };
        let agent = cast.agent(participant).clone();

        let start = Instant::now();
        tracing::info!(
            run_id = %self.context.run_id,
            participant = %participant,
            turn = self.state.turn_count() + 1,
            "Invoking participant"
        );

        let result = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                tracing::info!(run_id = %self.context.run_id, participant = %participant, "Step cancelled");
                return Event::StepFailed {
                    participant,
                    failure: StepFailure::cancelled(),
                };
            }

            result = agent.respond(&self.state) => result,
        };

        match result {
            Ok(delta) => {
                tracing::info!(
                    run_id = %self.context.run_id,
                    participant = %participant,
                    duration_ms = %start.elapsed().as_millis(),
                    "Step succeeded"
                );
                Event::StepSucceeded { participant, delta }
            }
            Err(failure) => Event::StepFailed { participant, failure },
        }
    }

    /// A closed stream means the consumer went away; the run is cancelled
    async fn emit(&self, item: StreamItem) {
        let Some(tx) = &self.stream else {
            return;
        };
        if tx.send(item).await.is_err() && !self.cancel.is_cancelled() {
            tracing::info!(run_id = %self.context.run_id, "Stream consumer disconnected, cancelling run");
            self.cancel.cancel();
        }
    }

    /// End the run after a storage or protocol failure
    async fn abort(&mut self, message: &str) {
        tracing::error!(run_id = %self.context.run_id, error = %message, "Run aborted");
        self.phase = Phase::Terminal;
        self.emit(StreamItem::Failed {
            message: message.to_string(),
        })
        .await;
        if let Err(e) = self
            .storage
            .set_status(&self.context.run_id, RunStatus::Failed, Some(message))
            .await
        {
            tracing::error!(run_id = %self.context.run_id, error = %e, "Failed to record run failure");
        }
        self.outcome = Some(RunOutcome::Failed {
            message: message.to_string(),
        });
    }
}
