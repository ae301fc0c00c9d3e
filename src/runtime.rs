//! Runtime for executing runs
//!
//! `RunManager` owns the shared collaborators, registers each run, and
//! drives it on its own task so callers going away never leave a run
//! half-finished in storage.

mod executor;
mod recovery;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Orchestrator, RunReport};
pub use recovery::{plan_resume, RecoveryDecision};
pub use traits::*;

use crate::checkpoint::Checkpoint;
use crate::db::{RunRecord, RunStatus};
use crate::state_machine::{Limits, Participant, Phase, RunContext};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Fragments buffered ahead of a slow stream consumer
const STREAM_BUFFER: usize = 32;

/// Type alias for the orchestrator driven by `RunManager`
pub type SharedOrchestrator =
    Orchestrator<Arc<dyn Storage>, Arc<dyn DocumentSource>, Arc<dyn CastFactory>>;

/// Items delivered to a streaming consumer, in step order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Content of one committed step
    Fragment {
        participant: Participant,
        content: String,
    },
    /// The run failed; no further fragments follow
    Failed { message: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run not found: {0}")]
    NotFound(String),
    #[error("Run {run_id} already finished as {status}")]
    AlreadyFinished { run_id: String, status: RunStatus },
    #[error("Run {0} is already in progress")]
    Busy(String),
    #[error("Run cannot be resumed: {0}")]
    Corrupt(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Run task failed: {0}")]
    Task(String),
}

/// Manager for all runs of this process
pub struct RunManager {
    storage: Arc<dyn Storage>,
    documents: Arc<dyn DocumentSource>,
    cast_factory: Arc<dyn CastFactory>,
    limits: Limits,
    /// Cancellation handles of runs currently being driven
    active: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl RunManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        documents: Arc<dyn DocumentSource>,
        cast_factory: Arc<dyn CastFactory>,
        limits: Limits,
    ) -> Self {
        Self {
            storage,
            documents,
            cast_factory,
            limits,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run to completion and return the final state
    pub async fn run_batch(&self, source_ref: &str) -> Result<RunReport, RunError> {
        let (run_id, orchestrator) = self.start(source_ref).await?;
        self.launch(run_id, orchestrator)
            .await?
            .await
            .map_err(|e| RunError::Task(e.to_string()))
    }

    /// Start a run whose committed steps are delivered on the returned channel.
    /// Dropping the receiver cancels the run.
    pub async fn run_streaming(
        &self,
        source_ref: &str,
    ) -> Result<(String, mpsc::Receiver<StreamItem>), RunError> {
        let (run_id, orchestrator) = self.start(source_ref).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        // Completion is observed through the channel closing
        drop(
            self.launch(run_id.clone(), orchestrator.with_stream(tx))
                .await?,
        );
        Ok((run_id, rx))
    }

    /// Continue an interrupted run from its latest checkpoint
    pub async fn resume(&self, run_id: &str) -> Result<RunReport, RunError> {
        if self.active.read().await.contains_key(run_id) {
            return Err(RunError::Busy(run_id.to_string()));
        }
        let run = self.get_run(run_id).await?;
        let latest = self
            .storage
            .latest_checkpoint(run_id)
            .await
            .map_err(RunError::Storage)?;

        let orchestrator = match plan_resume(&run, latest) {
            RecoveryDecision::AlreadyFinished(status) => {
                return Err(RunError::AlreadyFinished {
                    run_id: run_id.to_string(),
                    status,
                })
            }
            RecoveryDecision::Corrupt(message) => return Err(RunError::Corrupt(message)),
            RecoveryDecision::Finalize { state, outcome } => {
                let status = RunStatus::from(&outcome);
                self.storage
                    .set_status(run_id, status, outcome.error())
                    .await
                    .map_err(RunError::Storage)?;
                tracing::info!(run_id = %run_id, status = %status, "Finalized run from terminal checkpoint");
                return Ok(RunReport {
                    run_id: run_id.to_string(),
                    phase: Phase::Terminal,
                    outcome,
                    state,
                });
            }
            RecoveryDecision::Restart => self.orchestrator(run_id, &run.source_ref),
            RecoveryDecision::Continue {
                phase,
                state,
                next_sequence,
            } => self
                .orchestrator(run_id, &run.source_ref)
                .resume_at(phase, state, next_sequence),
        };

        self.storage
            .set_status(run_id, RunStatus::Running, None)
            .await
            .map_err(RunError::Storage)?;
        tracing::info!(run_id = %run_id, previous = %run.status, "Resuming run");
        self.launch(run_id.to_string(), orchestrator)
            .await?
            .await
            .map_err(|e| RunError::Task(e.to_string()))
    }

    /// Request cancellation of an in-progress run
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.active.read().await.get(run_id) {
            Some(token) => {
                tracing::info!(run_id = %run_id, "Cancelling run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn list_runs(&self) -> Result<Vec<RunRecord>, RunError> {
        self.storage.list_runs().await.map_err(RunError::Storage)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, RunError> {
        self.storage
            .get_run(run_id)
            .await
            .map_err(RunError::Storage)?
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))
    }

    pub async fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, RunError> {
        self.storage
            .latest_checkpoint(run_id)
            .await
            .map_err(RunError::Storage)
    }

    pub async fn checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, RunError> {
        self.get_run(run_id).await?;
        self.storage
            .list_checkpoints(run_id)
            .await
            .map_err(RunError::Storage)
    }

    async fn start(&self, source_ref: &str) -> Result<(String, SharedOrchestrator), RunError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.storage
            .create_run(&run_id, source_ref)
            .await
            .map_err(RunError::Storage)?;
        let orchestrator = self.orchestrator(&run_id, source_ref);
        Ok((run_id, orchestrator))
    }

    fn orchestrator(&self, run_id: &str, source_ref: &str) -> SharedOrchestrator {
        Orchestrator::new(
            RunContext::new(run_id, self.limits),
            source_ref,
            self.storage.clone(),
            self.documents.clone(),
            self.cast_factory.clone(),
        )
    }

    /// Register the run and drive it on its own task
    async fn launch(
        &self,
        run_id: String,
        orchestrator: SharedOrchestrator,
    ) -> Result<tokio::task::JoinHandle<RunReport>, RunError> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.write().await;
            if active.contains_key(&run_id) {
                return Err(RunError::Busy(run_id));
            }
            active.insert(run_id.clone(), cancel.clone());
        }

        let orchestrator = orchestrator.with_cancel(cancel);
        let active = self.active.clone();
        Ok(tokio::spawn(async move {
            let report = orchestrator.run().await;
            active.write().await.remove(&run_id);
            report
        }))
    }
}
