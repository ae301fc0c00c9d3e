//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use crate::checkpoint::Checkpoint;
use crate::config::OrchestratorConfig;
use crate::db::{Database, DbError, RunRecord, RunStatus};
use crate::document::DocumentError;
use crate::llm::ModelRegistry;
use crate::participant::Cast;
use crate::state_machine::StepFailure;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of document text
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Resolve a source reference to its plain text
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError>;
}

/// Write-once checkpoint sequence of each run
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint; a duplicate `(run_id, sequence)` is an error
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), String>;

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, String>;

    async fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, String>;
}

/// Registry of runs and their lifecycle status
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run_id: &str, source_ref: &str) -> Result<RunRecord, String>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, String>;

    async fn list_runs(&self) -> Result<Vec<RunRecord>, String>;

    async fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), String>;
}

/// Builds the participants of a run once its document is known
pub trait CastFactory: Send + Sync {
    fn assemble(&self, document_text: &str) -> Result<Cast, StepFailure>;
}

/// Combined storage trait for convenience
pub trait Storage: CheckpointStore + RunStore {}
impl<T: CheckpointStore + RunStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: DocumentSource + ?Sized> DocumentSource for Arc<T> {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError> {
        (**self).fetch_text(reference).await
    }
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), String> {
        (**self).save_checkpoint(checkpoint).await
    }

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, String> {
        (**self).list_checkpoints(run_id).await
    }

    async fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, String> {
        (**self).latest_checkpoint(run_id).await
    }
}

#[async_trait]
impl<T: RunStore + ?Sized> RunStore for Arc<T> {
    async fn create_run(&self, run_id: &str, source_ref: &str) -> Result<RunRecord, String> {
        (**self).create_run(run_id, source_ref).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, String> {
        (**self).get_run(run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, String> {
        (**self).list_runs().await
    }

    async fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), String> {
        (**self).set_status(run_id, status, error).await
    }
}

impl<T: CastFactory + ?Sized> CastFactory for Arc<T> {
    fn assemble(&self, document_text: &str) -> Result<Cast, StepFailure> {
        (**self).assemble(document_text)
    }
}

// ============================================================================
// Production implementations
// ============================================================================

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for DatabaseStorage {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), String> {
        self.db
            .insert_checkpoint(checkpoint)
            .map_err(|e| e.to_string())
    }

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, String> {
        self.db.list_checkpoints(run_id).map_err(|e| e.to_string())
    }

    async fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, String> {
        self.db.latest_checkpoint(run_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RunStore for DatabaseStorage {
    async fn create_run(&self, run_id: &str, source_ref: &str) -> Result<RunRecord, String> {
        self.db
            .create_run(run_id, source_ref)
            .map_err(|e| e.to_string())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, String> {
        match self.db.get_run(run_id) {
            Ok(run) => Ok(Some(run)),
            Err(DbError::RunNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, String> {
        self.db.list_runs().map_err(|e| e.to_string())
    }

    async fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), String> {
        self.db
            .update_run_status(run_id, status, error)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to bind participants from the model registry
pub struct RegistryCastFactory {
    registry: Arc<ModelRegistry>,
    config: OrchestratorConfig,
}

impl RegistryCastFactory {
    pub fn new(registry: Arc<ModelRegistry>, config: OrchestratorConfig) -> Self {
        Self { registry, config }
    }
}

impl CastFactory for RegistryCastFactory {
    fn assemble(&self, document_text: &str) -> Result<Cast, StepFailure> {
        Cast::assemble(&self.registry, &self.config, document_text)
    }
}
