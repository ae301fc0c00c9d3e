//! API request and response types

use crate::checkpoint::{capture, Checkpoint, StateSnapshot};
use crate::db::{RunRecord, RunStatus};
use crate::llm::ModelInfo;
use crate::runtime::RunReport;
use crate::state_machine::Participant;
use serde::{Deserialize, Serialize};

/// Request to start a batch run
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub document_source_ref: String,
}

/// Query string of a streaming run
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub document_source_ref: String,
}

/// Final record of a run
#[derive(Debug, Serialize)]
pub struct RunResultResponse {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: StateSnapshot,
}

impl From<RunReport> for RunResultResponse {
    fn from(report: RunReport) -> Self {
        Self {
            status: RunStatus::from(&report.outcome),
            error: report.outcome.error().map(str::to_string),
            state: capture(&report.state),
            run_id: report.run_id,
        }
    }
}

/// Response with a list of runs
#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
}

/// Response with a single run
#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    pub run: RunRecord,
    pub latest_checkpoint: Option<Checkpoint>,
}

/// Response with a run's checkpoint sequence
#[derive(Debug, Serialize)]
pub struct CheckpointListResponse {
    pub checkpoints: Vec<Checkpoint>,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Data of one streamed step
#[derive(Debug, Serialize)]
pub struct FragmentPayload<'a> {
    pub content: &'a str,
    pub participant: Participant,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
