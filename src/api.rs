//! HTTP API for dialectic
//!
//! Batch and streaming runs, run inspection and resume.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::llm::ModelRegistry;
use crate::runtime::RunManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RunManager>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(runs: RunManager, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            runs: Arc::new(runs),
            llm_registry,
        }
    }
}
