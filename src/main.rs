//! dialectic - Student / Teacher / Observer study sessions over a document
//!
//! A Rust backend driving a turn-orchestration state machine in which an
//! LLM student questions a document, an LLM teacher answers, and an LLM
//! observer periodically steers both.

mod api;
mod checkpoint;
mod config;
mod db;
mod document;
mod llm;
mod participant;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use axum::http::{header, HeaderValue, Method};
use config::{OrchestratorConfig, ServerConfig};
use db::Database;
use document::HttpDocumentSource;
use llm::{LlmConfig, ModelRegistry};
use runtime::{DatabaseStorage, RegistryCastFactory, RunManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialectic=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    // Configuration
    let server_config = ServerConfig::from_env()?;
    let orchestrator_config = OrchestratorConfig::from_env()?;
    tracing::info!(
        observer_interval = orchestrator_config.limits.observer_interval,
        turn_limit = orchestrator_config.limits.turn_limit,
        first_batch = orchestrator_config.first_batch_size,
        follow_up_batch = orchestrator_config.follow_up_batch_size,
        "Orchestrator configured"
    );

    // Ensure database directory exists
    if let Some(parent) = server_config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %server_config.db_path.display(), "Opening database");
    let db = Database::open(&server_config.db_path)?;

    // Runs left running by a previous process can be resumed
    let interrupted = db.mark_interrupted_runs()?;
    if interrupted > 0 {
        tracing::warn!(count = interrupted, "Marked unfinished runs as interrupted");
    }

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!(
            "No LLM API keys configured. Set GEMINI_API_KEY, ANTHROPIC_API_KEY or LLM_GATEWAY."
        );
    }

    // Create application state
    let limits = orchestrator_config.limits;
    let runs = RunManager::new(
        Arc::new(DatabaseStorage::new(db)),
        Arc::new(HttpDocumentSource::new()?),
        Arc::new(RegistryCastFactory::new(
            llm_registry.clone(),
            orchestrator_config,
        )),
        limits,
    );
    let state = AppState::new(runs, llm_registry);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(server_config.cors_origin.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    tracing::info!("dialectic server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
