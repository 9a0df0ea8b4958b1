//! HTTP server for intelicadd

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use intelicad_common::{HttpLlmClient, LlmClient, LlmGateway};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::jobs::JobService;
use crate::pipeline::Pipeline;
use crate::routes;
use crate::safety::SafetyFilter;
use crate::store::InMemoryJobStore;

/// Application state shared across handlers
pub struct AppState {
    pub jobs: JobService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(jobs: JobService) -> Self {
        Self {
            jobs,
            start_time: Instant::now(),
        }
    }

    /// Wire an in-memory job service around `client`.
    pub fn from_config(config: &Config, client: Arc<dyn LlmClient>) -> Self {
        let pipeline = Pipeline::new(LlmGateway::new(client), config.pipeline.clone());
        let jobs = JobService::new(
            Arc::new(InMemoryJobStore::new()),
            pipeline,
            SafetyFilter::new(config.safety.effective_rules()),
            ArtifactStore::new(&config.storage.dir),
        );
        Self::new(jobs)
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::job_routes())
        .merge(routes::executor_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Serve on an already bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, max_upload_bytes: usize) -> Result<()> {
    let app = router(state, max_upload_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gracefully");
        })
        .await?;
    Ok(())
}

/// Run the HTTP server
pub async fn run(config: Config) -> Result<()> {
    let client = HttpLlmClient::new(config.llm.clone()).context("Failed to build LLM client")?;
    info!(
        "  LLM endpoint {} (model {})",
        config.llm.endpoint, config.llm.model
    );
    if config.llm.api_key.is_none() && !config.llm.is_ollama() {
        tracing::warn!(
            "  No API key configured; set {} for hosted endpoints",
            intelicad_common::llm_client::API_KEY_ENV
        );
    }

    let state = Arc::new(AppState::from_config(&config, Arc::new(client)));
    info!("  Artifacts under {}", config.storage.dir.display());

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("  Listening on http://{}", config.server.bind);

    serve(listener, state, config.server.max_upload_bytes).await
}
