//! HTTP server binary for the IdeaBlock auto-distillation service: env
//! loading via `dotenvy`, `tracing_subscriber` init from `RUST_LOG`, and
//! a graceful shutdown on SIGINT/SIGTERM.

use anyhow::Result;
use dotenvy::dotenv;
use embed::{EmbeddingClient, MockEmbeddingClient, OpenAiEmbeddingClient};
use llm::{LlmBackend, MockLlmBackend};
use server::{create_router, AppState};
use std::env;
use std::sync::Arc;
use store::{build_embedding_cache, DistillConfig, JobManager};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info,engine=debug".to_string()))
        .init();

    let config = DistillConfig::from_env();
    info!(host = %config.host, port = config.port, "starting distillation server");

    let embedding_client = build_embedding_client(&config);
    let merge_backend = build_merge_backend(&config);
    let embedding_cache = build_embedding_cache(&config).await;

    let manager = Arc::new(JobManager::new(
        config.clone(),
        embedding_client,
        merge_backend,
        embedding_cache,
    ));

    let resumed = manager.resume_from_checkpoints().await;
    if resumed > 0 {
        info!(resumed, "resumed in-progress jobs from checkpoint");
    }

    let state = AppState {
        manager,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "distillation server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Builds the real OpenAI-backed embedding client, falling back to a
/// deterministic mock if `OPENAI_API_KEY` isn't configured — useful for
/// local development and tests, never for a production deployment
/// (which must set the key).
fn build_embedding_client(_config: &DistillConfig) -> Arc<dyn EmbeddingClient> {
    match OpenAiEmbeddingClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "embedding provider not configured, using mock client");
            Arc::new(MockEmbeddingClient::new(1536))
        }
    }
}

/// Builds the real Anthropic-backed merge client, falling back to a
/// pass-through mock if `ANTHROPIC_API_KEY` isn't configured, mirroring
/// `build_embedding_client`'s development fallback.
fn build_merge_backend(_config: &DistillConfig) -> Arc<dyn LlmBackend> {
    match llm::AnthropicMergeClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "merge provider not configured, using mock backend");
            Arc::new(MockLlmBackend::new(String::new()))
        }
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            warn!("received SIGINT, shutting down");
        }
        () = terminate => {
            warn!("received SIGTERM, shutting down");
        }
    }
}
