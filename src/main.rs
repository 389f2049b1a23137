//! Assistant Chat - web chat over hosted OpenAI assistants
//!
//! Serves a single-page UI where users pick a knowledge database, ask
//! questions and watch the assistant's cited reply stream in.

mod api;
mod assistant;
mod auth;
mod chat;
mod config;
mod session;
mod transcript;

use api::{create_router, AppState};
use assistant::AssistantRegistry;
use config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        databases = ?config.database_names(),
        require_password = config.app.require_password,
        streaming = ?config.app.streaming,
        "Configuration loaded"
    );

    // Assistant clients, one per configured database
    let assistants = Arc::new(AssistantRegistry::new(&config));
    if assistants.configured().is_empty() {
        tracing::warn!("No assistant credentials configured. Chats will fail until secrets are set.");
    } else {
        tracing::info!(configured = ?assistants.configured(), "Assistant registry initialized");
    }

    let port = config.port;
    let session_idle = config.app.session_idle();
    let state = AppState::new(config, assistants);
    state.sessions.spawn_sweeper(session_idle);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Assistant chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
