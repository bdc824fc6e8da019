//! Agent HTTP Server
//!
//! Axum server exposing the tool-calling agent over REST and a
//! WebSocket stream. Provider credentials come from the environment
//! (and an optional `.env` file).

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{EnvSnapshot, LlmOptions, LlmProvider};
use agent_runtime::OpenAiCompatProvider;

use crate::handlers::{chat_handler, chat_stream_handler, delete_session, health_check};
use crate::state::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // Snapshot once; nothing below reads the process environment again
    let env = EnvSnapshot::from_process();
    let config = ServerConfig::from_env(&env);

    let provider = Arc::new(OpenAiCompatProvider::new(&LlmOptions::new(), &env)?);

    match provider.health_check().await {
        Ok(true) => tracing::info!(
            provider = %provider.name(),
            model = %provider.default_model(),
            "Model endpoint reachable"
        ),
        Ok(false) | Err(_) => tracing::warn!(
            base_url = %provider.credentials().base_url,
            "Model endpoint not reachable; chat requests will fail until it is"
        ),
    }

    let state = AppState::new(provider, config.agent_config(), config.sessions);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .route("/api/chat/{session_id}", delete(delete_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!(
        addr = %config.bind_addr,
        max_tool_iterations = config.max_tool_iterations,
        max_sessions = config.sessions.max_sessions,
        session_ttl_secs = config.sessions.idle_ttl.as_secs(),
        "Agent server listening"
    );
    tracing::info!("  GET    /health                 - Health check");
    tracing::info!("  POST   /api/chat               - Run one agent turn");
    tracing::info!("  GET    /api/chat/stream        - WebSocket streaming");
    tracing::info!("  DELETE /api/chat/{{session_id}}  - Drop a session");

    axum::serve(listener, app).await?;

    Ok(())
}
