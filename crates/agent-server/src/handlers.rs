//! HTTP/WebSocket Handlers

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use agent_core::{AgentError, GenerationOptions, LlmProvider, Message};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub model: String,
    pub provider_reachable: bool,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(error: &AgentError) -> ApiError {
    let (status, code) = match error {
        AgentError::ModelCall(_) | AgentError::Provider(_) => (StatusCode::BAD_GATEWAY, "MODEL_ERROR"),
        AgentError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
    };
    (
        status,
        Json(ErrorResponse {
            error: error.user_message(),
            code,
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_reachable = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        model: state.provider.default_model().to_string(),
        provider_reachable,
        sessions: state.session_count().await,
    })
}

/// Run one agent turn in the caller's session
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = state.session(&session_id).await;
    let mut agent = session.lock().await;

    let message = agent.run(&payload.message).await.map_err(|e| {
        tracing::error!(session = %session_id, "Agent error: {}", e);
        api_error(&e)
    })?;

    Ok(Json(ChatResponse {
        message,
        session_id,
        model: state.provider.default_model().to_string(),
    }))
}

/// Drop a session and its history
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.remove_session(&session_id).await {
        tracing::info!(session = %session_id, "Session removed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

fn frame(value: &serde_json::Value) -> WsMessage {
    WsMessage::Text(value.to_string().into())
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let request: StreamRequest = match serde_json::from_str(text.as_str()) {
            Ok(r) => r,
            Err(e) => {
                let _ = sender
                    .send(frame(&json!({"type": "error", "error": e.to_string()})))
                    .await;
                continue;
            }
        };

        let messages = [
            Message::system(state.agent_config.system_prompt.clone()),
            Message::user(request.message),
        ];
        let options = GenerationOptions {
            model: state.agent_config.generation.model.clone(),
            ..GenerationOptions::default()
        };

        let mut fragments = match state.provider.think(&messages, &options).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = sender
                    .send(frame(&json!({"type": "error", "error": e.user_message()})))
                    .await;
                continue;
            }
        };

        while let Some(fragment) = fragments.next().await {
            let outgoing = match fragment {
                Ok(content) => json!({"type": "chunk", "content": content}),
                Err(e) => json!({"type": "error", "error": e.user_message()}),
            };
            if sender.send(frame(&outgoing)).await.is_err() {
                return;
            }
        }

        if sender.send(frame(&json!({"type": "done"}))).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_failures_map_to_bad_gateway() {
        let (status, body) = api_error(&AgentError::ModelCall("timeout".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "MODEL_ERROR");

        let (status, _) = api_error(&AgentError::Configuration("no key".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = api_error(&AgentError::ToolNotFound("x".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_chat_request_session_is_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request.message, "hi");
        assert!(request.session_id.is_none());
    }
}
