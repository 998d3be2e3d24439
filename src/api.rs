//! REST API server for the financial QA orchestrator
//!
//! Exposes the coordinator as a request/response endpoint and as a streamed
//! sequence of named SSE events (`thinking`, `result`, `error`).

use axum::{
    extract::State,
    response::{sse::Event, sse::KeepAlive, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::coordinator::Coordinator;
use crate::models::FinalResponse;
use crate::stream::{stream_query, ProgressSink};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn request_id(session_id: Option<&str>) -> uuid::Uuid {
    match session_id {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => uuid::Uuid::new_v4(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Request/Response Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Json<FinalResponse> {
    let id = request_id(req.session_id.as_deref());
    info!(request_id = %id, query = %req.query, "Received query");

    // The coordinator never fails; the envelope carries its own status.
    let response = state.coordinator.run(&req.query, &ProgressSink::discard()).await;
    Json(response)
}

/// =============================
/// Streaming Endpoint
/// =============================

async fn run_query_stream(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let id = request_id(req.session_id.as_deref());
    info!(request_id = %id, query = %req.query, "Received streaming query");

    let events = stream_query(state.coordinator.clone(), req.query).map(|event| {
        Ok::<_, axum::Error>(
            Event::default()
                .event(event.event_name())
                .data(event.payload().to_string()),
        )
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

/// =============================
/// Chat Endpoint
/// =============================

/// Maps a chat transcript onto a single query: only the latest user turn is
/// forwarded; earlier turns are the UI's concern.
async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Json<FinalResponse> {
    let last_user_message = req.messages.iter().rev().find(|m| m.role == "user");

    let Some(user_msg) = last_user_message else {
        return Json(FinalResponse::error(
            "No user message found.",
            vec!["ERROR: chat request without a user turn".to_string()],
        ));
    };

    run_query(
        State(state),
        Json(QueryRequest {
            query: user_msg.content.clone(),
            session_id: req.session_id,
        }),
    )
    .await
}

/// =============================
/// Router
/// =============================

pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    let state = ApiState { coordinator };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route("/api/query/stream", post(run_query_stream))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    coordinator: Arc<Coordinator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
