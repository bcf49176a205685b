//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::room::{RoomHandle, ROOM_CODE_LEN};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::RoomPhase;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in
    // CLIENT_ORIGIN); without it any origin may connect
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed_origins: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms", get(list_rooms_handler))
        .route("/rooms/:code", get(room_by_code_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.active_rooms(),
        active_players: state.rooms.total_players(),
    })
}

// ============================================================================
// Room endpoints
// ============================================================================

#[derive(Serialize)]
struct RoomSummary {
    room_id: Uuid,
    room_code: Option<String>,
    phase: RoomPhase,
    players: usize,
    max_players: usize,
    created_at: DateTime<Utc>,
}

impl RoomSummary {
    fn from_handle(handle: &RoomHandle) -> Self {
        Self {
            room_id: handle.id,
            room_code: handle.code.clone(),
            phase: handle.phase(),
            players: handle.player_count(),
            max_players: handle.max_players,
            created_at: handle.created_at,
        }
    }
}

#[derive(Serialize)]
struct RoomListResponse {
    rooms: Vec<RoomSummary>,
}

/// Public rooms only; coded rooms stay off the list
async fn list_rooms_handler(State(state): State<AppState>) -> Json<RoomListResponse> {
    let mut rooms: Vec<RoomSummary> = state
        .rooms
        .list()
        .iter()
        .filter(|h| h.code.is_none())
        .map(RoomSummary::from_handle)
        .collect();
    rooms.sort_by_key(|r| r.created_at);

    Json(RoomListResponse { rooms })
}

async fn room_by_code_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != ROOM_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest("Malformed room code".to_string()));
    }

    let handle = state
        .rooms
        .get_by_code(&code)
        .ok_or_else(|| AppError::NotFound("No room with that code".to_string()))?;

    Ok(Json(RoomSummary::from_handle(&handle)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
