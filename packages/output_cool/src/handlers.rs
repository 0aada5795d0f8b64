use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use session_mux::{MuxError, SessionId, SessionInfo};

use crate::AppState;
use crate::metrics;

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.mux.list().await)
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = id.parse::<SessionId>() else {
        return (StatusCode::BAD_REQUEST, format!("Invalid session id: {id}")).into_response();
    };

    match state.mux.session_info(id).await {
        Ok(info) => Json(info).into_response(),
        Err(e @ MuxError::UnknownSession(_)) => {
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Close a session's panel as if its user had dismissed it; the connection
/// follows.
pub async fn close_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let Ok(id) = id.parse::<SessionId>() else {
        return StatusCode::BAD_REQUEST;
    };

    if !state.mux.registry().contains(id) {
        return StatusCode::NOT_FOUND;
    }
    state.mux.on_surface_closed(id);
    StatusCode::NO_CONTENT
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        sessions: state.mux.registry().len(),
        connections: snapshot.connections.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
