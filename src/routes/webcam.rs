use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::response::AppError;
use crate::session::SessionStatus;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start-webcam", post(start_webcam))
        .route("/stop-webcam", post(stop_webcam))
        .route("/session", get(session_status))
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub message: &'static str,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

/// Claims the device and returns as soon as the capture task is running.
async fn start_webcam(State(state): State<AppState>) -> Result<Json<StartResponse>, AppError> {
    let info = state.sessions().start().await?;
    Ok(Json(StartResponse {
        message: "started",
        session_id: info.id,
    }))
}

async fn stop_webcam(State(state): State<AppState>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.sessions().stop().await,
    })
}

async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.sessions().status().await)
}
