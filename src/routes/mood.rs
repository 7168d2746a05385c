use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::mood::summarize;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/emotion", get(current_emotion))
        .route("/mood-history", get(mood_history))
}

#[derive(Debug, Serialize)]
pub struct EmotionResponse {
    pub current_emotion: String,
}

#[derive(Debug, Serialize)]
pub struct MoodHistoryResponse {
    pub mood_history: Vec<String>,
    pub summary: String,
}

async fn current_emotion(State(state): State<AppState>) -> Json<EmotionResponse> {
    Json(EmotionResponse {
        current_emotion: state.history().current_emotion().await,
    })
}

async fn mood_history(State(state): State<AppState>) -> Json<MoodHistoryResponse> {
    let mood_history = state.history().snapshot().await;
    let summary = summarize(&mood_history);
    Json(MoodHistoryResponse {
        mood_history,
        summary,
    })
}
