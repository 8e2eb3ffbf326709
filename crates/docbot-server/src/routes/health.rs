use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub seen_events: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        seen_events: state.dispatcher.seen_count(),
    })
}
