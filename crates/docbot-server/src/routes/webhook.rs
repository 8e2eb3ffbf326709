use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use docbot_schema::{WebhookEnvelope, WebhookResponse, WebhookStatus};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(telegram_update))
        .route("/lambda", post(lambda_event))
}

/// Raw Telegram update as posted by the Bot API.
pub async fn telegram_update(State(state): State<AppState>, body: Bytes) -> Json<WebhookResponse> {
    let response = match std::str::from_utf8(&body) {
        Ok(raw) => state.dispatcher.handle_body(raw).await,
        Err(e) => {
            tracing::warn!(error = %e, "webhook body is not utf-8");
            WebhookResponse::ok(WebhookStatus::InvalidEncoding)
        }
    };
    Json(response)
}

/// API-Gateway proxy envelope carrying the update, possibly base64 encoded.
pub async fn lambda_event(State(state): State<AppState>, body: Bytes) -> Json<WebhookResponse> {
    if body.is_empty() {
        return Json(WebhookResponse::ok(WebhookStatus::NoBody));
    }
    let response = match serde_json::from_slice::<WebhookEnvelope>(&body) {
        Ok(envelope) => state.dispatcher.handle_event(envelope).await,
        Err(e) => {
            tracing::warn!(error = %e, "invalid webhook envelope");
            WebhookResponse::ok(WebhookStatus::InvalidJson)
        }
    };
    Json(response)
}
