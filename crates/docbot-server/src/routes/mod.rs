pub mod health;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/webhook", webhook::router())
        .nest("/health", health::router())
}
