pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook", post(webhook::message_webhook))
        .route("/webhook/whatsapp", post(webhook::whatsapp_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
