//! HTTP endpoint receiving platform updates.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use super::telegram::Update;
use crate::bot::Bot;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    /// Expected value of [`SECRET_HEADER`]; `None` disables the check.
    pub secret: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_update))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn receive_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(expected) = state.secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!(update_id = update.update_id, "Rejected update with a bad secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => state.bot.handle(event).await,
        None => tracing::debug!(update_id, "Ignoring unsupported update"),
    }

    // Failures are reported to the user in-chat; a non-2xx answer would only
    // make the platform redeliver the same update.
    StatusCode::OK
}
