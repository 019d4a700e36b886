use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let settings = state.investigator.settings();
    let status = if state.shutdown.is_cancelled() {
        "draining"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "checked_at": Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "model": state.model,
        "max_iterations": settings.max_iterations,
        "source_authenticated": settings.credential.is_some(),
    }))
}
