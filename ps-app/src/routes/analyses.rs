use crate::error::AnalysisError;
use crate::investigator::TerminationReason;
use crate::server::AppState;
use crate::target::ChangeRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    /// `org/repo#123` or a pull request URL.
    change: String,
}

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/analyses", post(create_analysis))
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": error.to_string() })),
    )
        .into_response()
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_analysis(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    if state.shutdown.is_cancelled() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down");
    }
    let change: ChangeRef = match req.change.parse() {
        Ok(change) => change,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    tracing::info!(change = %change, "analysis requested");

    // Own task: a dropped connection or request timeout does not abort the analysis mid-call.
    let investigator = Arc::clone(&state.investigator);
    let task = tokio::spawn(async move { investigator.run(&change).await });

    match task.await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => {
            let status = match &e {
                AnalysisError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
                AnalysisError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AnalysisError::Inference(_) => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(serde_json::json!({
                    "status": "error",
                    "termination": TerminationReason::FatalError,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "analysis task failed to complete");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "analysis task failed")
        }
    }
}
