pub mod analyses;
pub mod health;

use axum::Router;
use tower::limit::GlobalConcurrencyLimitLayer;

/// Only analyses count against the concurrency limit; health stays reachable while they run.
pub fn router(max_concurrent_analyses: usize) -> Router {
    Router::new().merge(health::router()).merge(
        analyses::router().layer(GlobalConcurrencyLimitLayer::new(max_concurrent_analyses)),
    )
}
