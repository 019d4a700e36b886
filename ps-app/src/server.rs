//! PerfSleuth entry points: one-shot analysis, config check and the HTTP trigger.

use crate::config::PerfsleuthConfig;
use crate::investigator::Investigator;
use crate::routes;
use crate::target::ChangeRef;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use ps_tools::InvestigationCache;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub investigator: Arc<Investigator>,
    pub model: String,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = PerfsleuthConfig::load_with_path(config_path).await?;
    let investigator = Investigator::from_config(&cfg, Arc::new(InvestigationCache::new()))?;
    let settings = investigator.settings();
    tracing::info!(
        model = %cfg.inference.model,
        inference_endpoint = %cfg.inference.endpoint,
        source_api_base = %settings.api_base,
        source_authenticated = settings.credential.is_some(),
        max_iterations = settings.max_iterations,
        retry_max_attempts = cfg.retry.max_attempts,
        bind_addr = %cfg.bind_addr()?,
        config_path = %path.display(),
        "config ok"
    );
    println!("perfsleuth doctor: config ok ({})", path.display());
    Ok(())
}

pub async fn analyze(config_path: Option<PathBuf>, change: &str, json: bool) -> Result<()> {
    let change: ChangeRef = change.parse()?;
    let cfg = PerfsleuthConfig::load(config_path).await?;
    let investigator = Investigator::from_config(&cfg, Arc::new(InvestigationCache::new()))?;
    let report = investigator.run(&change).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.answer);
    }
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = PerfsleuthConfig::load_with_path(config_path).await?;
    let addr = cfg.bind_addr()?;
    tracing::info!(
        bind_addr = %addr,
        model = %cfg.inference.model,
        max_concurrent_analyses = cfg.server.max_concurrent_analyses,
        request_timeout_seconds = cfg.server.request_timeout_seconds,
        max_iterations = cfg.agent.max_iterations,
        config_path = %cfg_path.display(),
        "perfsleuth starting"
    );

    let listener = preflight_bind_listener(addr).await?;
    let shutdown = CancellationToken::new();
    let cache = Arc::new(InvestigationCache::new());
    let investigator = Arc::new(Investigator::from_config(&cfg, Arc::clone(&cache))?);
    let state = Arc::new(AppState {
        investigator,
        model: cfg.inference.model.clone(),
        started_at: Instant::now(),
        shutdown: shutdown.clone(),
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router(cfg.server.max_concurrent_analyses)
        .layer(Extension(state))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.request_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "perfsleuth serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!(
        cache_entries = cache.len(),
        "http server shutdown completed"
    );
    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; draining in-flight analyses");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; draining in-flight analyses");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; draining in-flight analyses");
        }
    }
    shutdown.cancel();
}
