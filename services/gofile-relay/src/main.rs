//! GoFile Relay
//!
//! Single-binary Rust service that:
//! 1. Loads a pool of GoFile account tokens
//! 2. Probes each account's traffic usage in the background
//! 3. Accepts files (raw bodies or remote URLs) over HTTP
//! 4. Uploads them to GoFile, failing over between accounts on quota exhaustion

mod config;
mod error;
mod metrics;
mod relay;
mod storage_impl;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use account_pool::{Pool, Stats, Uploader, probe_all, spawn_probe_task};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::StorageClient;

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::{RelayState, UploadQuery, UploadUrlRequest};
use crate::storage_impl::GofileStorage;

/// How long in-flight requests get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime counters reported on `/health`
#[derive(Debug, Clone)]
struct ServiceMetrics {
    requests_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
    in_flight: Arc<AtomicU64>,
    started_at: Instant,
}

impl ServiceMetrics {
    fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Decrements the in-flight counter when a request ends, including on cancellation.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    relay: RelayState,
    pool: Arc<Pool>,
    storage: Arc<dyn StorageClient>,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
        .route("/upload", post(upload_handler))
        .route("/upload-url", post(upload_url_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting gofile-relay");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base = %config.gofile.api_base,
        accounts = config.gofile.tokens.len(),
        probe_interval_secs = config.pool.probe_interval_secs,
        spool_dir = %config.server.spool_dir.display(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let storage: Arc<dyn StorageClient> = Arc::new(GofileStorage::new(
        client.clone(),
        Duration::from_secs(config.gofile.timeout_secs),
        gofile::Endpoints::new(&config.gofile.api_base, &config.gofile.upload_url),
        config.gofile.folder_id.clone(),
    ));

    let tokens = std::mem::take(&mut config.gofile.tokens);
    let pool = Arc::new(
        Pool::new(tokens, config.pool.options()).context("failed to build account pool")?,
    );
    let uploader = Arc::new(Uploader::new(
        pool.clone(),
        storage.clone(),
        config.retry_policy(),
    ));

    let probe_task = if config.pool.probe_interval_secs > 0 {
        Some(spawn_probe_task(
            pool.clone(),
            storage.clone(),
            Duration::from_secs(config.pool.probe_interval_secs),
        ))
    } else {
        info!("background usage probing disabled");
        None
    };

    let service_metrics = ServiceMetrics::new();
    let app_state = AppState {
        relay: RelayState {
            uploader,
            client,
            spool_dir: config.server.spool_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes(),
            download_timeout: Duration::from_secs(config.server.download_timeout_secs),
            transfers: Arc::new(tokio::sync::Semaphore::new(
                config.server.max_concurrent_transfers,
            )),
        },
        pool,
        storage,
        metrics: service_metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let in_flight = service_metrics.in_flight.clone();

    // The drain timeout starts at signal receipt, not at server start: notify
    // the server to drain, then race the drain against the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    if let Some(task) = probe_task {
        task.abort();
    }
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Turn a handler result into a response and record request metrics.
fn finish<T: serde::Serialize>(
    state: &AppState,
    route: &'static str,
    started: Instant,
    request_id: &str,
    result: Result<T, RelayError>,
) -> Response {
    let response = match result {
        Ok(body) => match serde_json::to_value(&body) {
            Ok(json) => json_response(StatusCode::OK, json),
            Err(e) => RelayError::Io(format!("serializing response: {e}"))
                .into_response_with_id(request_id),
        },
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            warn!(request_id, route, kind = e.kind(), error = %e, "request failed");
            e.into_response_with_id(request_id)
        }
    };
    metrics::record_request(route, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// Health endpoint: pool health, uptime, request counts.
/// Returns 503 when no account is selectable.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = Stats::from_snapshot(state.pool.snapshot().await);
    let status = stats.health();
    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    json_response(
        status_code,
        serde_json::json!({
            "status": status,
            "accounts_total": stats.counts.total(),
            "accounts_selectable": stats.counts.selectable(),
            "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
            "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
            "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
            "in_flight": state.metrics.in_flight.load(Ordering::Relaxed),
        }),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    #[serde(default)]
    refresh: bool,
}

/// Pool statistics. `?refresh=true` probes every account first.
async fn stats_handler(State(state): State<AppState>, Query(query): Query<StatsQuery>) -> Response {
    if query.refresh {
        let summary = probe_all(&state.pool, state.storage.as_ref()).await;
        info!(?summary, "on-demand probe finished");
    }
    let stats = Stats::from_snapshot(state.pool.snapshot().await);
    let mut body = stats.to_json();
    body["text"] = serde_json::Value::String(stats.render());
    json_response(StatusCode::OK, body)
}

/// Upload a raw request body: `POST /upload?filename=NAME`.
async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> Response {
    let request_id = new_request_id();
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.metrics.in_flight);

    let result = relay::upload_body(&state.relay, query, body, &request_id).await;
    finish(&state, "/upload", started, &request_id, result)
}

/// Fetch a remote file and upload it: `POST /upload-url` with `{"url": ...}`.
async fn upload_url_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = new_request_id();
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.metrics.in_flight);

    let result = match serde_json::from_slice::<UploadUrlRequest>(&body) {
        Ok(request) => relay::upload_from_url(&state.relay, request, &request_id).await,
        Err(e) => Err(RelayError::BadRequest(format!("invalid request body: {e}"))),
    };
    finish(&state, "/upload-url", started, &request_id, result)
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
