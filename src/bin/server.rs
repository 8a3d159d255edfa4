use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ninjavan_rs::{
    SIGNATURE_HEADER, SUPPORTED_COUNTRY_CODES, WebhookDispatcher, WebhookSecrets, WebhookVerifier,
};

/// Server configuration
struct ServerConfig {
    port: u16,
    secrets: WebhookSecrets,
}

impl ServerConfig {
    /// Secrets come from `NINJAVAN_WEBHOOK_SECRET_{CC}` env vars, one per
    /// configured country.
    fn from_env() -> Self {
        let mut secrets = WebhookSecrets::new();
        for country_code in SUPPORTED_COUNTRY_CODES {
            if let Ok(secret) = env::var(format!("NINJAVAN_WEBHOOK_SECRET_{}", country_code)) {
                secrets = secrets.with_secret(country_code, secret);
            }
        }

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            secrets,
        }
    }
}

/// Application state shared across all requests
#[derive(Clone)]
struct AppState {
    verifier: Arc<WebhookVerifier>,
    metrics: Arc<Metrics>,
}

/// Server metrics
struct Metrics {
    total_received: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    fn new() -> Self {
        Self {
            total_received: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

/// Dispatch target used when nothing else is wired in: logs the delivery
/// so payloads are visible without any downstream consumer.
struct LoggingDispatcher;

#[async_trait]
impl WebhookDispatcher for LoggingDispatcher {
    async fn dispatch(&self, payload: Map<String, Value>) {
        let tracking_number = payload
            .get("tracking_number")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(tracking_number, status, "webhook delivery received");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Read configuration from environment
    let config = ServerConfig::from_env();
    if config.secrets.is_empty() {
        tracing::warn!(
            "no webhook secrets configured; set NINJAVAN_WEBHOOK_SECRET_<CC> to accept deliveries"
        );
    }

    let verifier = Arc::new(
        WebhookVerifier::new(config.secrets).with_dispatcher(Arc::new(LoggingDispatcher)),
    );

    // Build Axum app with routes
    let app = build_app(verifier);

    // Bind server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app(verifier: Arc<WebhookVerifier>) -> Router {
    let state = AppState {
        verifier,
        metrics: Arc::new(Metrics::new()),
    };

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Webhook intake, one route per country under /webhooks
        .route("/webhooks/:country_code", post(receive_webhook))
        .route("/metrics", get(get_metrics))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Webhook intake endpoint.
///
/// Verification runs over the raw request bytes before any parsing, and
/// the response is a bare status code: 200 accepted, 401 rejected, 422
/// verified but unprocessable.
async fn receive_webhook(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.metrics.total_received.fetch_add(1, Ordering::Relaxed);

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.verifier.handle(uri.path(), signature, &body).await {
        Ok(country) => {
            state.metrics.accepted.fetch_add(1, Ordering::Relaxed);
            tracing::info!(country = %country, "webhook accepted");
            StatusCode::OK
        }
        Err(err) => {
            state.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "webhook not processed");
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Get server metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_received: state.metrics.total_received.load(Ordering::Relaxed),
        accepted: state.metrics.accepted.load(Ordering::Relaxed),
        rejected: state.metrics.rejected.load(Ordering::Relaxed),
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_received: u64,
    accepted: u64,
    rejected: u64,
    uptime_seconds: u64,
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
