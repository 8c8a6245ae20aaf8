pub mod auth;
pub mod handlers;
pub mod state;
pub mod url_validation;

use crate::config::Config;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use state::AppState;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Build the full route table over `state`. Split out from `start` so
/// integration tests can drive the router directly via `tower::ServiceExt`
/// without binding a real socket.
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route(
            "/metrics",
            get(move || handlers::metrics::serve_metrics(prometheus_handle.clone())),
        )
        .route("/cue", post(handlers::cue::cue_control))
        .route("/status/{channel}", get(handlers::status::channel_status))
        .route(
            "/{org}/{channel}/master.m3u8",
            get(handlers::viewer::serve_master),
        )
        .route(
            "/{org}/{channel}/{variant}",
            get(handlers::viewer::serve_variant),
        )
        .layer(cors)
        .with_state(state)
}

/// Start the Axum HTTP server.
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let base_url = config.base_url.clone();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");
    info!("Prometheus metrics recorder installed");

    let state = AppState::new(config).await;
    state.start_monitors();

    // CORS: permissive — viewer manifests must be fetchable from any web
    // player origin (HLS.js, video.js, Safari's native player, etc.).
    info!("CORS: permissive mode (required for HLS player access)");

    let app = build_router(state, prometheus_handle);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}. Is port {} already in use?", addr, e, port);
            return Err(e.into());
        }
    };

    info!("Server bound to {}", addr);
    info!("Public URL: {}", base_url);
    info!("  Health:  {}/health", base_url);
    info!("  Metrics: {}/metrics", base_url);
    info!("  Cue:     POST {}/cue", base_url);
    info!("  Status:  {}/status/{{channel}}", base_url);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
