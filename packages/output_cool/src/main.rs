use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use session_mux::{Multiplexer, SessionRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
mod surface;
#[cfg(test)]
mod test_helpers;
mod transport;

use crate::config::FileConfig;
use crate::metrics::ServerMetrics;
use crate::surface::ConsoleSurfaceFactory;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "output-cool")]
#[command(about = "Opens a console panel for every connection and streams its messages into it")]
struct Cli {
    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding output-cool.toml (defaults to the platform config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub mux: Multiplexer,
    pub metrics: Arc<ServerMetrics>,
    pub next_connection_id: Arc<AtomicU64>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::websocket_handler))
        .route("/api/sessions", get(handlers::list_sessions))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/api/health", get(handlers::health_handler))
        .route("/api/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "output_cool=debug,session_mux=debug,tower_http=debug,info"
    } else {
        "output_cool=info,session_mux=info,tower_http=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_dir = cli.config_dir.unwrap_or_else(config::default_config_dir);
    let file_config: FileConfig = config::load_config(&config_dir)
        .extract()
        .with_context(|| format!("Failed to load config from {}", config_dir.display()))?;

    let host = cli.host.unwrap_or_else(|| file_config.server.host.clone());
    let port = cli.port.unwrap_or(file_config.server.port);

    let mux = Multiplexer::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(ConsoleSurfaceFactory::new(file_config.surface_settings())),
        file_config.mux_config(),
    );
    let metrics = Arc::new(ServerMetrics::new());
    metrics::spawn_recorder(metrics.clone(), &mux);

    let state = AppState {
        mux: mux.clone(),
        metrics,
        next_connection_id: Arc::new(AtomicU64::new(1)),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Output Cool listening on http://{}", actual_addr);
    info!("  WS     /ws                 - Open a session; every frame becomes a panel entry");
    info!("  GET    /api/sessions       - List sessions");
    info!("  GET    /api/sessions/:id   - Session details");
    info!("  DELETE /api/sessions/:id   - Close a session's panel and connection");
    info!("  GET    /api/health         - Health check");
    info!("  GET    /api/metrics        - Server metrics");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing sessions...");
        // Close every socket so open upgrades let the server drain
        mux.shutdown();
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Shutdown complete");
    server_result
}
