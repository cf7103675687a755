//! Dev server for a built site.
//!
//! Every response carries the cross-origin isolation headers browsers require
//! before they hand out shared memory, which the snippet runtime's input
//! hand-off depends on.

use anyhow::{bail, Context, Result};
use axum::{
    http::{header::HeaderName, HeaderValue},
    routing::get,
    Router,
};
use jacblog_core::Config;
use std::path::{Path, PathBuf};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

const COOP: HeaderName = HeaderName::from_static("cross-origin-opener-policy");
const COEP: HeaderName = HeaderName::from_static("cross-origin-embedder-policy");

async fn health() -> &'static str {
    "healthy\n"
}

/// Router serving `site_dir` with the isolation headers and `/health`
pub fn router(site_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback_service(ServeDir::new(site_dir).append_index_html_on_directories(true))
        .layer(SetResponseHeaderLayer::overriding(
            COOP,
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            COEP,
            HeaderValue::from_static("require-corp"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Start the dev server
pub async fn dev_server(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    site: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let site_dir = site.unwrap_or_else(|| config.site_dir());
    if !site_dir.is_dir() {
        bail!(
            "Site directory {} does not exist; build the site first",
            site_dir.display()
        );
    }

    tracing::info!("Starting dev server on http://{}:{}", host, port);
    println!("\nServing {} at http://{}:{}", site_dir.display(), host, port);
    println!("   Press Ctrl+C to stop\n");

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, router(site_dir))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Stopping server...");
        })
        .await
        .context("Server error")?;

    Ok(())
}
