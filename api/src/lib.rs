//! Trafficwatch API Server
//!
//! This crate provides the HTTP server and the ingestion loop of the
//! Trafficwatch platform. It polls a municipal traffic-light API for
//! per-device detector counts, persists them, and serves a small dashboard
//! aggregating the most recent readings per device.
//!
//! # Architecture
//!
//! Two independent execution contexts run inside one process:
//! - an Axum server handling read requests (aggregated view, coordinates)
//! - a background task driving the ingestion collector at a fixed rate
//!
//! A slow or failing ingestion cycle never blocks request serving, and an
//! ingestion failure never terminates the process.
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod db;
mod ingest;
mod routes;
mod state;

pub use config::Config;
pub use db::{Database, DatabaseConfig};
pub use ingest::{CollectError, Collector, CycleSummary};
pub use state::AppState;

use anyhow::Result;
use axum::Router;
use shared::allowlist::DeviceAllowList;
use shared::storage::{ClickHouseReadingStore, ReadingStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Runs the Trafficwatch API server and the ingestion loop.
///
/// Initializes configuration from environment variables, prepares the
/// readings table, spawns the collector on a background task and starts
/// listening for incoming connections. Handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The upstream HTTP client cannot be constructed
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let db_config = DatabaseConfig::from_env()?;
    let database = Database::new(&db_config);
    if let Err(e) = database.ping().await {
        tracing::warn!(error = %e, "Database ping failed at startup, continuing");
    }
    let store: Arc<dyn ReadingStore> = ClickHouseReadingStore::new_shared(database.client());

    // The table may already exist with a compatible shape, so a failure
    // here is logged rather than fatal.
    if let Err(e) = store.ensure_schema() {
        tracing::error!(error = %e, "Failed to create the readings table, continuing");
    }

    let coordinates = load_coordinates(&config.coordinates_path);
    let state = AppState::new(
        Arc::clone(&store),
        DeviceAllowList::tampere(),
        config.timezone,
        coordinates,
    );

    let collector = Arc::new(Collector::new(
        config.upstream_url.clone(),
        config.devices.clone(),
        config.timezone,
        Duration::from_secs(config.upstream_timeout_secs),
        store,
    )?);
    tokio::spawn(collector.run(Duration::from_secs(config.poll_interval_secs)));

    run_server_with_state(config, state).await
}

/// Runs the Trafficwatch API server with the provided configuration and
/// state, without spawning the ingestion loop.
///
/// This is useful for testing or when you want to provide configuration
/// programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_state(config: Config, state: AppState) -> Result<()> {
    let addr = config.socket_addr();

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Trafficwatch API server starting"
    );

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a
/// full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::traffic_routes(state.clone()))
        .merge(routes::dashboard_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Loads the static coordinate metadata file.
///
/// A missing or malformed file is logged and replaced with an empty object;
/// the file is presentation metadata and must not keep the service down.
fn load_coordinates(path: &Path) -> serde_json::Value {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed coordinates file, serving empty metadata");
                serde_json::json!({})
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Missing coordinates file, serving empty metadata");
            serde_json::json!({})
        }
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint_returns_200() {
        let app = create_router(AppState::with_in_memory_store());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_serves_traffic_and_dashboard() {
        let app = create_router(AppState::with_in_memory_store());

        for uri in ["/get_traffic_data", "/get_coordinates_data", "/"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri {uri}");
        }
    }

    #[test]
    fn test_load_coordinates_missing_file_is_empty_object() {
        let value = load_coordinates(Path::new("/nonexistent/coordinates.json"));
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }
}
