//! REST API server module
//!
//! Exposes the zipper service over HTTP: task creation, link submission,
//! status polling and archive download.

use crate::{Config, Error, Result, ZipperService};
use axum::{routing::get, Router};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Bound on the HTTP server's graceful drain after cancellation fires
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `GET  /api/zipper/` - Create a task
/// - `POST /api/zipper/` - Submit a task's links
/// - `GET  /api/zipper/status/:task_id` - Poll a task's status
/// - `GET  /download/:filename` - Fetch a finalized archive
pub fn create_router(service: Arc<ZipperService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config);

    Router::new()
        .route(
            "/api/zipper/",
            get(routes::add_task).post(routes::add_links),
        )
        .route("/api/zipper/status/:task_id", get(routes::get_status))
        .route("/download/:filename", get(routes::download_archive))
        .with_state(state)
        // trace first so CORS handling is visible in request logs
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Start the API server on the configured bind address
///
/// Serves until the service's cancellation token fires, then drains
/// in-flight connections for at most [`SHUTDOWN_TIMEOUT`].
pub async fn start_api_server(service: Arc<ZipperService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.http_server.bind_address();
    let cancel = service.cancellation_token();

    let app = create_router(service, config);

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(Error::Io)?;
    tracing::info!(address = %bind_address, "API server listening");

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            tracing::info!("API server draining");
        }
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();

    // cap the drain: a stuck client must not hold up process exit
    let drain_deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
    };
    tokio::select! {
        result = server => {
            result.map_err(|e| Error::ApiServerError(e.to_string()))?;
            tracing::info!("API server stopped");
        }
        _ = drain_deadline => {
            tracing::warn!("API server did not drain within the shutdown timeout");
        }
    }

    Ok(())
}
