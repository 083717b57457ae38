//! # batchzip
//!
//! HTTP-fronted batch download and zip archival service.
//!
//! A client creates a task, posts a list of remote URLs for it, and polls
//! the task until its archive is ready. URLs are fetched concurrently by a
//! bounded worker pool with HEAD-based size vetting and MIME filtering;
//! a single archive builder streams the results into one zip per task and
//! atomically finalizes the task once every URL has resolved.
//!
//! ## Quick Start
//!
//! ```no_run
//! use batchzip::{api, Config, ZipperService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let service = Arc::new(ZipperService::new(&config)?);
//!
//!     // Serve the API until a termination signal arrives
//!     tokio::spawn(api::start_api_server(service.clone(), config));
//!     batchzip::run_with_shutdown(service).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Streaming zip archive builder
pub mod builder;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Download worker pool
pub mod pool;
/// In-memory task registry
pub mod registry;
/// Service facade and lifecycle
pub mod service;
/// Core types and channel messages
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, DownloadFailure, Error, ErrorDetail, Result};
pub use registry::{TaskRegistry, MAX_ACTIVE_TASKS};
pub use service::ZipperService;
pub use types::{DownloadJob, FetchOutcome, TaskId, TaskSnapshot, TaskStatus, ZipResult};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails; SIGHUP is drained and ignored.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(service: std::sync::Arc<ZipperService>) {
    wait_for_signal().await;
    service.shutdown().await;
}

/// Block until a termination signal arrives
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // SIGHUP must not kill the process; drain it in the background
    if let Ok(mut sighup) = signal(SignalKind::hangup()) {
        tokio::spawn(async move {
            while sighup.recv().await.is_some() {
                tracing::debug!("Ignoring SIGHUP");
            }
        });
    }

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Block until a termination signal arrives
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
