//! Error types for batchzip
//!
//! This module provides error handling for the service, including:
//! - The crate-level [`Error`] type with HTTP status code mapping
//! - The per-URL [`DownloadFailure`] taxonomy recorded against links
//! - Structured JSON error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for batchzip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batchzip
///
/// Admission and validation errors surface to HTTP callers synchronously;
/// everything download-related is recorded per URL as a [`DownloadFailure`]
/// and never reaches the caller as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// The active-task cap is reached - no new task can be admitted
    #[error("to many active tasks")]
    Busy,

    /// Unknown task id
    #[error("task not found")]
    NotFound,

    /// Links were already submitted for this task (submission is one-shot)
    #[error("links already submitted for task")]
    LinksAlreadySubmitted,

    /// The submitted links list is empty
    #[error("links list is empty")]
    EmptyLinks,

    /// More links submitted than the configured per-task cap
    #[error("{count} links exceed the configured limit of {limit}")]
    TooManyLinks {
        /// Number of links in the request
        count: usize,
        /// Configured `zipper.max_files` cap
        limit: usize,
    },

    /// Malformed request (unparseable body, invalid task id, ...)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Finalization attempted before every link resolved
    #[error("recorded outcomes ({recorded}) do not match expected link count ({expected})")]
    CountMismatch {
        /// Outcomes recorded so far (statuses + errors)
        recorded: usize,
        /// Links accepted for the task
        expected: usize,
    },

    /// The task already reached its terminal state
    #[error("task is already done")]
    AlreadyDone,

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "worker_pool.num_workers")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

impl Error {
    /// HTTP status code for this error
    ///
    /// Admission and validation failures are client errors (400), shutdown
    /// is 503, anything else is an internal error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Busy
            | Error::NotFound
            | Error::LinksAlreadySubmitted
            | Error::EmptyLinks
            | Error::TooManyLinks { .. }
            | Error::BadRequest(_)
            | Error::CountMismatch { .. }
            | Error::AlreadyDone => 400,
            Error::ShuttingDown => 503,
            Error::Config { .. }
            | Error::Io(_)
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_) => 500,
        }
    }

    /// Machine-readable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Busy => "busy",
            Error::NotFound => "not_found",
            Error::LinksAlreadySubmitted => "links_already_submitted",
            Error::EmptyLinks => "empty_links",
            Error::TooManyLinks { .. } => "too_many_links",
            Error::BadRequest(_) => "bad_request",
            Error::CountMismatch { .. } => "count_mismatch",
            Error::AlreadyDone => "already_done",
            Error::ShuttingDown => "shutting_down",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

/// Why a single URL failed to make it into its task's archive
///
/// The `Display` rendering of these variants is exactly what gets recorded
/// in the task's `links_error` map and returned from the status endpoint.
#[derive(Clone, Debug, Error)]
pub enum DownloadFailure {
    /// Transport-level failure (DNS, connect, TLS, timeout) on HEAD or GET
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Announced Content-Length exceeds the configured cap
    #[error("file size {size} exceeds maximum allowed size {limit}")]
    TooLarge {
        /// Content-Length announced by the server
        size: u64,
        /// Configured `worker_pool.max_file_size`
        limit: u64,
    },

    /// The response carried no Content-Type header
    #[error("content type is empty")]
    MissingContentType,

    /// The response MIME type is not in the configured allow-list
    #[error("{0} type is not allowed")]
    TypeNotAllowed(String),

    /// The response body could not be read to completion
    #[error("body read failed: {0}")]
    BodyRead(String),

    /// The archive entry for this URL could not be created or written
    #[error("archive error: {0}")]
    Archive(String),
}

/// Structured error response body returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error detail payload
    pub error: ErrorDetail,
}

/// Machine- and human-readable description of an API error
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. "busy"
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError {
            error: ErrorDetail {
                code: err.error_code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_map_to_400() {
        assert_eq!(Error::Busy.status_code(), 400);
        assert_eq!(Error::NotFound.status_code(), 400);
        assert_eq!(Error::LinksAlreadySubmitted.status_code(), 400);
        assert_eq!(Error::EmptyLinks.status_code(), 400);
    }

    #[test]
    fn shutdown_maps_to_503() {
        assert_eq!(Error::ShuttingDown.status_code(), 503);
        assert_eq!(Error::ShuttingDown.error_code(), "shutting_down");
    }

    #[test]
    fn busy_keeps_the_original_wire_message() {
        // The admission failure message is part of the public API contract.
        assert_eq!(Error::Busy.to_string(), "to many active tasks");
    }

    #[test]
    fn api_error_carries_code_and_message() {
        let api_error: ApiError = Error::Busy.into();
        assert_eq!(api_error.error.code, "busy");
        assert_eq!(api_error.error.message, "to many active tasks");
    }

    #[test]
    fn download_failure_messages_match_recorded_format() {
        let err = DownloadFailure::TooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "file size 2048 exceeds maximum allowed size 1024"
        );
        assert_eq!(
            DownloadFailure::TypeNotAllowed("text/html".to_string()).to_string(),
            "text/html type is not allowed"
        );
        assert_eq!(
            DownloadFailure::MissingContentType.to_string(),
            "content type is empty"
        );
    }
}
