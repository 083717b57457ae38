//! Route handlers for the zipper API
//!
//! Successful responses wrap their payload in a `{"data": ...}` envelope;
//! failures are rendered as [`ApiError`](crate::error::ApiError) bodies by
//! the [`IntoResponse`](axum::response::IntoResponse) impl on
//! [`Error`](crate::error::Error).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::api::AppState;
use crate::error::Error;
use crate::types::{TaskId, TaskStatus};

/// Request body for POST /api/zipper/
#[derive(Debug, Deserialize, Serialize)]
pub struct AddLinksRequest {
    /// Task the links belong to
    pub task_id: TaskId,
    /// URLs to download into the task's archive
    pub links: Vec<String>,
}

/// Payload of GET /api/zipper/status/:task_id
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// The task's identifier
    pub task_id: TaskId,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// URL → HTTP response status for completed downloads
    pub links_statuses: HashMap<String, String>,
    /// URL → failure reason for rejected or failed downloads
    pub links_error: HashMap<String, String>,
    /// Download URL of the finalized archive; present only once the task
    /// is done and an archive exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// GET /api/zipper/ - create a task
pub async fn add_task(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let id = state.service.create_task()?;
    Ok(Json(json!({ "data": id })))
}

/// POST /api/zipper/ - submit the task's links
///
/// The body is read raw and parsed by hand so that any malformed payload
/// is a plain 400, matching the wire contract.
pub async fn add_links(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let request: AddLinksRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::BadRequest(format!("failed to parse request body: {}", e)))?;

    let accepted = state
        .service
        .submit_links(request.task_id, request.links)
        .await?;
    Ok(Json(json!({ "data": accepted })))
}

/// GET /api/zipper/status/:task_id - snapshot a task
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let id: TaskId = task_id
        .parse()
        .map_err(|_| Error::BadRequest(format!("invalid task id '{}'", task_id)))?;

    let snapshot = state.service.get_status(id)?;

    // the archive location is only advertised once the task is done
    let url = match (&snapshot.status, &snapshot.archive_path) {
        (TaskStatus::Done, Some(path)) => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| format!("http://{}/download/{}", host(&headers, &state), name)),
        _ => None,
    };

    let status = StatusResponse {
        task_id: snapshot.task_id,
        status: snapshot.status,
        links_statuses: snapshot.links_statuses,
        links_error: snapshot.links_error,
        url,
    };
    Ok(Json(json!({ "data": status })))
}

/// GET /download/:filename - serve a finalized archive
pub async fn download_archive(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    // only plain basenames may reach the filesystem
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.service.archive_dir().join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/zip")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "archive not served");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Host the download URL should point at: the request's Host header, or
/// the configured bind address when the client sent none
fn host(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| state.config.http_server.bind_address())
}
