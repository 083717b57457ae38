//! Core types for batchzip

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::DownloadFailure;

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner Uuid value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Lifecycle status of a task
///
/// Transitions are monotonic: `Idle → Processing → Done`. `Done` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, no links submitted yet
    Idle,
    /// Links accepted, downloads in flight
    Processing,
    /// All links resolved and the archive is closed
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "Idle"),
            TaskStatus::Processing => write!(f, "Processing"),
            TaskStatus::Done => write!(f, "Done"),
        }
    }
}

/// By-value snapshot of a task's state
///
/// The registry never hands out references into its table; readers get an
/// owned copy and cannot alias live state.
#[derive(Clone, Debug, Serialize)]
pub struct TaskSnapshot {
    /// The task's identifier
    pub task_id: TaskId,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Number of links accepted for this task (0 until links are submitted)
    pub expected_count: usize,
    /// URL → HTTP response status, for links that downloaded successfully
    pub links_statuses: HashMap<String, String>,
    /// URL → failure reason, for links that did not make it into the archive
    pub links_error: HashMap<String, String>,
    /// Path of the finalized archive; set iff `status` is `Done` and the
    /// archive was written successfully
    pub archive_path: Option<PathBuf>,
}

/// One unit of work for the download pool: fetch a single URL for a task
#[derive(Clone, Debug)]
pub struct DownloadJob {
    /// Task the URL belongs to
    pub task_id: TaskId,
    /// The URL to fetch
    pub url: String,
}

/// Outcome of one download, emitted by a pool worker
///
/// Exactly one `ZipResult` is produced per accepted `DownloadJob`.
#[derive(Debug)]
pub struct ZipResult {
    /// Task the URL belongs to
    pub task_id: TaskId,
    /// The URL that was fetched
    pub url: String,
    /// What happened
    pub outcome: FetchOutcome,
}

/// Success-or-failure payload of a [`ZipResult`]
#[derive(Debug)]
pub enum FetchOutcome {
    /// The URL passed the size and type gates and its body was read
    Fetched {
        /// Archive entry name derived from the URL's last path segment
        filename: String,
        /// HTTP response status line, e.g. "200 OK"
        response_status: String,
        /// The full response body
        bytes: Bytes,
    },
    /// The URL was rejected or the transfer failed
    Failed(DownloadFailure),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_roundtrips_through_display() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn task_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn task_id_serializes_as_plain_string() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(TaskStatus::Idle.to_string(), "Idle");
        assert_eq!(TaskStatus::Processing.to_string(), "Processing");
        assert_eq!(TaskStatus::Done.to_string(), "Done");
    }
}
