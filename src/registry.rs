//! In-memory task registry with an active-task admission cap
//!
//! The registry owns every task record. All mutation goes through its one
//! mutex, which is what makes the admission cap sound under concurrent
//! creators: counting the active tasks and inserting the new one happen
//! under the same critical section. Readers get by-value snapshots and can
//! never alias registry state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{TaskId, TaskSnapshot, TaskStatus};

/// Default cap on concurrently active (non-Done) tasks
pub const MAX_ACTIVE_TASKS: usize = 3;

/// The outcome recorded against a single URL of a task
#[derive(Clone, Debug)]
pub enum LinkOutcome {
    /// HTTP response status line of a successful download, e.g. "200 OK"
    Status(String),
    /// Human-readable failure reason
    Error(String),
}

#[derive(Debug)]
struct Task {
    status: TaskStatus,
    expected_count: usize,
    links_statuses: HashMap<String, String>,
    links_error: HashMap<String, String>,
    archive_path: Option<PathBuf>,
}

impl Task {
    fn new() -> Self {
        Self {
            status: TaskStatus::Idle,
            expected_count: 0,
            links_statuses: HashMap::new(),
            links_error: HashMap::new(),
            archive_path: None,
        }
    }

    fn recorded(&self) -> usize {
        self.links_statuses.len() + self.links_error.len()
    }

    fn snapshot(&self, id: TaskId) -> TaskSnapshot {
        TaskSnapshot {
            task_id: id,
            status: self.status,
            expected_count: self.expected_count,
            links_statuses: self.links_statuses.clone(),
            links_error: self.links_error.clone(),
            archive_path: self.archive_path.clone(),
        }
    }
}

/// Thread-safe mapping of task id to task record
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct TaskRegistry {
    max_active: usize,
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl TaskRegistry {
    /// Create an empty registry admitting at most `max_active` non-Done tasks
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Task>> {
        // A poisoned lock means another thread panicked mid-update; the
        // table itself is still structurally sound, so keep serving.
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admit a new task, or fail with [`Error::Busy`] at the cap
    ///
    /// The active count and the insert share one critical section so that
    /// concurrent creators cannot overshoot the cap.
    pub fn create_task(&self) -> Result<TaskId> {
        let mut tasks = self.lock();
        let active = tasks
            .values()
            .filter(|t| t.status != TaskStatus::Done)
            .count();
        if active >= self.max_active {
            tracing::warn!(active, cap = self.max_active, "task admission refused");
            return Err(Error::Busy);
        }
        let id = TaskId::new();
        tasks.insert(id, Task::new());
        tracing::info!(task_id = %id, "task created");
        Ok(id)
    }

    /// Snapshot a task by value
    pub fn get(&self, id: TaskId) -> Result<TaskSnapshot> {
        let tasks = self.lock();
        let task = tasks.get(&id).ok_or(Error::NotFound)?;
        Ok(task.snapshot(id))
    }

    /// Accept the task's links and move it to `Processing`
    ///
    /// Submission is one-shot: it fails unless the task is still `Idle`.
    /// On success `expected_count` is fixed to `links.len()` for the rest
    /// of the task's life.
    pub fn append_links(&self, id: TaskId, links: &[String]) -> Result<usize> {
        if links.is_empty() {
            return Err(Error::EmptyLinks);
        }
        let mut tasks = self.lock();
        let task = tasks.get_mut(&id).ok_or(Error::NotFound)?;
        if task.status != TaskStatus::Idle {
            return Err(Error::LinksAlreadySubmitted);
        }
        task.expected_count = links.len();
        task.status = TaskStatus::Processing;
        tracing::info!(task_id = %id, count = links.len(), "links accepted");
        Ok(links.len())
    }

    /// Record one URL's outcome
    ///
    /// Idempotent per (task, url): the first writer wins and a repeat is a
    /// no-op, which keeps the status and error maps disjoint.
    pub fn record_outcome(&self, id: TaskId, url: &str, outcome: LinkOutcome) {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(&id) else {
            tracing::warn!(task_id = %id, url, "outcome for unknown task dropped");
            return;
        };
        if task.links_statuses.contains_key(url) || task.links_error.contains_key(url) {
            tracing::debug!(task_id = %id, url, "duplicate outcome ignored");
            return;
        }
        match outcome {
            LinkOutcome::Status(status) => {
                tracing::debug!(task_id = %id, url, %status, "download recorded");
                task.links_statuses.insert(url.to_string(), status);
            }
            LinkOutcome::Error(reason) => {
                tracing::debug!(task_id = %id, url, %reason, "download failure recorded");
                task.links_error.insert(url.to_string(), reason);
            }
        }
    }

    /// Number of links the task is waiting for (0 while `Idle`)
    pub fn expected_count(&self, id: TaskId) -> Result<usize> {
        let tasks = self.lock();
        let task = tasks.get(&id).ok_or(Error::NotFound)?;
        Ok(task.expected_count)
    }

    /// Recorded outcome count and expected link count for a task
    pub fn counts(&self, id: TaskId) -> Result<(usize, usize)> {
        let tasks = self.lock();
        let task = tasks.get(&id).ok_or(Error::NotFound)?;
        Ok((task.recorded(), task.expected_count))
    }

    /// Move a task to `Done`, recording where its archive landed
    ///
    /// `archive_path` is `None` for the degraded outcome where the archive
    /// itself could not be produced. Fails unless every link has an
    /// outcome recorded and the task is not already terminal.
    pub fn finalize(&self, id: TaskId, archive_path: Option<PathBuf>) -> Result<()> {
        let mut tasks = self.lock();
        let task = tasks.get_mut(&id).ok_or(Error::NotFound)?;
        if task.status == TaskStatus::Done {
            return Err(Error::AlreadyDone);
        }
        let recorded = task.recorded();
        if task.expected_count == 0 || recorded != task.expected_count {
            return Err(Error::CountMismatch {
                recorded,
                expected: task.expected_count,
            });
        }
        task.archive_path = archive_path;
        task.status = TaskStatus::Done;
        tracing::info!(
            task_id = %id,
            archive = ?task.archive_path,
            succeeded = task.links_statuses.len(),
            failed = task.links_error.len(),
            "task finalized"
        );
        Ok(())
    }

    /// Number of tasks currently counting against the admission cap
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|t| t.status != TaskStatus::Done)
            .count()
    }
}
