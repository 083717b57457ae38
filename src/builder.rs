//! Streaming zip archive builder
//!
//! A single long-lived task consumes every [`ZipResult`] the pool emits
//! and owns every open archive file. Serializing all writes through one
//! consumer is what guarantees a task's archive is flushed and closed
//! before its status ever reads `Done`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::DownloadFailure;
use crate::registry::{LinkOutcome, TaskRegistry};
use crate::types::{FetchOutcome, TaskId, ZipResult};

/// In-flight archive state for one task
struct ArchiveContext {
    /// Open archive writer; `None` after a failed create, in which case the
    /// task degrades to `Done` without an archive
    writer: Option<ZipWriter<File>>,
    /// Pending archive-create failure, charged to the task's next
    /// successful download so the degraded task carries exactly one
    /// archive error
    create_error: Option<String>,
    path: PathBuf,
    produced: usize,
    failed: usize,
    filename_counts: HashMap<String, usize>,
}

impl ArchiveContext {
    /// Resolve a collision-safe entry name: the k-th occurrence of a
    /// basename gets a `_k` suffix before the extension
    fn entry_name(&mut self, filename: &str) -> String {
        let seen = self.filename_counts.entry(filename.to_string()).or_insert(0);
        let name = if *seen == 0 {
            filename.to_string()
        } else {
            match filename.rsplit_once('.') {
                Some((base, ext)) => format!("{}_{}.{}", base, seen, ext),
                None => format!("{}_{}", filename, seen),
            }
        };
        *seen += 1;
        name
    }
}

/// The single consumer of the download pool's output channel
pub struct ArchiveBuilder {
    registry: Arc<TaskRegistry>,
    archive_dir: PathBuf,
    in_flight: HashMap<TaskId, ArchiveContext>,
}

impl ArchiveBuilder {
    /// Create a builder writing archives under `archive_dir`
    pub fn new(registry: Arc<TaskRegistry>, archive_dir: PathBuf) -> Self {
        Self {
            registry,
            archive_dir,
            in_flight: HashMap::new(),
        }
    }

    /// Consume results until the channel closes, then abandon whatever is
    /// still open
    ///
    /// The channel closes when the last pool worker exits, so this is the
    /// final stage of the shutdown order. Tasks whose counts never
    /// completed are left non-`Done`; their files are closed best-effort
    /// and no partial archive is promoted.
    pub async fn run(mut self, mut results: mpsc::Receiver<ZipResult>) {
        tracing::info!(archive_dir = %self.archive_dir.display(), "archive builder started");
        while let Some(result) = results.recv().await {
            self.process(result);
        }
        for (task_id, ctx) in self.in_flight.drain() {
            if let Some(mut writer) = ctx.writer {
                if let Err(e) = writer.finish() {
                    tracing::warn!(task_id = %task_id, error = %e, "failed to close abandoned archive");
                }
            }
            tracing::warn!(task_id = %task_id, "archive abandoned before completion");
        }
        tracing::info!("archive builder stopped");
    }

    fn process(&mut self, result: ZipResult) {
        let ZipResult {
            task_id,
            url,
            outcome,
        } = result;

        let ctx = match self.in_flight.entry(task_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(open_archive(&self.archive_dir, task_id))
            }
        };

        match outcome {
            FetchOutcome::Failed(failure) => {
                self.registry
                    .record_outcome(task_id, &url, LinkOutcome::Error(failure.to_string()));
                ctx.failed += 1;
            }
            FetchOutcome::Fetched {
                filename,
                response_status,
                bytes,
            } => {
                let write_result: Result<(), String> = if let Some(reason) = ctx.create_error.take()
                {
                    Err(reason)
                } else if ctx.writer.is_some() {
                    let entry_name = ctx.entry_name(&filename);
                    match ctx.writer.as_mut() {
                        Some(writer) => {
                            write_entry(writer, &entry_name, &bytes).map_err(|e| e.to_string())
                        }
                        None => Ok(()),
                    }
                } else {
                    // archive already degraded; the download itself
                    // succeeded, so its status is still recorded
                    Ok(())
                };
                match write_result {
                    Ok(()) => {
                        self.registry.record_outcome(
                            task_id,
                            &url,
                            LinkOutcome::Status(response_status),
                        );
                        ctx.produced += 1;
                    }
                    Err(reason) => {
                        tracing::error!(task_id = %task_id, url = %url, error = %reason, "archive write failed");
                        let failure = DownloadFailure::Archive(reason);
                        self.registry
                            .record_outcome(task_id, &url, LinkOutcome::Error(failure.to_string()));
                        ctx.failed += 1;
                    }
                }
            }
        }

        self.try_finalize(task_id);
    }

    /// Close the archive and flip the task to `Done` once every expected
    /// link has an outcome
    fn try_finalize(&mut self, task_id: TaskId) {
        let complete = match (self.in_flight.get(&task_id), self.registry.expected_count(task_id)) {
            (Some(ctx), Ok(expected)) => expected > 0 && ctx.produced + ctx.failed >= expected,
            _ => false,
        };
        if !complete {
            return;
        }
        let Some(ctx) = self.in_flight.remove(&task_id) else {
            return;
        };

        let archive_path = match ctx.writer {
            Some(mut writer) => match writer.finish() {
                // the central directory is on disk; the file closes when
                // the handle drops, before Done becomes observable
                Ok(file) => {
                    if let Err(e) = file.sync_all() {
                        tracing::warn!(task_id = %task_id, error = %e, "archive fsync failed");
                    }
                    Some(ctx.path)
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "failed to close archive");
                    None
                }
            },
            None => None,
        };

        if let Err(e) = self.registry.finalize(task_id, archive_path) {
            tracing::warn!(task_id = %task_id, error = %e, "finalize rejected");
        }
    }
}

/// Open `<archive_dir>/<task_id>.zip` for a task's first result
///
/// A failed create degrades the task instead of aborting it: the context
/// is kept with no writer so sibling downloads still get their outcomes
/// recorded and the task still terminates.
fn open_archive(archive_dir: &Path, task_id: TaskId) -> ArchiveContext {
    let path = archive_dir.join(format!("{}.zip", task_id));
    let (writer, create_error) = match File::create(&path) {
        Ok(file) => (Some(ZipWriter::new(file)), None),
        Err(e) => {
            tracing::error!(task_id = %task_id, path = %path.display(), error = %e, "failed to create archive");
            (None, Some(e.to_string()))
        }
    };
    ArchiveContext {
        writer,
        create_error,
        path,
        produced: 0,
        failed: 0,
        filename_counts: HashMap::new(),
    }
}

fn write_entry(
    writer: &mut ZipWriter<File>,
    name: &str,
    bytes: &[u8],
) -> Result<(), zip::result::ZipError> {
    writer.start_file(name, FileOptions::default())?;
    writer.write_all(bytes)?;
    Ok(())
}
