//! Bounded download worker pool
//!
//! A fixed set of workers pulls [`DownloadJob`]s off one shared input
//! channel, runs the HEAD-vetted fetch protocol against each URL, and
//! emits exactly one [`ZipResult`] per job on the output channel. Both
//! channels hold a single slot, so producer and consumer stay
//! rate-matched: a stalled archive builder backpressures the workers,
//! which backpressures link submission.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerPoolConfig;
use crate::error::DownloadFailure;
use crate::types::{DownloadJob, FetchOutcome, ZipResult};

/// Channel capacity for jobs and results
const CHANNEL_CAPACITY: usize = 1;

/// Entry name used when the URL path yields no usable basename
const UNNAMED_FILE: &str = "unnamed_file";

/// Handle over the spawned download workers
///
/// The pool keeps no clone of the result sender: the output channel closes
/// on its own once the last worker exits, which is what tells the archive
/// builder the stream is over.
pub struct DownloadPool {
    workers: Vec<JoinHandle<()>>,
}

impl DownloadPool {
    /// Spawn the worker pool
    ///
    /// Returns the pool handle, the job sender (dropped by the facade to
    /// close the input during shutdown) and the result receiver (owned by
    /// the archive builder).
    pub fn start(
        config: &WorkerPoolConfig,
        client: reqwest::Client,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<DownloadJob>, mpsc::Receiver<ZipResult>) {
        let (job_tx, job_rx) = mpsc::channel::<DownloadJob>(CHANNEL_CAPACITY);
        let (result_tx, result_rx) = mpsc::channel::<ZipResult>(CHANNEL_CAPACITY);

        // tokio mpsc receivers are single-consumer; the workers share this
        // one behind a lock, each holding it only for the duration of a recv.
        let job_rx = Arc::new(Mutex::new(job_rx));

        let fetcher = Arc::new(Fetcher {
            client,
            allowed_types: config
                .allowed_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_file_size: config.max_file_size,
        });

        let workers = (0..config.num_workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&job_rx),
                    result_tx.clone(),
                    Arc::clone(&fetcher),
                    cancel.clone(),
                ))
            })
            .collect();
        tracing::info!(num_workers = config.num_workers.max(1), "download pool started");

        (Self { workers }, job_tx, result_rx)
    }

    /// Wait until every worker has exited
    pub async fn join(self) {
        futures::future::join_all(self.workers).await;
        tracing::info!("download pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
    result_tx: mpsc::Sender<ZipResult>,
    fetcher: Arc<Fetcher>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    // input closed and drained: end of stream
                    None => break,
                },
            }
        };

        tracing::debug!(worker, task_id = %job.task_id, url = %job.url, "fetching");
        let result = tokio::select! {
            // abortive cancellation: the partially produced result is dropped
            _ = cancel.cancelled() => break,
            result = fetcher.fetch(job) => result,
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = result_tx.send(result) => {
                // the builder is gone; no point fetching more
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker, "download worker exited");
}

/// Shared fetch configuration and HTTP client
struct Fetcher {
    client: reqwest::Client,
    allowed_types: Vec<String>,
    max_file_size: u64,
}

impl Fetcher {
    async fn fetch(&self, job: DownloadJob) -> ZipResult {
        let outcome = match self.fetch_url(&job.url).await {
            Ok((filename, response_status, bytes)) => FetchOutcome::Fetched {
                filename,
                response_status,
                bytes,
            },
            Err(failure) => {
                tracing::debug!(url = %job.url, reason = %failure, "download rejected");
                FetchOutcome::Failed(failure)
            }
        };
        ZipResult {
            task_id: job.task_id,
            url: job.url,
            outcome,
        }
    }

    /// The per-job fetch protocol: HEAD, size gate, GET, type gate,
    /// filename derivation, body read. Order matters: the size gate runs
    /// before any body transfer starts.
    async fn fetch_url(&self, url: &str) -> Result<(String, String, Bytes), DownloadFailure> {
        let head = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadFailure::Fetch(e.to_string()))?;

        if let Some(size) = content_length(head.headers()) {
            if size > self.max_file_size {
                return Err(DownloadFailure::TooLarge {
                    size,
                    limit: self.max_file_size,
                });
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadFailure::Fetch(e.to_string()))?;
        let response_status = response.status().to_string();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.is_empty() {
            return Err(DownloadFailure::MissingContentType);
        }
        let media_type = parse_media_type(&content_type);
        if !self.allowed_types.iter().any(|t| *t == media_type) {
            return Err(DownloadFailure::TypeNotAllowed(media_type));
        }

        let filename = filename_from_url(url);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadFailure::BodyRead(e.to_string()))?;

        Ok((filename, response_status, bytes))
    }
}

/// Content-Length announced by a response, if parseable
fn content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// The media type of a Content-Type header value, lowercased, without
/// parameters ("Image/PNG; charset=binary" → "image/png")
fn parse_media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Archive entry name for a URL: its last path segment, or
/// "unnamed_file" when the path has no usable basename
pub(crate) fn filename_from_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return UNNAMED_FILE.to_string();
    };
    let basename = parsed.path().rsplit('/').next().unwrap_or("");
    match basename {
        "" | "." | "/" => UNNAMED_FILE.to_string(),
        name => name.to_string(),
    }
}
