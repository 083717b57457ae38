//! Service facade and lifecycle
//!
//! [`ZipperService`] wires the registry, the download pool and the archive
//! builder together and is what the HTTP layer talks to. It also owns the
//! cancellation token and the shutdown sequencing: cancel, close the pool
//! input, drain the workers, join the builder.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::ArchiveBuilder;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::DownloadPool;
use crate::registry::{TaskRegistry, MAX_ACTIVE_TASKS};
use crate::types::{DownloadJob, TaskId, TaskSnapshot};

/// How long shutdown waits for the workers and the builder to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The batch-archival service: admission, link submission, status reads
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ZipperService {
    registry: Arc<TaskRegistry>,
    archive_dir: PathBuf,
    max_files: usize,
    cancel: CancellationToken,
    /// Pool input; taking it out closes the job channel during shutdown
    job_tx: Mutex<Option<mpsc::Sender<DownloadJob>>>,
    pool: Mutex<Option<DownloadPool>>,
    builder_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ZipperService {
    /// Build the service: create the archive directory, the shared HTTP
    /// client, the worker pool and the archive builder
    ///
    /// Must be called from within a tokio runtime (the pool and builder
    /// tasks are spawned here).
    pub fn new(config: &Config) -> Result<Self> {
        let archive_dir = config.zipper.archive_path.clone();
        std::fs::create_dir_all(&archive_dir).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create archive directory '{}': {}",
                    archive_dir.display(),
                    e
                ),
            ))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&archive_dir, std::fs::Permissions::from_mode(0o775))?;
        }

        let client = reqwest::Client::builder()
            .timeout(config.worker_pool.timeout)
            .build()?;

        let cancel = CancellationToken::new();
        let registry = Arc::new(TaskRegistry::new(MAX_ACTIVE_TASKS));

        let (pool, job_tx, result_rx) =
            DownloadPool::start(&config.worker_pool, client, cancel.clone());
        let builder = ArchiveBuilder::new(Arc::clone(&registry), archive_dir.clone());
        let builder_handle = tokio::spawn(builder.run(result_rx));

        Ok(Self {
            registry,
            archive_dir,
            max_files: config.zipper.max_files,
            cancel,
            job_tx: Mutex::new(Some(job_tx)),
            pool: Mutex::new(Some(pool)),
            builder_handle: Mutex::new(Some(builder_handle)),
        })
    }

    /// The token that aborts every blocking operation in the service
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Directory finalized archives live in
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Admit a new task
    pub fn create_task(&self) -> Result<TaskId> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        self.registry.create_task()
    }

    /// Accept a task's links and enqueue one download job per URL
    ///
    /// Returns as soon as the links are accepted; the jobs are pushed from
    /// a spawned task so the caller never blocks on a full pipeline. That
    /// task races the cancellation token and exits silently if the pool
    /// goes away first.
    pub async fn submit_links(&self, id: TaskId, links: Vec<String>) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        if self.max_files > 0 && links.len() > self.max_files {
            return Err(Error::TooManyLinks {
                count: links.len(),
                limit: self.max_files,
            });
        }

        let accepted = self.registry.append_links(id, &links)?;

        let job_tx = match &*lock(&self.job_tx) {
            Some(tx) => tx.clone(),
            None => return Err(Error::ShuttingDown),
        };
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            for url in links {
                let job = DownloadJob { task_id: id, url };
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(task_id = %id, "enqueue aborted by shutdown");
                        return;
                    }
                    sent = job_tx.send(job) => {
                        if sent.is_err() {
                            tracing::debug!(task_id = %id, "enqueue stopped: pool input closed");
                            return;
                        }
                    }
                }
            }
        });

        Ok(accepted)
    }

    /// Snapshot a task's current state
    pub fn get_status(&self, id: TaskId) -> Result<TaskSnapshot> {
        self.registry.get(id)
    }

    /// Gracefully shut the service down
    ///
    /// Ordering is strict: fire the cancellation token, close the pool
    /// input, wait (bounded) for the workers to exit - which closes the
    /// result channel - then wait for the builder to drain it. Tasks that
    /// never completed stay non-`Done`; no partial archive is promoted.
    pub async fn shutdown(&self) {
        tracing::info!("initiating graceful shutdown");
        self.cancel.cancel();

        lock(&self.job_tx).take();
        tracing::info!("pool input closed");

        let pool = lock(&self.pool).take();
        if let Some(pool) = pool {
            if tokio::time::timeout(DRAIN_TIMEOUT, pool.join()).await.is_err() {
                tracing::warn!("timeout waiting for download workers to exit");
            }
        }

        let builder_handle = lock(&self.builder_handle).take();
        if let Some(handle) = builder_handle {
            match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "archive builder task failed"),
                Err(_) => tracing::warn!("timeout waiting for archive builder to drain"),
            }
        }

        tracing::info!("graceful shutdown complete");
    }
}

/// Lock a mutex, riding out poisoning (a panicked holder leaves the data
/// itself usable for these Option fields)
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorkerPoolConfig, ZipperConfig};
    use crate::types::TaskStatus;
    use std::time::Instant;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(archive_dir: &Path) -> Config {
        Config {
            worker_pool: WorkerPoolConfig {
                num_workers: 2,
                allowed_types: vec!["image/png".to_string()],
                max_file_size: 1024 * 1024,
                timeout: Duration::from_secs(5),
            },
            zipper: ZipperConfig {
                archive_path: archive_dir.to_path_buf(),
                max_files: 0,
            },
            ..Default::default()
        }
    }

    async fn mount_png(server: &MockServer, route: &str, body: &[u8]) {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", body.len().to_string().as_str()),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), "image/png"))
            .mount(server)
            .await;
    }

    async fn wait_until_done(service: &ZipperService, id: TaskId) -> TaskSnapshot {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = service.get_status(id).unwrap();
            if snapshot.status == TaskStatus::Done {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "task never reached Done");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn happy_path_single_task() {
        let dir = tempdir().unwrap();
        let server = MockServer::start().await;
        mount_png(&server, "/img/a.png", b"aaaa").await;
        mount_png(&server, "/img/b.png", b"bbbb").await;
        mount_png(&server, "/img/c.png", b"cccc").await;

        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        let id = service.create_task().unwrap();
        let accepted = service
            .submit_links(
                id,
                vec![
                    format!("{}/img/a.png", server.uri()),
                    format!("{}/img/b.png", server.uri()),
                    format!("{}/img/c.png", server.uri()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(accepted, 3);

        let snapshot = wait_until_done(&service, id).await;
        assert_eq!(snapshot.links_statuses.len(), 3);
        assert!(snapshot.links_error.is_empty());

        let archive = snapshot.archive_path.unwrap();
        let file = std::fs::File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 3);
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        for name in ["a.png", "b.png", "c.png"] {
            assert!(names.contains(&name.to_string()), "missing {}", name);
        }

        service.shutdown().await;
    }

    #[tokio::test]
    async fn mixed_outcomes_reach_done() {
        let dir = tempdir().unwrap();
        let server = MockServer::start().await;
        mount_png(&server, "/a.png", b"aaaa").await;
        mount_png(&server, "/b.png", b"bbbb").await;
        Mock::given(method("HEAD"))
            .and(path("/page.html"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html/>".to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        let id = service.create_task().unwrap();
        service
            .submit_links(
                id,
                vec![
                    format!("{}/a.png", server.uri()),
                    format!("{}/page.html", server.uri()),
                    format!("{}/b.png", server.uri()),
                ],
            )
            .await
            .unwrap();

        let snapshot = wait_until_done(&service, id).await;
        assert_eq!(snapshot.links_statuses.len(), 2);
        assert_eq!(snapshot.links_error.len(), 1);
        let reason = &snapshot.links_error[&format!("{}/page.html", server.uri())];
        assert_eq!(reason, "text/html type is not allowed");

        let file = std::fs::File::open(snapshot.archive_path.unwrap()).unwrap();
        let zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn admission_cap_rejects_the_fourth_task() {
        let dir = tempdir().unwrap();
        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        for _ in 0..3 {
            service.create_task().unwrap();
        }
        assert!(matches!(service.create_task(), Err(Error::Busy)));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn submission_is_one_shot() {
        let dir = tempdir().unwrap();
        let server = MockServer::start().await;
        mount_png(&server, "/a.png", b"aaaa").await;

        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        let id = service.create_task().unwrap();
        service
            .submit_links(id, vec![format!("{}/a.png", server.uri())])
            .await
            .unwrap();
        let second = service
            .submit_links(id, vec![format!("{}/a.png", server.uri())])
            .await;
        assert!(matches!(second, Err(Error::LinksAlreadySubmitted)));

        wait_until_done(&service, id).await;
        service.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_task_and_empty_links_are_rejected() {
        let dir = tempdir().unwrap();
        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        assert!(matches!(
            service
                .submit_links(TaskId::new(), vec!["http://x/a.png".to_string()])
                .await,
            Err(Error::NotFound)
        ));
        let id = service.create_task().unwrap();
        assert!(matches!(
            service.submit_links(id, vec![]).await,
            Err(Error::EmptyLinks)
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn max_files_caps_a_submission() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.zipper.max_files = 2;
        let service = ZipperService::new(&config).unwrap();
        let id = service.create_task().unwrap();
        let result = service
            .submit_links(
                id,
                vec![
                    "http://x/a.png".to_string(),
                    "http://x/b.png".to_string(),
                    "http://x/c.png".to_string(),
                ],
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::TooManyLinks { count: 3, limit: 2 })
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_mid_flight_abandons_the_task() {
        let dir = tempdir().unwrap();
        let server = MockServer::start().await;
        // a server slow enough that nothing completes before the cancel
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let service = ZipperService::new(&test_config(dir.path())).unwrap();
        let id = service.create_task().unwrap();
        service
            .submit_links(
                id,
                vec![
                    format!("{}/a.png", server.uri()),
                    format!("{}/b.png", server.uri()),
                    format!("{}/c.png", server.uri()),
                ],
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        service.shutdown().await;
        assert!(
            started.elapsed() < Duration::from_secs(6),
            "shutdown must not wait for the slow server"
        );

        // nothing was promoted and no new work is accepted
        let snapshot = service.get_status(id).unwrap();
        assert_ne!(snapshot.status, TaskStatus::Done);
        assert!(snapshot.archive_path.is_none());
        assert!(matches!(service.create_task(), Err(Error::ShuttingDown)));
        assert!(matches!(
            service
                .submit_links(id, vec!["http://x/a.png".to_string()])
                .await,
            Err(Error::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn archive_dir_is_created_on_startup() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("zips").join("out");
        let mut config = test_config(dir.path());
        config.zipper.archive_path = nested.clone();

        let service = ZipperService::new(&config).unwrap();
        assert!(nested.is_dir());
        service.shutdown().await;
    }
}
