use anyhow::Result;
use reelsync_core::{InflightGuard, MonitorConfig, UploadStatus, VideoRecord};
use reelsync_db::RecordRepository;
use reelsync_storage::progress::remove_sidecar;
use reelsync_storage::{progress_path, remote_key, OutcomeKind, Uploader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::retry::RetryPolicy;
use crate::scanner::Scanner;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The watched directory did not exist yet.
    pub waiting_for_folder: bool,
    pub reconciled: usize,
    pub admitted: usize,
    /// Dispatch was skipped because an upload looked in flight.
    pub in_flight: bool,
    pub dispatched: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub missing: usize,
    pub retained: usize,
}

/// The polling loop driving every record through its upload lifecycle.
///
/// The whole tick body runs under `lock`, so nothing else sharing that mutex
/// observes a half-finished pass.
pub struct Monitor {
    repo: RecordRepository,
    scanner: Scanner,
    uploader: Arc<dyn Uploader>,
    lock: Arc<Mutex<()>>,
    watch_dir: PathBuf,
    poll_interval: Duration,
    retention: chrono::Duration,
    inflight_guard: InflightGuard,
    retry: RetryPolicy,
    first_tick: AtomicBool,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        repo: RecordRepository,
        uploader: Arc<dyn Uploader>,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            scanner: Scanner::new(&config.watch_dir, repo.clone()),
            repo,
            uploader,
            lock,
            watch_dir: config.watch_dir.clone(),
            poll_interval: config.poll_interval(),
            retention: config.retention(),
            inflight_guard: config.inflight_guard,
            retry: RetryPolicy::from_config(config),
            first_tick: AtomicBool::new(true),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Tick until a message arrives on `shutdown` or its sender is dropped.
    ///
    /// A tick in progress always finishes first. Tick errors are logged and
    /// the loop carries on.
    pub async fn run_forever(&self, mut shutdown: mpsc::Receiver<()>) {
        tracing::info!(
            watch_dir = %self.watch_dir.display(),
            poll_interval_secs = self.poll_interval.as_secs(),
            backend = %self.uploader.backend_type(),
            "Monitor started"
        );

        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %format!("{:#}", e), "Tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Monitor shutting down");
                    break;
                }
            }
        }
    }

    /// One full pass: reconcile, admit, dispatch, retention.
    #[tracing::instrument(skip(self), fields(watch_dir = %self.watch_dir.display()))]
    pub async fn tick(&self) -> Result<TickSummary> {
        let _tick = self.lock.lock().await;
        let mut summary = TickSummary::default();

        if !tokio::fs::try_exists(&self.watch_dir).await.unwrap_or(false) {
            tracing::info!(
                watch_dir = %self.watch_dir.display(),
                "Waiting for producer to create folder"
            );
            summary.waiting_for_folder = true;
            return Ok(summary);
        }

        // Cleared only once a restart pass has reconciled every record.
        let after_restart = self.first_tick.load(Ordering::SeqCst);
        let in_flight = self.reconcile(after_restart, &mut summary).await?;
        if after_restart {
            self.first_tick.store(false, Ordering::SeqCst);
        }

        summary.admitted = self.scanner.discover().await?.len();

        if in_flight.is_empty() {
            for status in UploadStatus::DISPATCH_ORDER {
                for record in self.repo.list_by_status(status).await? {
                    self.dispatch(&record, status, &mut summary).await?;
                }
            }
        } else {
            tracing::info!(
                in_flight = ?in_flight,
                "Upload already in progress, skipping dispatch"
            );
            summary.in_flight = true;
        }

        summary.retained = self.sweep_retention().await?;

        tracing::info!(
            admitted = summary.admitted,
            reconciled = summary.reconciled,
            dispatched = summary.dispatched,
            uploaded = summary.uploaded,
            failed = summary.failed,
            retained = summary.retained,
            "Tick complete"
        );
        Ok(summary)
    }

    /// Move stale `Uploading` records to `Interrupted`; return those that
    /// still look in flight.
    async fn reconcile(&self, after_restart: bool, summary: &mut TickSummary) -> Result<Vec<String>> {
        let mut in_flight = Vec::new();

        for record in self.repo.list_by_status(UploadStatus::Uploading).await? {
            if !after_restart && self.looks_in_flight(&record).await {
                in_flight.push(record.file_name);
                continue;
            }

            self.repo
                .set_status(&record.file_name, UploadStatus::Interrupted)
                .await?;
            summary.reconciled += 1;
            tracing::info!(
                file_name = %record.file_name,
                after_restart,
                "Stale upload marked interrupted"
            );
        }

        Ok(in_flight)
    }

    async fn looks_in_flight(&self, record: &VideoRecord) -> bool {
        match self.inflight_guard {
            InflightGuard::Any => true,
            InflightGuard::Sidecar => {
                let path = self.watch_dir.join(&record.file_name);
                let sidecar = progress_path(&path, &record.file_name);
                exists(&path).await && exists(&sidecar).await
            }
        }
    }

    async fn dispatch(
        &self,
        record: &VideoRecord,
        expected: UploadStatus,
        summary: &mut TickSummary,
    ) -> Result<()> {
        let name = &record.file_name;
        let path = self.watch_dir.join(name);

        if !exists(&path).await {
            self.repo.mark_local_deleted(name).await?;
            summary.missing += 1;
            tracing::info!(file_name = %name, "File gone before upload, marked deleted");
            return Ok(());
        }

        // The listing is a snapshot; act only on what the store says now.
        match self.repo.find_by_name(name).await? {
            Some(current) if current.status == expected && !current.is_local_deleted => {}
            _ => {
                tracing::debug!(file_name = %name, "Record changed since listing, skipping");
                return Ok(());
            }
        }

        let key = match remote_key(name) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(file_name = %name, error = %e, "Cannot derive remote key");
                summary.failed += 1;
                return Ok(());
            }
        };

        summary.dispatched += 1;
        if self.upload_with_retry(&path, name, &key).await? {
            summary.uploaded += 1;
        } else {
            summary.failed += 1;
        }
        Ok(())
    }

    /// Returns `true` once the file is uploaded.
    #[tracing::instrument(skip(self, path))]
    async fn upload_with_retry(&self, path: &Path, name: &str, key: &str) -> Result<bool> {
        let mut attempt = 1;
        loop {
            self.repo.set_status(name, UploadStatus::Uploading).await?;
            let result = self.uploader.upload(path, name, key).await;

            let retryable = match result {
                Ok(outcome) if outcome.is_success() => {
                    self.repo.mark_uploaded(name).await?;
                    remove_sidecar(&progress_path(path, name)).await;
                    tracing::info!(
                        file_name = %name,
                        key = %key,
                        attempt,
                        "Upload complete"
                    );
                    return Ok(true);
                }
                Ok(outcome) => {
                    tracing::warn!(
                        file_name = %name,
                        attempt,
                        kind = %outcome.kind,
                        code = outcome.code,
                        detail = %outcome.detail,
                        "Upload attempt failed"
                    );
                    outcome.kind == OutcomeKind::Transient
                }
                Err(e) => {
                    tracing::warn!(
                        file_name = %name,
                        attempt,
                        error = %e,
                        "Upload attempt faulted"
                    );
                    true
                }
            };

            self.repo.set_status(name, UploadStatus::Interrupted).await?;

            if !retryable {
                tracing::error!(file_name = %name, "Permanent upload failure, not retrying");
                return Ok(false);
            }
            if !self.retry.should_retry(attempt) {
                tracing::warn!(
                    file_name = %name,
                    attempts = attempt,
                    "Giving up until a later tick"
                );
                return Ok(false);
            }

            self.retry.backoff(attempt).await;
            attempt += 1;
        }
    }

    /// Delete local copies uploaded longer ago than the retention window.
    async fn sweep_retention(&self) -> Result<usize> {
        let expired = self.repo.list_uploaded_older_than(self.retention).await?;
        let mut swept = 0;

        for record in expired {
            let path = self.watch_dir.join(&record.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(file_name = %record.file_name, "Retention removed local copy"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(file_name = %record.file_name, "Local copy already gone")
                }
                // The record is still marked below; the file is left orphaned.
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Retention could not delete local copy"
                ),
            }

            self.repo.mark_local_deleted(&record.file_name).await?;
            swept += 1;
        }

        Ok(swept)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
