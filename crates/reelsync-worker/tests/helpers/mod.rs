//! Shared fixtures for monitor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reelsync_core::{MonitorConfig, StorageBackend};
use reelsync_db::RecordRepository;
use reelsync_storage::{StorageError, StorageResult, UploadOutcome, Uploader};
use reelsync_worker::{Monitor, RetryPolicy};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Outcome(UploadOutcome),
    Fault(String),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub source_name: String,
    pub remote_key: String,
    pub at: Instant,
}

/// Uploader double that replays scripted replies and records every call.
///
/// Once the script runs out every call succeeds.
#[derive(Default)]
pub struct ScriptedUploader {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.source_name)
            .collect()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn upload(
        &self,
        _local_path: &Path,
        source_name: &str,
        remote_key: &str,
    ) -> StorageResult<UploadOutcome> {
        self.calls.lock().unwrap().push(Call {
            source_name: source_name.to_string(),
            remote_key: remote_key.to_string(),
            at: Instant::now(),
        });

        match self.script.lock().unwrap().pop_front() {
            Some(Reply::Outcome(outcome)) => Ok(outcome),
            Some(Reply::Fault(message)) => Err(StorageError::UploadFailed(message)),
            None => Ok(UploadOutcome::success("stored")),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub watch_dir: PathBuf,
    pub config: MonitorConfig,
    pub repo: RecordRepository,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let watch_dir = dir.path().join("game recordings").join("videos");
        tokio::fs::create_dir_all(&watch_dir).await.unwrap();
        let db_path = dir.path().join("game recordings").join("record.db");
        let repo = RecordRepository::connect(&db_path).await.unwrap();
        let config = MonitorConfig::new(&watch_dir, &db_path);

        Self {
            dir,
            watch_dir,
            config,
            repo,
        }
    }

    /// Monitor with millisecond backoff so retries stay fast.
    pub fn monitor(&self, uploader: Arc<ScriptedUploader>) -> Monitor {
        self.monitor_with(uploader)
    }

    pub fn monitor_with(&self, uploader: Arc<dyn Uploader>) -> Monitor {
        Monitor::new(
            &self.config,
            self.repo.clone(),
            uploader,
            Arc::new(tokio::sync::Mutex::new(())),
        )
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(20)))
    }

    pub async fn write_file(&self, name: &str) -> PathBuf {
        let path = self.watch_dir.join(name);
        tokio::fs::write(&path, b"recording").await.unwrap();
        path
    }

    pub async fn write_sidecar(&self, name: &str) -> PathBuf {
        let path = self.watch_dir.join(format!("{}.progress", name));
        tokio::fs::write(&path, b"{}").await.unwrap();
        path
    }
}
