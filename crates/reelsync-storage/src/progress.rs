//! Progress reporting and the on-disk progress sidecar.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::traits::{StorageError, StorageResult};

/// Default transfer chunk.
pub const PART_SIZE: usize = 4 * 1024 * 1024;
/// Chunk used once a file crosses [`LARGE_FILE_THRESHOLD`].
pub const LARGE_PART_SIZE: usize = 8 * 1024 * 1024;
pub const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Chunk size for a transfer of `total` bytes.
pub fn part_size_for(total: u64) -> usize {
    if total > LARGE_FILE_THRESHOLD {
        LARGE_PART_SIZE
    } else {
        PART_SIZE
    }
}

/// Receives transfer progress for operator display.
///
/// Fire-and-forget: implementations must not fail or block for long, and
/// nothing they do affects the upload outcome.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, transferred: u64, total: u64, label: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _transferred: u64, _total: u64, _label: &str) {}
}

/// Logs progress through `tracing`, once per `step_percent` crossed.
#[derive(Debug)]
pub struct TracingProgress {
    step_percent: u64,
    last_step: Mutex<HashMap<String, u64>>,
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TracingProgress {
    pub fn new(step_percent: u64) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            last_step: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the step to log, or `None` if this event stays in the last one.
    fn advance(&self, transferred: u64, total: u64, label: &str) -> Option<u64> {
        let percent = if total == 0 {
            100
        } else {
            (transferred.min(total) * 100) / total
        };
        let step = percent / self.step_percent;

        let mut last = self.last_step.lock().unwrap_or_else(PoisonError::into_inner);
        if percent >= 100 {
            last.remove(label);
            return Some(100);
        }
        match last.get(label) {
            Some(previous) if *previous >= step => None,
            _ => {
                last.insert(label.to_string(), step);
                Some(step * self.step_percent)
            }
        }
    }
}

impl ProgressReporter for TracingProgress {
    fn report(&self, transferred: u64, total: u64, label: &str) {
        if let Some(percent) = self.advance(transferred, total, label) {
            tracing::info!(
                file_name = %label,
                transferred_bytes = transferred,
                total_bytes = total,
                percent,
                "Upload progress"
            );
        }
    }
}

/// Content of a `.progress` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub key: String,
    pub parts_done: u64,
    pub bytes_done: u64,
    pub total: u64,
}

impl ProgressRecord {
    pub fn new(key: impl Into<String>, total: u64) -> Self {
        Self {
            key: key.into(),
            parts_done: 0,
            bytes_done: 0,
            total,
        }
    }

    /// Read a sidecar. A missing or unreadable one yields `None`.
    pub async fn load(path: &Path) -> Option<Self> {
        let raw = tokio::fs::read(path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable progress file"
                );
                None
            }
        }
    }

    pub async fn store(&self, path: &Path) -> StorageResult<()> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| StorageError::ProgressFile(format!("{}: {}", path.display(), e)))?;
        tokio::fs::write(path, payload).await.map_err(|e| {
            StorageError::ProgressFile(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

/// Remove a sidecar, logging instead of failing.
pub async fn remove_sidecar(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed progress file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove progress file"
        ),
    }
}
