//! Uploader abstraction trait
//!
//! This module defines the Uploader trait that every remote backend implements,
//! and the outcome type the monitor branches on.

use crate::StorageBackend;
use async_trait::async_trait;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use thiserror::Error;

/// Faults raised by an uploader instead of returning an outcome.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Progress file error: {0}")]
    ProgressFile(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for uploader operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for reelsync_core::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConfigError(msg) => reelsync_core::AppError::Config(msg),
            other => reelsync_core::AppError::Storage(other.to_string()),
        }
    }
}

/// Three-way classification of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    /// Worth retrying: server errors, throttling, timeouts.
    Transient,
    /// Retrying will not help: missing source, bad request, denied.
    Permanent,
}

impl Display for OutcomeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Transient => write!(f, "transient"),
            OutcomeKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// What the uploader reports back. `code` follows HTTP status semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub kind: OutcomeKind,
    pub code: u16,
    pub detail: String,
}

impl UploadOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            code: 200,
            detail: detail.into(),
        }
    }

    pub fn transient(code: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Transient,
            code,
            detail: detail.into(),
        }
    }

    pub fn permanent(code: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Permanent,
            code,
            detail: detail.into(),
        }
    }

    /// Build an outcome whose kind follows from an HTTP-like status code.
    pub fn from_status_code(code: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: classify_status_code(code),
            code,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// 2xx succeeds; 5xx, 429 and 408 are transient; everything else is permanent.
pub fn classify_status_code(code: u16) -> OutcomeKind {
    match code {
        200..=299 => OutcomeKind::Success,
        408 | 429 => OutcomeKind::Transient,
        code if code >= 500 => OutcomeKind::Transient,
        _ => OutcomeKind::Permanent,
    }
}

/// Uploader abstraction trait
///
/// The monitor only sees the classified outcome; chunking, sessions and
/// credentials stay inside the implementation. Returning `Err` means the call
/// faulted rather than finished, and the monitor treats it like a transient
/// failure.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer `local_path` to `remote_key`.
    ///
    /// `source_name` is the watched file name; it names the progress sidecar
    /// and labels progress events.
    async fn upload(
        &self,
        local_path: &Path,
        source_name: &str,
        remote_key: &str,
    ) -> StorageResult<UploadOutcome>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
