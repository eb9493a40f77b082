//! Error types module
//!
//! `AppError` is the error surface of the host process. The record store,
//! the uploaders and the monitor each report their own errors; the host
//! converts them into `AppError` when setup fails before the loop starts.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::validation::NameError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions like a malformed file name
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid file name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Database(_) | AppError::Storage(_) | AppError::Io(_) => true,
            AppError::InvalidName(_) | AppError::Config(_) => false,
            AppError::Internal(_) | AppError::InternalWithSource { .. } => true,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::InvalidName(_) => LogLevel::Debug,
            AppError::Storage(_) | AppError::Io(_) => LogLevel::Warn,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => LogLevel::Error,
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}
