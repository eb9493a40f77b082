//! Reelsync Core Library
//!
//! This crate provides the domain model, error types, configuration, and file
//! name validation shared by the record store, the uploaders, and the monitor.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{InflightGuard, MonitorConfig};
pub use error::AppError;
pub use models::{UploadStatus, VideoRecord};
pub use storage_types::StorageBackend;
pub use validation::{parse_file_name, NameError, ParsedName};
