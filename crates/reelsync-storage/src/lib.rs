//! Reelsync Storage Library
//!
//! This crate provides the uploader abstraction the monitor dispatches to, and
//! implementations for S3-compatible object stores and a local directory.
//!
//! # Remote key format
//!
//! A watched file `<group>_<title>.<ext>` is stored under `<group>/<title>.<ext>`.
//! Key derivation lives in the `keys` module so every backend agrees.
//!
//! # Progress sidecar
//!
//! While a transfer runs, `<file>.progress` sits next to the source file. It is
//! guarded by a per-path lock ([`SidecarLocks`]) and removed once the upload is
//! confirmed.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod locks;
#[cfg(feature = "storage-s3")]
pub mod object;
pub mod progress;
pub mod traits;

// Re-export commonly used types
pub use factory::create_uploader;
pub use keys::{progress_path, remote_key};
#[cfg(feature = "storage-local")]
pub use local::LocalUploader;
pub use locks::{SidecarGuard, SidecarLocks};
#[cfg(feature = "storage-s3")]
pub use object::ObjectStoreUploader;
pub use progress::{NoopProgress, ProgressRecord, ProgressReporter, TracingProgress};
pub use reelsync_core::StorageBackend;
pub use traits::{
    classify_status_code, OutcomeKind, StorageError, StorageResult, UploadOutcome, Uploader,
};
