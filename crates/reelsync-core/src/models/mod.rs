//! Domain models

pub mod record;

pub use record::{StatusCounts, UploadStatus, VideoRecord};
