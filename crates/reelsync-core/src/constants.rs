//! Application-wide constants.

/// Suffix of the sidecar file that tracks a resumable transfer for `<file>`.
pub const PROGRESS_SUFFIX: &str = ".progress";

/// Folder under the platform videos directory where the producer writes.
pub const RECORDINGS_FOLDER: &str = "game recordings";

/// Sub-folder of [`RECORDINGS_FOLDER`] holding finished clips.
pub const VIDEOS_FOLDER: &str = "videos";

/// Record store file name, kept next to the videos folder.
pub const RECORD_DB_FILE: &str = "record.db";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;
