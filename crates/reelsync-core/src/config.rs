//! Configuration module
//!
//! Monitor configuration is read from the environment (optionally seeded from a
//! `.env` file). Everything here is an opaque input to the monitor and the
//! uploader constructors.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_RETENTION_DAYS, RECORDINGS_FOLDER, RECORD_DB_FILE, VIDEOS_FOLDER,
};
use crate::storage_types::StorageBackend;

/// How the monitor decides that an upload is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InflightGuard {
    /// An `Uploading` record blocks dispatch only while both its file and its
    /// `.progress` sidecar exist; otherwise it is reconciled to `Interrupted`.
    #[default]
    Sidecar,
    /// Any `Uploading` record blocks dispatch for the tick.
    Any,
}

impl FromStr for InflightGuard {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sidecar" => Ok(InflightGuard::Sidecar),
            "any" => Ok(InflightGuard::Any),
            _ => Err(anyhow::anyhow!("Invalid in-flight guard mode: {}", s)),
        }
    }
}

impl Display for InflightGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            InflightGuard::Sidecar => write!(f, "sidecar"),
            InflightGuard::Any => write!(f, "any"),
        }
    }
}

/// `record.db` beside the watched directory.
pub fn default_db_path(watch_dir: &Path) -> PathBuf {
    watch_dir
        .parent()
        .map(|parent| parent.join(RECORD_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(RECORD_DB_FILE))
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub watch_dir: PathBuf,
    pub db_path: PathBuf,
    pub poll_interval_secs: u64,
    pub retention_days: u32,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub inflight_guard: InflightGuard,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub local_storage_path: Option<String>,
}

impl MonitorConfig {
    /// Config with defaults for everything except the two filesystem locations.
    pub fn new(watch_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            db_path: db_path.into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            inflight_guard: InflightGuard::default(),
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            local_storage_path: None,
        }
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let recordings_root = dirs::video_dir().map(|dir| dir.join(RECORDINGS_FOLDER));

        let watch_dir = match lookup("REELSYNC_WATCH_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => recordings_root
                .as_ref()
                .map(|root| root.join(VIDEOS_FOLDER))
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "No platform videos directory found; REELSYNC_WATCH_DIR must be set"
                    )
                })?,
        };

        // The record store sits beside the videos folder, not inside it.
        let db_path = match lookup("REELSYNC_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path(&watch_dir),
        };

        let poll_interval_secs = lookup("REELSYNC_POLL_INTERVAL_SECS")
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| anyhow::anyhow!("REELSYNC_POLL_INTERVAL_SECS must be a valid number"))?
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let retention_days = lookup("REELSYNC_RETENTION_DAYS")
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| anyhow::anyhow!("REELSYNC_RETENTION_DAYS must be a valid number"))?
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        let max_attempts = lookup("REELSYNC_MAX_ATTEMPTS")
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| anyhow::anyhow!("REELSYNC_MAX_ATTEMPTS must be a valid number"))?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let backoff_base_secs = lookup("REELSYNC_BACKOFF_BASE_SECS")
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| anyhow::anyhow!("REELSYNC_BACKOFF_BASE_SECS must be a valid number"))?
            .unwrap_or(DEFAULT_BACKOFF_BASE_SECS);

        let inflight_guard = lookup("REELSYNC_INFLIGHT_GUARD")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();

        let storage_backend = lookup("STORAGE_BACKEND")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(StorageBackend::S3);

        Ok(Self {
            watch_dir,
            db_path,
            poll_interval_secs,
            retention_days,
            max_attempts,
            backoff_base_secs,
            inflight_guard,
            storage_backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION"),
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_region: lookup("AWS_REGION"),
            aws_access_key_id: lookup("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "REELSYNC_POLL_INTERVAL_SECS must be greater than zero"
            ));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("REELSYNC_MAX_ATTEMPTS must be at least 1"));
        }

        if self.db_path.starts_with(&self.watch_dir) {
            return Err(anyhow::anyhow!(
                "REELSYNC_DB_PATH must not live inside the watched directory"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn s3_region_or_default(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("REELSYNC_WATCH_DIR", "/data/recordings/videos"),
            ("S3_BUCKET", "clips"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/data/recordings/videos"));
        assert_eq!(config.db_path, PathBuf::from("/data/recordings/record.db"));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.retention(), chrono::Duration::days(7));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.inflight_guard, InflightGuard::Sidecar);
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.s3_region_or_default(), Some("eu-west-1"));
        config.validate().unwrap();
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("REELSYNC_WATCH_DIR", "/w"),
            ("REELSYNC_DB_PATH", "/state/records.db"),
            ("REELSYNC_POLL_INTERVAL_SECS", "30"),
            ("REELSYNC_RETENTION_DAYS", "14"),
            ("REELSYNC_INFLIGHT_GUARD", "any"),
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/mnt/share"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/state/records.db"));
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.retention_days, 14);
        assert_eq!(config.inflight_guard, InflightGuard::Any);
        assert_eq!(config.storage_backend, StorageBackend::Local);
        config.validate().unwrap();
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = MonitorConfig::from_lookup(lookup_from(&[
            ("REELSYNC_WATCH_DIR", "/w"),
            ("REELSYNC_RETENTION_DAYS", "a week"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REELSYNC_RETENTION_DAYS"));

        for var in ["REELSYNC_MAX_ATTEMPTS", "REELSYNC_BACKOFF_BASE_SECS"] {
            let err = MonitorConfig::from_lookup(lookup_from(&[
                ("REELSYNC_WATCH_DIR", "/w"),
                (var, "three"),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains(var), "{}", err);
        }
    }

    #[test]
    fn validate_requires_backend_settings() {
        let config = MonitorConfig::new("/w/videos", "/w/record.db");
        assert!(config.validate().is_err());

        let mut local = MonitorConfig::new("/w/videos", "/w/record.db");
        local.storage_backend = StorageBackend::Local;
        assert!(local.validate().is_err());
        local.local_storage_path = Some("/mnt/share".into());
        local.validate().unwrap();
    }

    #[test]
    fn validate_rejects_store_inside_watch_dir() {
        let mut config = MonitorConfig::new("/w/videos", "/w/videos/record.db");
        config.storage_backend = StorageBackend::Local;
        config.local_storage_path = Some("/mnt/share".into());
        assert!(config.validate().is_err());
    }
}
