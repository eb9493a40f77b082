#[cfg(feature = "storage-local")]
use crate::LocalUploader;
#[cfg(feature = "storage-s3")]
use crate::ObjectStoreUploader;
use crate::{ProgressReporter, StorageBackend, StorageError, StorageResult, Uploader};
use reelsync_core::MonitorConfig;
use std::sync::Arc;

/// Create the uploader selected by configuration
pub async fn create_uploader(
    config: &MonitorConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> StorageResult<Arc<dyn Uploader>> {
    match config.storage_backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region_or_default()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;
            let credentials = match (
                config.aws_access_key_id.clone(),
                config.aws_secret_access_key.clone(),
            ) {
                (Some(key), Some(secret)) => Some((key, secret)),
                _ => None,
            };

            let uploader = ObjectStoreUploader::s3(
                bucket,
                region,
                config.s3_endpoint.clone(),
                credentials,
                reporter,
            )?;
            Ok(Arc::new(uploader))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let root = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let uploader = LocalUploader::new(root, reporter).await?;
            Ok(Arc::new(uploader))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
