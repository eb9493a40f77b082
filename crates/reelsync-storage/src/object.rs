use crate::keys::{check_key, progress_path};
use crate::locks::SidecarLocks;
use crate::progress::{part_size_for, remove_sidecar, ProgressRecord, ProgressReporter};
use crate::traits::{StorageError, StorageResult, UploadOutcome, Uploader};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::Error as ObjectStoreError;
use object_store::{MultipartUpload, ObjectStoreExt, PutPayload};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Uploader backed by any `object_store` implementation (S3 and compatibles
/// in production, in-memory in tests).
///
/// Non-empty files go up as a multipart upload. A failed attempt aborts its
/// session, so the next call starts from the first part again.
#[derive(Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn object_store::ObjectStore>,
    label: String,
    locks: SidecarLocks,
    reporter: Arc<dyn ProgressReporter>,
    part_size: Option<usize>,
}

impl ObjectStoreUploader {
    pub fn new(
        store: Arc<dyn object_store::ObjectStore>,
        label: impl Into<String>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            store,
            label: label.into(),
            locks: SidecarLocks::new(),
            reporter,
            part_size: None,
        }
    }

    /// Build an S3 uploader.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `credentials` - Explicit access key pair; falls back to the AWS environment
    pub fn s3(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        credentials: Option<(String, String)>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        if let Some((access_key_id, secret_access_key)) = credentials {
            builder = builder
                .with_access_key_id(access_key_id)
                .with_secret_access_key(secret_access_key);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::new(
            Arc::new(store),
            format!("s3://{}", bucket),
            reporter,
        ))
    }

    /// Fix the part size instead of deriving it from the file length.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = Some(part_size.max(1));
        self
    }

    async fn put_small(&self, location: &ObjectPath, key: &str) -> UploadOutcome {
        match self.store.put(location, PutPayload::from(Bytes::new())).await {
            Ok(_) => UploadOutcome::success(format!("stored empty object at {}", key)),
            Err(e) => classify_store_error(&e),
        }
    }

    async fn send_parts(
        &self,
        local_path: &Path,
        sidecar: &Path,
        location: &ObjectPath,
        key: &str,
        source_name: &str,
        total: u64,
    ) -> StorageResult<UploadOutcome> {
        let part_size = self.part_size.unwrap_or_else(|| part_size_for(total));
        let mut progress = ProgressRecord::new(key, total);
        if let Err(e) = progress.store(sidecar).await {
            tracing::warn!(error = %e, "Continuing without progress file");
        }

        let mut upload = match self.store.put_multipart(location).await {
            Ok(upload) => upload,
            Err(e) => return Ok(classify_store_error(&e)),
        };

        let mut file = match tokio::fs::File::open(local_path).await {
            Ok(file) => file,
            Err(e) => {
                abort(upload.as_mut(), key).await;
                return missing_or_fault(e);
            }
        };

        self.reporter.report(0, total, source_name);

        loop {
            let mut chunk = Vec::with_capacity(part_size);
            let read = (&mut file)
                .take(part_size as u64)
                .read_to_end(&mut chunk)
                .await;
            let read = match read {
                Ok(n) => n,
                Err(e) => {
                    abort(upload.as_mut(), key).await;
                    return Err(StorageError::IoError(e));
                }
            };
            if read == 0 {
                break;
            }

            if let Err(e) = upload.put_part(PutPayload::from(Bytes::from(chunk))).await {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    part = progress.parts_done + 1,
                    "Part upload failed"
                );
                abort(upload.as_mut(), key).await;
                return Ok(classify_store_error(&e));
            }

            progress.parts_done += 1;
            progress.bytes_done += read as u64;
            if let Err(e) = progress.store(sidecar).await {
                tracing::warn!(error = %e, "Failed to update progress file");
            }
            self.reporter
                .report(progress.bytes_done, total, source_name);
        }

        if let Err(e) = upload.complete().await {
            tracing::warn!(error = %e, key = %key, "Completing multipart upload failed");
            abort(upload.as_mut(), key).await;
            return Ok(classify_store_error(&e));
        }

        Ok(UploadOutcome::success(format!(
            "stored {} bytes in {} parts at {}",
            progress.bytes_done, progress.parts_done, key
        )))
    }
}

async fn abort(upload: &mut dyn MultipartUpload, key: &str) {
    if let Err(e) = upload.abort().await {
        tracing::debug!(error = %e, key = %key, "Multipart abort failed");
    }
}

/// A vanished source is permanent; any other open failure is a fault.
fn missing_or_fault(e: std::io::Error) -> StorageResult<UploadOutcome> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(UploadOutcome::permanent(404, "source file not found"))
    } else {
        Err(StorageError::IoError(e))
    }
}

/// Map an object store error onto the outcome classes.
pub fn classify_store_error(err: &ObjectStoreError) -> UploadOutcome {
    let detail = err.to_string();
    match err {
        ObjectStoreError::NotFound { .. } => UploadOutcome::permanent(404, detail),
        ObjectStoreError::PermissionDenied { .. } => UploadOutcome::permanent(403, detail),
        ObjectStoreError::Unauthenticated { .. } => UploadOutcome::permanent(401, detail),
        ObjectStoreError::AlreadyExists { .. } => UploadOutcome::permanent(409, detail),
        ObjectStoreError::Precondition { .. } => UploadOutcome::permanent(412, detail),
        ObjectStoreError::InvalidPath { .. }
        | ObjectStoreError::NotSupported { .. }
        | ObjectStoreError::NotImplemented { .. }
        | ObjectStoreError::UnknownConfigurationKey { .. } => UploadOutcome::permanent(400, detail),
        _ => UploadOutcome::transient(503, detail),
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    #[tracing::instrument(skip(self, local_path), fields(store = %self.label))]
    async fn upload(
        &self,
        local_path: &Path,
        source_name: &str,
        remote_key: &str,
    ) -> StorageResult<UploadOutcome> {
        if !check_key(remote_key) {
            tracing::error!(key = %remote_key, "Storage key escapes the object prefix");
            return Ok(UploadOutcome::permanent(
                400,
                format!("invalid storage key: {}", remote_key),
            ));
        }

        let sidecar = progress_path(local_path, source_name);
        let _guard = self.locks.acquire(&sidecar).await;

        let total = match tokio::fs::metadata(local_path).await {
            Ok(meta) => meta.len(),
            Err(e) => return missing_or_fault(e),
        };

        let start = std::time::Instant::now();
        let location = ObjectPath::from(remote_key);

        let outcome = if total == 0 {
            self.put_small(&location, remote_key).await
        } else {
            self.send_parts(local_path, &sidecar, &location, remote_key, source_name, total)
                .await?
        };

        if outcome.is_success() {
            remove_sidecar(&sidecar).await;
            tracing::info!(
                key = %remote_key,
                size_bytes = total,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Object store upload successful"
            );
        } else {
            tracing::warn!(
                key = %remote_key,
                kind = %outcome.kind,
                code = outcome.code,
                detail = %outcome.detail,
                "Object store upload failed"
            );
        }

        Ok(outcome)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::OutcomeKind;
    use object_store::memory::InMemory;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, u64)>>);

    impl ProgressReporter for Recorder {
        fn report(&self, transferred: u64, total: u64, _label: &str) {
            self.0.lock().unwrap().push((transferred, total));
        }
    }

    async fn stored(store: &InMemory, key: &str) -> Vec<u8> {
        store
            .get(&ObjectPath::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn multipart_upload_stores_whole_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("alpha_clip1.mp4");
        let body: Vec<u8> = (0..10u8).collect();
        tokio::fs::write(&source, &body).await.unwrap();

        let store = Arc::new(InMemory::new());
        let recorder = Arc::new(Recorder::default());
        let uploader = ObjectStoreUploader::new(store.clone(), "memory", recorder.clone())
            .with_part_size(4);

        let outcome = uploader
            .upload(&source, "alpha_clip1.mp4", "alpha/clip1.mp4")
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome);
        assert_eq!(stored(&store, "alpha/clip1.mp4").await, body);
        assert!(!dir.path().join("alpha_clip1.mp4.progress").exists());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(0, 10), (4, 10), (8, 10), (10, 10)]
        );
    }

    #[tokio::test]
    async fn empty_file_is_a_single_put() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("alpha_empty.mp4");
        tokio::fs::write(&source, b"").await.unwrap();

        let store = Arc::new(InMemory::new());
        let uploader = ObjectStoreUploader::new(store.clone(), "memory", Arc::new(NoopProgress));

        let outcome = uploader
            .upload(&source, "alpha_empty.mp4", "alpha/empty.mp4")
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(stored(&store, "alpha/empty.mp4").await.is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_permanent() {
        let dir = TempDir::new().unwrap();
        let uploader =
            ObjectStoreUploader::new(Arc::new(InMemory::new()), "memory", Arc::new(NoopProgress));

        let outcome = uploader
            .upload(
                &dir.path().join("alpha_gone.mp4"),
                "alpha_gone.mp4",
                "alpha/gone.mp4",
            )
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Permanent);
        assert_eq!(outcome.code, 404);
    }

    #[tokio::test]
    async fn traversal_key_is_permanent() {
        let dir = TempDir::new().unwrap();
        let uploader =
            ObjectStoreUploader::new(Arc::new(InMemory::new()), "memory", Arc::new(NoopProgress));
        let outcome = uploader
            .upload(&dir.path().join("a_b.mp4"), "a_b.mp4", "../b.mp4")
            .await
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Permanent);
        assert_eq!(outcome.code, 400);
    }

    #[test]
    fn store_errors_classify() {
        let not_found = ObjectStoreError::NotFound {
            path: "alpha/clip1.mp4".into(),
            source: "missing".into(),
        };
        assert_eq!(classify_store_error(&not_found).kind, OutcomeKind::Permanent);

        let generic = ObjectStoreError::Generic {
            store: "S3",
            source: "connection reset".into(),
        };
        let outcome = classify_store_error(&generic);
        assert_eq!(outcome.kind, OutcomeKind::Transient);
        assert_eq!(outcome.code, 503);
    }
}
