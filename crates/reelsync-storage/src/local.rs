use crate::keys::{check_key, progress_path};
use crate::locks::SidecarLocks;
use crate::progress::{part_size_for, remove_sidecar, ProgressRecord, ProgressReporter};
use crate::traits::{StorageError, StorageResult, UploadOutcome, Uploader};
use crate::StorageBackend;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Uploads into a directory tree, e.g. a mounted network share.
///
/// Data lands in `<dest>.part` first and is renamed into place once complete.
/// When a previous attempt left a matching progress file and partial copy,
/// the transfer resumes from the recorded offset.
#[derive(Clone)]
pub struct LocalUploader {
    root: PathBuf,
    locks: SidecarLocks,
    reporter: Arc<dyn ProgressReporter>,
    part_size: Option<usize>,
}

impl LocalUploader {
    /// Create the uploader, making sure `root` exists.
    pub async fn new(
        root: impl Into<PathBuf>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            locks: SidecarLocks::new(),
            reporter,
            part_size: None,
        })
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = Some(part_size.max(1));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` when the key would land outside `root`.
    fn key_to_path(&self, key: &str) -> Option<PathBuf> {
        check_key(key).then(|| self.root.join(key))
    }

    /// Offset to resume from; zero when the partial copy can't be trusted.
    async fn resume_offset(&self, sidecar: &Path, temp: &Path, key: &str, total: u64) -> u64 {
        let Some(record) = ProgressRecord::load(sidecar).await else {
            return 0;
        };
        if record.key != key || record.total != total || record.bytes_done > total {
            return 0;
        }
        match fs::metadata(temp).await {
            Ok(meta) if meta.len() == record.bytes_done => record.bytes_done,
            _ => 0,
        }
    }

    async fn copy(
        &self,
        local_path: &Path,
        sidecar: &Path,
        temp: &Path,
        key: &str,
        source_name: &str,
        total: u64,
    ) -> std::io::Result<ProgressRecord> {
        let part_size = self.part_size.unwrap_or_else(|| part_size_for(total));
        let offset = self.resume_offset(sidecar, temp, key, total).await;

        let mut source = fs::File::open(local_path).await?;
        let mut target = if offset > 0 {
            tracing::info!(key = %key, offset, total, "Resuming local upload");
            source.seek(SeekFrom::Start(offset)).await?;
            fs::OpenOptions::new().append(true).open(temp).await?
        } else {
            fs::File::create(temp).await?
        };

        let mut progress = ProgressRecord::new(key, total);
        progress.bytes_done = offset;
        progress.parts_done = offset / part_size as u64;
        self.reporter.report(offset, total, source_name);

        let mut buf = vec![0u8; part_size];
        loop {
            let mut filled = 0;
            while filled < buf.len() {
                let n = source.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }

            target.write_all(&buf[..filled]).await?;
            target.flush().await?;

            progress.parts_done += 1;
            progress.bytes_done += filled as u64;
            if let Err(e) = progress.store(sidecar).await {
                tracing::warn!(error = %e, "Failed to update progress file");
            }
            self.reporter
                .report(progress.bytes_done, total, source_name);
        }

        target.sync_all().await?;
        Ok(progress)
    }
}

/// Permission problems won't fix themselves; other IO failures might.
fn io_outcome(e: &std::io::Error) -> UploadOutcome {
    match e.kind() {
        std::io::ErrorKind::NotFound => UploadOutcome::permanent(404, e.to_string()),
        std::io::ErrorKind::PermissionDenied => UploadOutcome::permanent(403, e.to_string()),
        _ => UploadOutcome::transient(503, e.to_string()),
    }
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl Uploader for LocalUploader {
    #[tracing::instrument(skip(self, local_path), fields(root = %self.root.display()))]
    async fn upload(
        &self,
        local_path: &Path,
        source_name: &str,
        remote_key: &str,
    ) -> StorageResult<UploadOutcome> {
        let Some(dest) = self.key_to_path(remote_key) else {
            tracing::error!(key = %remote_key, "Storage key escapes the storage directory");
            return Ok(UploadOutcome::permanent(
                400,
                format!("invalid storage key: {}", remote_key),
            ));
        };
        let sidecar = progress_path(local_path, source_name);
        let _guard = self.locks.acquire(&sidecar).await;

        let total = match fs::metadata(local_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UploadOutcome::permanent(404, "source file not found"));
            }
            Err(e) => return Err(StorageError::IoError(e)),
        };

        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(io_outcome(&e));
            }
        }

        let start = std::time::Instant::now();
        let temp = temp_path(&dest);

        let progress = match self
            .copy(local_path, &sidecar, &temp, remote_key, source_name, total)
            .await
        {
            Ok(progress) => progress,
            Err(e) => {
                let outcome = io_outcome(&e);
                tracing::warn!(
                    key = %remote_key,
                    error = %e,
                    kind = %outcome.kind,
                    "Local upload failed"
                );
                return Ok(outcome);
            }
        };

        if let Err(e) = fs::rename(&temp, &dest).await {
            return Ok(io_outcome(&e));
        }

        remove_sidecar(&sidecar).await;

        tracing::info!(
            path = %dest.display(),
            key = %remote_key,
            size_bytes = progress.bytes_done,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(UploadOutcome::success(format!(
            "copied {} bytes to {}",
            progress.bytes_done,
            dest.display()
        )))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
