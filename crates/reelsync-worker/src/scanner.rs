//! Admission of new files from the watched directory.
//!
//! A file is admitted once nobody else holds it open exclusively and its name
//! has the `<group>_<title>.<ext>` shape. Badly named files are deleted.

use anyhow::{Context, Result};
use reelsync_core::constants::PROGRESS_SUFFIX;
use reelsync_core::validation::parse_file_name;
use reelsync_db::RecordRepository;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// Result of the exclusive-open probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    /// Another process still has the file; try again next tick.
    Busy,
}

/// Try to open `path` exclusively without waiting.
///
/// Contention is reported as [`Probe::Busy`]; anything else that stops the
/// open is an error.
pub async fn probe(path: &Path) -> io::Result<Probe> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe_blocking(&path))
        .await
        .map_err(io::Error::other)?
}

#[cfg(unix)]
fn probe_blocking(path: &Path) -> io::Result<Probe> {
    let file = std::fs::File::open(path)?;

    // Fully qualified so std's File::try_lock_exclusive (1.89+) is not picked.
    match fs2::FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            fs2::FileExt::unlock(&file)?;
            Ok(Probe::Ready)
        }
        Err(e) if is_contended(&e) => Ok(Probe::Busy),
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
fn probe_blocking(path: &Path) -> io::Result<Probe> {
    use std::os::windows::fs::OpenOptionsExt;

    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    const SHARING_VIOLATION: i32 = 32;
    const LOCK_VIOLATION: i32 = 33;

    match std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)
    {
        Ok(_file) => Ok(Probe::Ready),
        Err(e) if matches!(e.raw_os_error(), Some(SHARING_VIOLATION | LOCK_VIOLATION)) => {
            Ok(Probe::Busy)
        }
        Err(e) if is_contended(&e) => Ok(Probe::Busy),
        Err(e) => Err(e),
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// `.progress` sidecars are never media files.
pub fn is_progress_file(name: &str) -> bool {
    name.to_lowercase().ends_with(PROGRESS_SUFFIX)
}

/// Enumerates the watched directory and admits new files into the store.
#[derive(Clone)]
pub struct Scanner {
    watch_dir: PathBuf,
    repo: RecordRepository,
}

impl Scanner {
    pub fn new(watch_dir: impl Into<PathBuf>, repo: RecordRepository) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            repo,
        }
    }

    /// Admit every new, released, well-named file. Returns the admitted names.
    #[tracing::instrument(skip(self), fields(watch_dir = %self.watch_dir.display()))]
    pub async fn discover(&self) -> Result<Vec<String>> {
        let known: HashSet<String> = self
            .repo
            .list_all()
            .await?
            .into_iter()
            .map(|record| record.file_name)
            .collect();

        let mut admitted = Vec::new();
        for name in self.candidates().await? {
            if is_progress_file(&name) || known.contains(&name) {
                continue;
            }

            let path = self.watch_dir.join(&name);
            match probe(&path).await {
                Ok(Probe::Ready) => {}
                Ok(Probe::Busy) => {
                    tracing::debug!(file_name = %name, "File still in use, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(file_name = %name, error = %e, "Cannot open file, skipping");
                    continue;
                }
            }

            if let Err(e) = parse_file_name(&name) {
                self.reject(&path, &name, &e.to_string()).await;
                continue;
            }

            if self.repo.upsert_new(&name).await? {
                tracing::info!(file_name = %name, "New file admitted");
                admitted.push(name);
            }
        }

        Ok(admitted)
    }

    /// Regular files directly inside the watched directory, sorted by name.
    async fn candidates(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.watch_dir)
            .await
            .with_context(|| format!("Failed to list {}", self.watch_dir.display()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", self.watch_dir.display()))?
        {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping entry");
                    continue;
                }
            };
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!(file_name = ?raw, "Skipping file with a non UTF-8 name");
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn reject(&self, path: &Path, name: &str, reason: &str) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::warn!(
                file_name = %name,
                reason = %reason,
                "Deleted file with invalid name"
            ),
            Err(e) => tracing::warn!(
                file_name = %name,
                reason = %reason,
                error = %e,
                "Invalid file name, and deleting it failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsync_core::UploadStatus;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, PathBuf, Scanner, RecordRepository) {
        let dir = TempDir::new().unwrap();
        let watch = dir.path().join("videos");
        tokio::fs::create_dir_all(&watch).await.unwrap();
        let repo = RecordRepository::connect(&dir.path().join("record.db"))
            .await
            .unwrap();
        let scanner = Scanner::new(&watch, repo.clone());
        (dir, watch, scanner, repo)
    }

    #[test]
    fn progress_suffix_is_case_insensitive() {
        assert!(is_progress_file("a_b.mp4.progress"));
        assert!(is_progress_file("a_b.mp4.PROGRESS"));
        assert!(!is_progress_file("a_b.mp4"));
    }

    #[tokio::test]
    async fn admits_valid_names_as_not_uploaded() {
        let (_dir, watch, scanner, repo) = setup().await;
        tokio::fs::write(watch.join("alpha_clip1.mp4"), b"data").await.unwrap();

        let admitted = scanner.discover().await.unwrap();
        assert_eq!(admitted, vec!["alpha_clip1.mp4".to_string()]);

        let record = repo.find_by_name("alpha_clip1.mp4").await.unwrap().unwrap();
        assert_eq!(record.status, UploadStatus::NotUploaded);
        assert!(!record.is_local_deleted);
    }

    #[tokio::test]
    async fn admission_is_idempotent() {
        let (_dir, watch, scanner, repo) = setup().await;
        tokio::fs::write(watch.join("alpha_clip1.mp4"), b"data").await.unwrap();

        scanner.discover().await.unwrap();
        let again = scanner.discover().await.unwrap();

        assert!(again.is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_names_are_deleted_and_never_recorded() {
        let (_dir, watch, scanner, repo) = setup().await;
        tokio::fs::write(watch.join("bad name.mp4"), b"data").await.unwrap();
        tokio::fs::write(watch.join("noextension_file"), b"data").await.unwrap();

        let admitted = scanner.discover().await.unwrap();

        assert!(admitted.is_empty());
        assert!(!watch.join("bad name.mp4").exists());
        assert!(!watch.join("noextension_file").exists());
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sidecars_and_directories_are_ignored() {
        let (_dir, watch, scanner, repo) = setup().await;
        tokio::fs::write(watch.join("alpha_clip1.mp4.progress"), b"{}")
            .await
            .unwrap();
        tokio::fs::create_dir_all(watch.join("alpha_folder.d"))
            .await
            .unwrap();

        assert!(scanner.discover().await.unwrap().is_empty());
        // Sidecars must survive admission even though their names don't parse.
        assert!(watch.join("alpha_clip1.mp4.progress").exists());
        assert!(watch.join("alpha_folder.d").exists());
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn locked_files_are_busy_until_released() {
        let (_dir, watch, scanner, repo) = setup().await;
        let path = watch.join("alpha_clip1.mp4");
        tokio::fs::write(&path, b"data").await.unwrap();

        let writer = std::fs::File::open(&path).unwrap();
        fs2::FileExt::lock_exclusive(&writer).unwrap();

        assert_eq!(probe(&path).await.unwrap(), Probe::Busy);
        assert!(scanner.discover().await.unwrap().is_empty());
        assert!(repo.find_by_name("alpha_clip1.mp4").await.unwrap().is_none());

        drop(writer);
        assert_eq!(probe(&path).await.unwrap(), Probe::Ready);
        assert_eq!(scanner.discover().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_a_probe_error() {
        let dir = TempDir::new().unwrap();
        assert!(probe(&dir.path().join("gone_file.mp4")).await.is_err());
    }
}
