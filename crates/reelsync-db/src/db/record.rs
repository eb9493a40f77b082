use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use std::path::Path;

use reelsync_core::models::{StatusCounts, UploadStatus, VideoRecord};

use super::setup::connect_pool;

const RECORD_COLUMNS: &str = "file_name, status, upload_date, is_local_deleted, created_at";

/// Durable table of upload lifecycle records, keyed by file name.
///
/// Every method is a single statement, so each is atomic for the record it
/// touches. Callers serialize cross-record work themselves.
#[derive(Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the store at `db_path`, creating the file and schema if missing.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let pool = connect_pool(db_path).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a `NotUploaded` record unless one already exists.
    ///
    /// Returns `true` when a row was created.
    #[tracing::instrument(skip(self))]
    pub async fn upsert_new(&self, file_name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO video_records (file_name, status, upload_date, is_local_deleted, created_at)
            VALUES (?, ?, NULL, 0, ?)
            ON CONFLICT (file_name) DO NOTHING
            "#,
        )
        .bind(file_name)
        .bind(UploadStatus::NotUploaded.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert record for {}", file_name))?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::debug!(file_name = %file_name, "Record created");
        }
        Ok(inserted)
    }

    /// Records with `status` that are not locally deleted, in insertion order.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_status(&self, status: UploadStatus) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<Sqlite, VideoRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM video_records \
             WHERE status = ? AND is_local_deleted = 0 \
             ORDER BY rowid"
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list {} records", status))?;

        Ok(records)
    }

    /// Every record, locally deleted ones included, in insertion order.
    pub async fn list_all(&self) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<Sqlite, VideoRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM video_records ORDER BY rowid"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list records")?;

        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_name(&self, file_name: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<Sqlite, VideoRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM video_records WHERE file_name = ?"
        ))
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load record for {}", file_name))?;

        Ok(record)
    }

    /// Move a record to `status`. Returns `false` if no such record exists.
    ///
    /// `Uploaded` is refused here; use [`Self::mark_uploaded`] so the upload
    /// timestamp is written together with the status.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, file_name: &str, status: UploadStatus) -> Result<bool> {
        if status == UploadStatus::Uploaded {
            anyhow::bail!(
                "Refusing to set {} to uploaded without an upload date",
                file_name
            );
        }

        let result = sqlx::query("UPDATE video_records SET status = ? WHERE file_name = ?")
            .bind(status.to_string())
            .bind(file_name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to set {} to {}", file_name, status))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_uploaded(&self, file_name: &str) -> Result<bool> {
        self.mark_uploaded_at(file_name, Utc::now()).await
    }

    /// Move a record to `Uploaded` with an explicit upload time.
    #[tracing::instrument(skip(self))]
    pub async fn mark_uploaded_at(&self, file_name: &str, at: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE video_records SET status = ?, upload_date = ? WHERE file_name = ?")
                .bind(UploadStatus::Uploaded.to_string())
                .bind(at)
                .bind(file_name)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to mark {} as uploaded", file_name))?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_local_deleted(&self, file_name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE video_records SET is_local_deleted = 1 WHERE file_name = ?")
            .bind(file_name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to mark {} as locally deleted", file_name))?;

        Ok(result.rows_affected() > 0)
    }

    /// Uploaded, not locally deleted records whose upload date is older than `age`.
    #[tracing::instrument(skip(self))]
    pub async fn list_uploaded_older_than(&self, age: chrono::Duration) -> Result<Vec<VideoRecord>> {
        let cutoff = Utc::now() - age;
        let uploaded = self.list_by_status(UploadStatus::Uploaded).await?;

        Ok(uploaded
            .into_iter()
            .filter(|record| matches!(record.upload_date, Some(date) if date < cutoff))
            .collect())
    }

    pub async fn count_by_status(&self) -> Result<StatusCounts> {
        let rows: Vec<(UploadStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM video_records GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to count records by status")?;

        let (local_deleted,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM video_records WHERE is_local_deleted = 1")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count locally deleted records")?;

        let mut counts = StatusCounts {
            local_deleted,
            ..StatusCounts::default()
        };
        for (status, count) in rows {
            counts.add(status, count);
        }
        Ok(counts)
    }
}
