//! Database setup and initialization

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 4;
const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Open (creating if needed) the record store file and apply migrations.
pub async fn connect_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create record store directory {}", parent.display())
            })?;
        }
    }

    tracing::info!(path = %db_path.display(), "Opening record store");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open record store {}", db_path.display()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run record store migrations")?;
    tracing::debug!("Record store migrations applied");

    Ok(pool)
}
