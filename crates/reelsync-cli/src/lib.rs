use reelsync_core::error::LogLevel;
use reelsync_core::models::StatusCounts;
use reelsync_core::{AppError, VideoRecord};
use serde::Serialize;

/// Log a setup failure at the level its kind calls for.
pub fn log_error(error: &AppError) {
    let recoverable = error.is_recoverable();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, recoverable, "Startup failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, recoverable, "Startup failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, recoverable, "Startup failed");
        }
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Everything `reelsync status` prints.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub records: Vec<VideoRecord>,
    pub counts: StatusCounts,
}

/// Render records and counts as a fixed-width table.
pub fn render_table(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:<13} {:<20} {}\n",
        "FILE", "STATUS", "UPLOADED AT", "LOCAL"
    ));

    for record in &report.records {
        let uploaded_at = record
            .upload_date
            .map(|date| date.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let local = if record.is_local_deleted { "deleted" } else { "present" };
        out.push_str(&format!(
            "{:<40} {:<13} {:<20} {}\n",
            truncate_string(&record.file_name, 40),
            record.status.to_string(),
            uploaded_at,
            local
        ));
    }

    let counts = &report.counts;
    out.push_str(&format!(
        "\n{} records: {} not uploaded, {} uploading, {} interrupted, {} uploaded ({} deleted locally)\n",
        counts.total(),
        counts.not_uploaded,
        counts.uploading,
        counts.interrupted,
        counts.uploaded,
        counts.local_deleted
    ));
    out
}
