use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Upload lifecycle of a watched file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    NotUploaded,
    Uploading,
    Interrupted,
    Uploaded,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 4] = [
        UploadStatus::NotUploaded,
        UploadStatus::Uploading,
        UploadStatus::Interrupted,
        UploadStatus::Uploaded,
    ];

    /// Statuses the monitor dispatches from, in priority order.
    pub const DISPATCH_ORDER: [UploadStatus; 2] =
        [UploadStatus::Interrupted, UploadStatus::NotUploaded];
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::NotUploaded => write!(f, "not_uploaded"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Interrupted => write!(f, "interrupted"),
            UploadStatus::Uploaded => write!(f, "uploaded"),
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_uploaded" => Ok(UploadStatus::NotUploaded),
            "uploading" => Ok(UploadStatus::Uploading),
            "interrupted" => Ok(UploadStatus::Interrupted),
            "uploaded" => Ok(UploadStatus::Uploaded),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// One row of the record store, keyed by the source file name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VideoRecord {
    pub file_name: String,
    pub status: UploadStatus,
    /// Set only when the record enters `Uploaded`.
    pub upload_date: Option<DateTime<Utc>>,
    pub is_local_deleted: bool,
    /// Admission time; drives listing order.
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn is_uploaded(&self) -> bool {
        self.status == UploadStatus::Uploaded
    }
}

/// Number of records per status, locally deleted ones included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub not_uploaded: i64,
    pub uploading: i64,
    pub interrupted: i64,
    pub uploaded: i64,
    pub local_deleted: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: UploadStatus, count: i64) {
        match status {
            UploadStatus::NotUploaded => self.not_uploaded += count,
            UploadStatus::Uploading => self.uploading += count,
            UploadStatus::Interrupted => self.interrupted += count,
            UploadStatus::Uploaded => self.uploaded += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.not_uploaded + self.uploading + self.interrupted + self.uploaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in UploadStatus::ALL {
            assert_eq!(status.to_string().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("in_progress".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn interrupted_records_go_first() {
        assert_eq!(UploadStatus::DISPATCH_ORDER[0], UploadStatus::Interrupted);
        assert!(!UploadStatus::DISPATCH_ORDER.contains(&UploadStatus::Uploading));
    }

    #[test]
    fn counts_total_excludes_local_deleted_tally() {
        let mut counts = StatusCounts::default();
        counts.add(UploadStatus::Uploaded, 2);
        counts.add(UploadStatus::Interrupted, 1);
        counts.local_deleted = 2;
        assert_eq!(counts.total(), 3);
    }
}
