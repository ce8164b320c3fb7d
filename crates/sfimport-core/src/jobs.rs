//! Import job lifecycle types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Lifecycle state of an [`ImportJob`].
///
/// `Pending → Processing → {Completed, Failed, Cancelled}`. A pending job may
/// also be cancelled before a worker picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for states a job never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Only jobs that have not finished can be cancelled.
    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Only jobs that ended without completing can be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            // Older rows were written with the American spelling.
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(CoreError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// Container format of an uploaded catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Xml,
    Csv,
    Zip,
}

impl FileType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Xml => "xml",
            FileType::Csv => "csv",
            FileType::Zip => "zip",
        }
    }

    /// Infers the file type from a file name's extension (case-insensitive).
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        ext.parse().ok()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xml" => Ok(FileType::Xml),
            "csv" => Ok(FileType::Csv),
            "zip" => Ok(FileType::Zip),
            other => Err(CoreError::UnsupportedFileType(other.to_string())),
        }
    }
}

/// Conflict policy applied when an imported SKU already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    CreateOnly,
    UpdateOnly,
    #[default]
    Upsert,
}

impl UpdateMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateMode::CreateOnly => "create_only",
            UpdateMode::UpdateOnly => "update_only",
            UpdateMode::Upsert => "upsert",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_only" => Ok(UpdateMode::CreateOnly),
            "update_only" => Ok(UpdateMode::UpdateOnly),
            "upsert" => Ok(UpdateMode::Upsert),
            other => Err(CoreError::InvalidUpdateMode(other.to_string())),
        }
    }
}

/// How external category paths are resolved during an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryMappingMode {
    /// Persisted mapping, then AI detection, then the default category.
    #[default]
    Auto,
    /// Persisted mappings only; never calls the classifier.
    Manual,
    /// No category resolution at all.
    Skip,
}

impl CategoryMappingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryMappingMode::Auto => "auto",
            CategoryMappingMode::Manual => "manual",
            CategoryMappingMode::Skip => "skip",
        }
    }
}

impl fmt::Display for CategoryMappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryMappingMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CategoryMappingMode::Auto),
            "manual" => Ok(CategoryMappingMode::Manual),
            "skip" => Ok(CategoryMappingMode::Skip),
            other => Err(CoreError::InvalidCategoryMappingMode(other.to_string())),
        }
    }
}

/// Submission options attached to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub category_mapping_mode: CategoryMappingMode,
}

/// Record counters tracked on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCounters {
    pub total_records: i32,
    pub processed_records: i32,
    pub successful_records: i32,
    pub failed_records: i32,
}

/// One catalog import, from submission to terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: i64,
    pub public_id: Uuid,
    pub storefront_id: i64,
    pub user_id: i64,
    pub file_name: Option<String>,
    pub file_type: FileType,
    pub file_url: Option<String>,
    pub status: JobStatus,
    pub options: ImportOptions,
    pub counters: JobCounters,
    /// Top-level failure reason, or a summary when some records failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Percentage of records processed, `0.0` while the total is unknown.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.counters.total_records <= 0 {
            return 0.0;
        }
        f64::from(self.counters.processed_records) / f64::from(self.counters.total_records)
            * 100.0
    }
}

/// Fields needed to create a job; everything else is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub storefront_id: i64,
    pub user_id: i64,
    pub file_name: Option<String>,
    pub file_type: FileType,
    pub file_url: Option<String>,
    pub options: ImportOptions,
}

/// A persisted per-record failure attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    pub job_id: i64,
    pub line_number: i32,
    pub field_name: String,
    pub error_message: String,
    pub raw_data: Option<String>,
}

/// Polling view of a job: the record, its progress and its error rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJobStatus {
    pub job: ImportJob,
    pub progress: f64,
    pub errors: Vec<ImportError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(total: i32, processed: i32) -> ImportJob {
        ImportJob {
            id: 1,
            public_id: Uuid::new_v4(),
            storefront_id: 7,
            user_id: 3,
            file_name: Some("catalog.csv".to_string()),
            file_type: FileType::Csv,
            file_url: None,
            status: JobStatus::Processing,
            options: ImportOptions::default(),
            counters: JobCounters {
                total_records: total,
                processed_records: processed,
                ..JobCounters::default()
            },
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn job_status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
    }

    #[test]
    fn job_status_accepts_american_spelling() {
        assert_eq!("canceled".parse::<JobStatus>(), Ok(JobStatus::Cancelled));
    }

    #[test]
    fn job_status_rejects_unknown() {
        assert_eq!(
            "running".parse::<JobStatus>(),
            Err(CoreError::InvalidJobStatus("running".to_string()))
        );
    }

    #[test]
    fn only_unfinished_jobs_are_cancellable() {
        assert!(JobStatus::Pending.is_cancellable());
        assert!(JobStatus::Processing.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
        assert!(!JobStatus::Failed.is_cancellable());
        assert!(!JobStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn only_failed_or_cancelled_jobs_are_retryable() {
        assert!(JobStatus::Failed.is_retryable());
        assert!(JobStatus::Cancelled.is_retryable());
        assert!(!JobStatus::Completed.is_retryable());
        assert!(!JobStatus::Pending.is_retryable());
    }

    #[test]
    fn file_type_from_file_name_is_case_insensitive() {
        assert_eq!(FileType::from_file_name("Catalog.XML"), Some(FileType::Xml));
        assert_eq!(FileType::from_file_name("export.csv"), Some(FileType::Csv));
        assert_eq!(FileType::from_file_name("bundle.zip"), Some(FileType::Zip));
        assert_eq!(FileType::from_file_name("notes.txt"), None);
        assert_eq!(FileType::from_file_name("no_extension"), None);
    }

    #[test]
    fn update_mode_defaults_to_upsert() {
        assert_eq!(UpdateMode::default(), UpdateMode::Upsert);
        assert_eq!(CategoryMappingMode::default(), CategoryMappingMode::Auto);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ImportOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ImportOptions::default());

        let opts: ImportOptions =
            serde_json::from_str(r#"{"update_mode":"create_only","category_mapping_mode":"skip"}"#)
                .unwrap();
        assert_eq!(opts.update_mode, UpdateMode::CreateOnly);
        assert_eq!(opts.category_mapping_mode, CategoryMappingMode::Skip);
    }

    #[test]
    fn progress_is_zero_without_total() {
        assert!(make_job(0, 0).progress().abs() < f64::EPSILON);
    }

    #[test]
    fn progress_is_percentage_of_total() {
        assert!((make_job(200, 50).progress() - 25.0).abs() < f64::EPSILON);
    }
}
