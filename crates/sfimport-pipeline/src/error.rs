use sfimport_core::{JobStatus, StoreError};
use sfimport_mapping::MappingError;
use sfimport_parser::ParseError;
use thiserror::Error;

use crate::download::DownloadError;

/// Rejections from [`crate::ImportQueueManager`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The bounded queue is at capacity. Retryable.
    #[error("import queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("import queue is not running")]
    NotRunning,

    #[error("import queue is already running")]
    AlreadyRunning,

    /// The job is already queued or being processed.
    #[error("job {0} is already queued")]
    AlreadyQueued(i64),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A catalog URL could not be fetched. No job was created.
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("importing from a URL is not configured")]
    DownloadsDisabled,

    #[error("job {0} was uploaded, not fetched; supply the file to retry it")]
    MissingSourceUrl(i64),

    #[error("import job {0} not found")]
    JobNotFound(i64),

    #[error("cannot {action} job {job_id} in status {status}")]
    InvalidTransition {
        job_id: i64,
        status: JobStatus,
        action: &'static str,
    },

    /// The job was created but could not be queued; it has been marked
    /// failed. Submitting again later may succeed.
    #[error("import queue is full; job {job_id} was not started")]
    QueueFull { job_id: i64 },

    #[error("import queue is not running; job {job_id} was not started")]
    QueueNotRunning { job_id: i64 },

    #[error("job {0} is already queued")]
    AlreadyQueued(i64),
}

impl PipelineError {
    /// Whether the caller may reasonably submit the same request again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::QueueFull { .. })
    }
}
