//! Import job queue, worker orchestration and the caller-facing service.
//!
//! A submitted file, uploaded or fetched from a URL, becomes a `pending`
//! [`sfimport_core::ImportJob`] and an [`ImportTask`] on a bounded queue. A
//! fixed pool of workers drains the queue; each job is driven through
//! parsing, variant grouping, category and attribute mapping and product
//! persistence by exactly one worker.

pub mod download;
pub mod error;
pub mod queue;
pub mod service;
pub mod traits;
pub mod worker;

pub use download::{CatalogDownloader, DownloadConfig, DownloadError, DownloadedCatalog};
pub use error::{PipelineError, QueueError};
pub use queue::{ImportQueueManager, ImportTask, QueueConfig, QueueStats};
pub use service::{
    CategoryAnalysis, ImportPreview, ImportService, ImportSubmission, UrlSubmission,
};
pub use traits::{ExistingProduct, ImportJobStore, ProductStore};
pub use worker::{ImportWorker, JobOutcome, PROGRESS_BATCH_SIZE};
