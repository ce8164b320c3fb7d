//! Persistence collaborators driven by the worker and the service facade.

use async_trait::async_trait;
use sfimport_core::{
    ImportError, ImportJob, ImportProductRequest, JobCounters, JobStatus, NewImportJob,
    StoreError,
};

/// Import job records.
///
/// Transition methods are guarded: they fail with
/// [`StoreError::InvalidTransition`] when the job is not in an allowed
/// source status, so a cancelled job can never be completed afterwards.
#[async_trait]
pub trait ImportJobStore: Send + Sync {
    /// Inserts a `pending` job.
    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, StoreError>;

    async fn get_job(&self, job_id: i64) -> Result<Option<ImportJob>, StoreError>;

    /// Newest first.
    async fn list_jobs(
        &self,
        storefront_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, StoreError>;

    /// `pending → processing`, stamping `started_at`.
    async fn mark_processing(&self, job_id: i64) -> Result<ImportJob, StoreError>;

    /// Overwrites the record counters of a `processing` job.
    async fn update_progress(&self, job_id: i64, counters: &JobCounters)
        -> Result<(), StoreError>;

    /// `processing → completed`, stamping `completed_at`.
    async fn complete_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: Option<&str>,
    ) -> Result<ImportJob, StoreError>;

    /// `pending | processing → failed`, stamping `completed_at`.
    async fn fail_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: &str,
    ) -> Result<ImportJob, StoreError>;

    /// `pending | processing → cancelled`, stamping `completed_at`.
    async fn cancel_job(&self, job_id: i64) -> Result<ImportJob, StoreError>;

    /// Appends per-record error rows.
    async fn add_errors(&self, errors: &[ImportError]) -> Result<(), StoreError>;

    async fn list_errors(&self, job_id: i64) -> Result<Vec<ImportError>, StoreError>;
}

/// A product already present in a storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingProduct {
    pub id: i64,
    pub sku: String,
}

/// Storefront product persistence.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_by_sku(
        &self,
        storefront_id: i64,
        sku: &str,
    ) -> Result<Option<ExistingProduct>, StoreError>;

    /// Returns the new product id.
    async fn create(
        &self,
        storefront_id: i64,
        product: &ImportProductRequest,
    ) -> Result<i64, StoreError>;

    async fn update(&self, product_id: i64, product: &ImportProductRequest)
        -> Result<(), StoreError>;
}
