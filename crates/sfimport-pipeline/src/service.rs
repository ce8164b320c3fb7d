//! Caller-facing import operations.
//!
//! Submissions return a job handle immediately; results are retrieved by
//! polling [`ImportService::job_status`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sfimport_core::{
    FileType, ImportJob, ImportJobStatus, ImportOptions, JobCounters, JobStatus, MappedAttribute,
    NewImportJob, StoreError, ORIGINAL_CATEGORY_ATTRIBUTE, VARIANT_GROUP_ATTRIBUTE,
};
use sfimport_mapping::{
    summarize_quality, AttributeMapper, CategoryMapper, CategorySample, MappingQualitySummary,
};
use sfimport_parser::{RecordPreview, ValidationSummary};
use sfimport_variants::{VariantDetector, VariantGroup};

use crate::download::CatalogDownloader;
use crate::error::{PipelineError, QueueError};
use crate::queue::{ImportQueueManager, ImportTask};
use crate::traits::ImportJobStore;

/// A file submitted for import.
#[derive(Debug, Clone)]
pub struct ImportSubmission {
    pub storefront_id: i64,
    pub user_id: i64,
    pub file_name: Option<String>,
    pub file_type: FileType,
    pub file_url: Option<String>,
    pub options: ImportOptions,
}

/// A catalog to fetch from `url` and import.
#[derive(Debug, Clone)]
pub struct UrlSubmission {
    pub storefront_id: i64,
    pub user_id: i64,
    pub url: String,
    /// Overrides the format inferred from the URL or the response.
    pub file_type: Option<FileType>,
    pub options: ImportOptions,
}

/// Dry-run view of a file before it is imported.
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub summary: ValidationSummary,
    pub records: Vec<RecordPreview>,
    /// Grouping over every valid record in the file.
    pub variant_groups: Vec<VariantGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryAnalysis {
    pub suggestions: Vec<sfimport_core::CategoryMappingSuggestion>,
    pub quality: MappingQualitySummary,
}

pub struct ImportService {
    jobs: Arc<dyn ImportJobStore>,
    queue: Arc<ImportQueueManager>,
    variants: Arc<VariantDetector>,
    categories: Arc<CategoryMapper>,
    attributes: Arc<AttributeMapper>,
    downloader: Option<Arc<CatalogDownloader>>,
}

impl ImportService {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn ImportJobStore>,
        queue: Arc<ImportQueueManager>,
        variants: Arc<VariantDetector>,
        categories: Arc<CategoryMapper>,
        attributes: Arc<AttributeMapper>,
    ) -> Self {
        Self {
            jobs,
            queue,
            variants,
            categories,
            attributes,
            downloader: None,
        }
    }

    /// Enables [`ImportService::submit_url`].
    #[must_use]
    pub fn with_downloader(mut self, downloader: CatalogDownloader) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<ImportQueueManager> {
        &self.queue
    }

    /// Creates a `pending` job for `bytes` and queues it.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::QueueFull`] when the queue is saturated. The job
    ///   has been marked failed; submitting again later may succeed.
    /// - [`PipelineError::QueueNotRunning`] when the worker pool is down.
    /// - [`PipelineError::Store`] if the job cannot be created.
    pub async fn submit_file(
        &self,
        submission: ImportSubmission,
        bytes: Vec<u8>,
    ) -> Result<ImportJob, PipelineError> {
        let job = self
            .jobs
            .create_job(&NewImportJob {
                storefront_id: submission.storefront_id,
                user_id: submission.user_id,
                file_name: submission.file_name,
                file_type: submission.file_type,
                file_url: submission.file_url,
                options: submission.options,
            })
            .await?;
        tracing::info!(
            job_id = job.id,
            storefront_id = job.storefront_id,
            file_type = %job.file_type,
            bytes = bytes.len(),
            "import job submitted"
        );
        self.enqueue(job, bytes).await
    }

    /// Downloads the catalog at `submission.url`, then submits it like an
    /// uploaded file. The job records the URL it came from.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::DownloadsDisabled`] if no downloader is configured.
    /// - [`PipelineError::Download`] if the catalog cannot be fetched; no
    ///   job is created in that case.
    /// - Everything [`ImportService::submit_file`] returns.
    pub async fn submit_url(&self, submission: UrlSubmission) -> Result<ImportJob, PipelineError> {
        let downloader = self
            .downloader
            .as_ref()
            .ok_or(PipelineError::DownloadsDisabled)?;
        let catalog = downloader
            .fetch(&submission.url, submission.file_type)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    storefront_id = submission.storefront_id,
                    url = %submission.url,
                    error = %e,
                    "catalog download failed"
                );
            })?;
        self.submit_file(
            ImportSubmission {
                storefront_id: submission.storefront_id,
                user_id: submission.user_id,
                file_name: catalog.file_name,
                file_type: catalog.file_type,
                file_url: Some(catalog.url),
                options: submission.options,
            },
            catalog.bytes,
        )
        .await
    }

    async fn enqueue(&self, job: ImportJob, bytes: Vec<u8>) -> Result<ImportJob, PipelineError> {
        let job_id = job.id;
        let rejection = match self.queue.enqueue(ImportTask::new(job_id, bytes)) {
            Ok(()) => return Ok(job),
            Err(QueueError::Full { .. }) => PipelineError::QueueFull { job_id },
            Err(QueueError::NotRunning | QueueError::AlreadyRunning) => {
                PipelineError::QueueNotRunning { job_id }
            }
            Err(QueueError::AlreadyQueued(id)) => return Err(PipelineError::AlreadyQueued(id)),
        };

        if let Err(e) = self
            .jobs
            .fail_job(job_id, &JobCounters::default(), &rejection.to_string())
            .await
        {
            tracing::error!(job_id, error = %e, "failed to mark rejected job as failed");
        }
        Err(rejection)
    }

    /// Parses `bytes` and reports totals and validation errors. Nothing is
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] if the file is rejected as a whole.
    pub fn validate_file(
        &self,
        file_type: FileType,
        bytes: &[u8],
    ) -> Result<ValidationSummary, PipelineError> {
        let output = sfimport_parser::parse_file(file_type, bytes)?;
        Ok(sfimport_parser::summarize(&output))
    }

    /// First `limit` records with their validity, plus the variant grouping
    /// of the whole file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] if the file is rejected as a whole.
    pub fn preview(
        &self,
        file_type: FileType,
        bytes: &[u8],
        limit: usize,
    ) -> Result<ImportPreview, PipelineError> {
        let output = sfimport_parser::parse_file(file_type, bytes)?;
        Ok(ImportPreview {
            summary: sfimport_parser::summarize(&output),
            records: sfimport_parser::preview_records(&output, limit),
            variant_groups: self.variants.group_products(&output.products),
        })
    }

    #[must_use]
    pub fn csv_template() -> String {
        sfimport_parser::csv_template()
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::JobNotFound`] for an unknown id.
    pub async fn job_status(&self, job_id: i64) -> Result<ImportJobStatus, PipelineError> {
        let job = self.load_job(job_id).await?;
        let errors = self.jobs.list_errors(job_id).await?;
        Ok(ImportJobStatus {
            progress: job.progress(),
            job,
            errors,
        })
    }

    /// Jobs of a storefront, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on storage failure.
    pub async fn list_jobs(
        &self,
        storefront_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, PipelineError> {
        Ok(self
            .jobs
            .list_jobs(storefront_id, status, limit.max(1), offset.max(0))
            .await?)
    }

    /// Cancels a `pending` or `processing` job. A processing job stops at its
    /// next progress checkpoint.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::JobNotFound`] for an unknown id.
    /// - [`PipelineError::InvalidTransition`] if the job already finished.
    pub async fn cancel_job(&self, job_id: i64) -> Result<ImportJob, PipelineError> {
        let job = self.load_job(job_id).await?;
        if !job.status.is_cancellable() {
            return Err(PipelineError::InvalidTransition {
                job_id,
                status: job.status,
                action: "cancel",
            });
        }
        match self.jobs.cancel_job(job_id).await {
            Ok(job) => {
                tracing::info!(job_id, "import job cancelled");
                Ok(job)
            }
            Err(StoreError::InvalidTransition { .. }) => {
                let current = self.load_job(job_id).await?;
                Err(PipelineError::InvalidTransition {
                    job_id,
                    status: current.status,
                    action: "cancel",
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-runs a `failed` or `cancelled` job as a new job over `bytes`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::JobNotFound`] for an unknown id.
    /// - [`PipelineError::InvalidTransition`] unless the job failed or was
    ///   cancelled.
    /// - Any error of [`ImportService::submit_file`].
    pub async fn retry_job(&self, job_id: i64, bytes: Vec<u8>) -> Result<ImportJob, PipelineError> {
        let job = self.retryable_job(job_id).await?;
        tracing::info!(job_id, "retrying import job");
        self.submit_file(
            ImportSubmission {
                storefront_id: job.storefront_id,
                user_id: job.user_id,
                file_name: job.file_name,
                file_type: job.file_type,
                file_url: job.file_url,
                options: job.options,
            },
            bytes,
        )
        .await
    }

    /// Re-runs a `failed` or `cancelled` job by fetching its source URL
    /// again.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::MissingSourceUrl`] if the job was an upload.
    /// - Any error of [`ImportService::retry_job`] or
    ///   [`ImportService::submit_url`].
    pub async fn retry_job_from_url(&self, job_id: i64) -> Result<ImportJob, PipelineError> {
        let job = self.retryable_job(job_id).await?;
        let url = job
            .file_url
            .ok_or(PipelineError::MissingSourceUrl(job_id))?;
        tracing::info!(job_id, %url, "retrying import job from its source URL");
        self.submit_url(UrlSubmission {
            storefront_id: job.storefront_id,
            user_id: job.user_id,
            url,
            file_type: Some(job.file_type),
            options: job.options,
        })
        .await
    }

    async fn retryable_job(&self, job_id: i64) -> Result<ImportJob, PipelineError> {
        let job = self.load_job(job_id).await?;
        if !job.status.is_retryable() {
            return Err(PipelineError::InvalidTransition {
                job_id,
                status: job.status,
                action: "retry",
            });
        }
        Ok(job)
    }

    /// Category suggestions for every distinct external category in the file,
    /// using the first record of each as the classification sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] if the file is rejected as a whole.
    pub async fn analyze_categories(
        &self,
        storefront_id: i64,
        file_type: FileType,
        bytes: &[u8],
    ) -> Result<CategoryAnalysis, PipelineError> {
        let output = sfimport_parser::parse_file(file_type, bytes)?;
        let samples: Vec<CategorySample> = output
            .products
            .iter()
            .filter_map(|p| {
                p.original_category().map(|category| CategorySample {
                    external_category: category.to_string(),
                    title: p.name.clone(),
                    description: p.description.clone(),
                })
            })
            .collect();
        let suggestions = self.categories.suggest_mappings(storefront_id, &samples).await;
        let quality = summarize_quality(&suggestions);
        Ok(CategoryAnalysis {
            suggestions,
            quality,
        })
    }

    /// How each distinct external attribute in the file would be mapped,
    /// using its first non-empty value as the sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] if the file is rejected as a whole.
    pub async fn analyze_attributes(
        &self,
        file_type: FileType,
        bytes: &[u8],
    ) -> Result<Vec<MappedAttribute>, PipelineError> {
        let output = sfimport_parser::parse_file(file_type, bytes)?;
        if let Err(e) = self.attributes.load_attributes_cache().await {
            tracing::warn!(error = %e, "attribute cache reload failed; using previous templates");
        }

        let mut samples: BTreeMap<&str, &str> = BTreeMap::new();
        for product in &output.products {
            for (name, value) in &product.attributes {
                if name == ORIGINAL_CATEGORY_ATTRIBUTE || name == VARIANT_GROUP_ATTRIBUTE {
                    continue;
                }
                if let Some(text) = value.as_text().filter(|t| !t.trim().is_empty()) {
                    samples.entry(name.as_str()).or_insert(text);
                }
            }
        }
        Ok(self.attributes.map_attributes(samples, None))
    }

    async fn load_job(&self, job_id: i64) -> Result<ImportJob, PipelineError> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))
    }
}
