//! Per-job orchestration: parse → validate → group → map → persist.

use std::sync::Arc;

use sfimport_core::{
    AttributeValue, Attributes, CategoryMappingMode, ImportError, ImportJob, ImportProductRequest,
    ImportValidationError, JobCounters, JobStatus, StoreError, UpdateMode,
    ORIGINAL_CATEGORY_ATTRIBUTE, VARIANT_GROUP_ATTRIBUTE,
};
use sfimport_mapping::{AttributeMapper, CategoryMapper};
use sfimport_variants::VariantDetector;
use tokio_util::sync::CancellationToken;

use crate::traits::{ImportJobStore, ProductStore};

/// Records handled between progress flushes and cancellation checks.
pub const PROGRESS_BATCH_SIZE: usize = 100;

/// How a job left the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job was missing or no longer pending when the worker picked it up.
    Skipped,
    Completed(JobCounters),
    Failed(String),
    /// Cancelled out-of-band while processing.
    Cancelled,
    /// The queue shut down mid-job; the job was marked failed.
    Interrupted,
}

/// Everything a worker needs to drive one job. Cheap to clone.
#[derive(Clone)]
pub struct ImportWorker {
    jobs: Arc<dyn ImportJobStore>,
    products: Arc<dyn ProductStore>,
    variants: Arc<VariantDetector>,
    categories: Arc<CategoryMapper>,
    attributes: Arc<AttributeMapper>,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Error rows only carry a line number, so archive records name their entry
/// in the message.
fn with_source(source: Option<&str>, message: String) -> String {
    match source {
        Some(source) if !message.starts_with(source) => format!("{source}: {message}"),
        _ => message,
    }
}

fn validation_row(job_id: i64, e: &ImportValidationError) -> ImportError {
    ImportError {
        job_id,
        line_number: e.line_number,
        field_name: e.field.clone(),
        error_message: with_source(e.source.as_deref(), e.message.clone()),
        raw_data: e.value.clone(),
    }
}

impl ImportWorker {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn ImportJobStore>,
        products: Arc<dyn ProductStore>,
        variants: Arc<VariantDetector>,
        categories: Arc<CategoryMapper>,
        attributes: Arc<AttributeMapper>,
    ) -> Self {
        Self {
            jobs,
            products,
            variants,
            categories,
            attributes,
        }
    }

    /// Runs job `job_id` over `bytes` to a terminal state.
    ///
    /// Never returns an error: every failure is recorded on the job and
    /// reported through [`JobOutcome`].
    pub async fn process(
        &self,
        job_id: i64,
        bytes: &[u8],
        shutdown: &CancellationToken,
    ) -> JobOutcome {
        let job = match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id, "import job disappeared before processing");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to load import job");
                return JobOutcome::Skipped;
            }
        };
        if job.status != JobStatus::Pending {
            tracing::info!(
                job_id,
                status = %job.status,
                "skipping import job that is no longer pending"
            );
            return JobOutcome::Skipped;
        }

        let job = match self.jobs.mark_processing(job_id).await {
            Ok(job) => job,
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::info!(
                    job_id,
                    status = %from,
                    "import job changed state before it was claimed"
                );
                return JobOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to claim import job");
                return JobOutcome::Skipped;
            }
        };
        tracing::info!(
            job_id,
            storefront_id = job.storefront_id,
            file_type = %job.file_type,
            "import job started"
        );

        self.run(&job, bytes, shutdown).await
    }

    async fn run(
        &self,
        job: &ImportJob,
        bytes: &[u8],
        shutdown: &CancellationToken,
    ) -> JobOutcome {
        let job_id = job.id;
        let output = match sfimport_parser::parse_file(job.file_type, bytes) {
            Ok(output) => output,
            Err(e) => {
                let message = format!("failed to parse file: {e}");
                return self.fail(job_id, &JobCounters::default(), &message).await;
            }
        };

        let invalid = output.invalid_record_count();
        let mut counters = JobCounters {
            total_records: count(output.products.len() + invalid),
            processed_records: count(invalid),
            successful_records: 0,
            failed_records: count(invalid),
        };
        let validation_rows: Vec<ImportError> = output
            .errors
            .iter()
            .map(|e| validation_row(job_id, e))
            .collect();
        self.flush_errors(job_id, &validation_rows).await;
        self.flush_progress(job_id, &counters).await;

        let records = self.annotate_variants(job_id, output.products);
        if !records.is_empty() {
            if let Err(e) = self.attributes.load_attributes_cache().await {
                tracing::warn!(
                    job_id,
                    error = %e,
                    "attribute cache reload failed; using previous templates"
                );
            }
        }

        let mut pending_errors = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            let prepared = self.prepare_record(job, record).await;
            match self.persist_record(job, &prepared).await {
                Ok(()) => counters.successful_records += 1,
                Err(message) => {
                    tracing::warn!(
                        job_id,
                        line = prepared.line_number,
                        source = prepared.source.as_deref().unwrap_or("-"),
                        error = %message,
                        "record import failed"
                    );
                    counters.failed_records += 1;
                    pending_errors.push(ImportError {
                        job_id,
                        line_number: prepared.line_number,
                        field_name: "product".to_string(),
                        error_message: with_source(prepared.source.as_deref(), message),
                        raw_data: prepared.sku.clone().or_else(|| Some(prepared.name.clone())),
                    });
                }
            }
            counters.processed_records += 1;

            if (index + 1) % PROGRESS_BATCH_SIZE == 0 {
                self.flush_errors(job_id, &pending_errors).await;
                pending_errors.clear();

                if shutdown.is_cancelled() {
                    return self.interrupt(job_id, &counters).await;
                }
                if self.is_cancelled(job_id).await {
                    tracing::info!(
                        job_id,
                        processed = counters.processed_records,
                        "import job cancelled mid-run"
                    );
                    return JobOutcome::Cancelled;
                }
                self.flush_progress(job_id, &counters).await;
            }
        }
        self.flush_errors(job_id, &pending_errors).await;

        let summary = (counters.failed_records > 0).then(|| {
            format!(
                "{} of {} records failed",
                counters.failed_records, counters.total_records
            )
        });
        match self.jobs.complete_job(job_id, &counters, summary.as_deref()).await {
            Ok(_) => {
                tracing::info!(
                    job_id,
                    total = counters.total_records,
                    succeeded = counters.successful_records,
                    failed = counters.failed_records,
                    "import job completed"
                );
                JobOutcome::Completed(counters)
            }
            Err(StoreError::InvalidTransition { .. }) => {
                tracing::info!(job_id, "import job cancelled before completion");
                JobOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to record import completion");
                JobOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tags every member of an accepted variant family with the family base
    /// name and its extracted variant attributes. File order is kept.
    fn annotate_variants(
        &self,
        job_id: i64,
        mut records: Vec<ImportProductRequest>,
    ) -> Vec<ImportProductRequest> {
        let groups = self.variants.group_products(&records);
        let mut families = 0usize;
        for group in groups.iter().filter(|g| g.is_grouped) {
            families += 1;
            for warning in self.variants.validate_variant_group(group) {
                tracing::warn!(
                    job_id,
                    base_name = %group.base_name,
                    %warning,
                    "variant group inconsistency"
                );
            }
            for variant in &group.variants {
                let Some(record) = records.get_mut(variant.source_index) else {
                    continue;
                };
                record.attributes.insert(
                    VARIANT_GROUP_ATTRIBUTE.to_string(),
                    AttributeValue::text(group.base_name.clone()),
                );
                for (name, value) in &variant.variant_attributes {
                    record
                        .attributes
                        .entry(name.clone())
                        .or_insert_with(|| AttributeValue::text(value.clone()));
                }
            }
        }
        if families > 0 {
            tracing::debug!(job_id, families, "variant families detected");
        }
        records
    }

    async fn prepare_record(
        &self,
        job: &ImportJob,
        mut record: ImportProductRequest,
    ) -> ImportProductRequest {
        let category_id = self.resolve_category(job, &record).await;
        record.category_id = Some(category_id);
        record.attributes = self.map_attributes(&record.attributes, category_id);
        record
    }

    async fn resolve_category(&self, job: &ImportJob, record: &ImportProductRequest) -> i64 {
        let Some(path) = record.original_category() else {
            return self.categories.config().default_category_id;
        };
        let resolved = match job.options.category_mapping_mode {
            CategoryMappingMode::Skip => {
                return self.categories.config().default_category_id;
            }
            CategoryMappingMode::Manual => {
                match self.categories.lookup_mapping(job.storefront_id, path).await {
                    Ok(Some(found)) => found,
                    Ok(None) => self.categories.default_resolution(path, "no stored mapping"),
                    Err(e) => {
                        tracing::warn!(job_id = job.id, path, error = %e, "category lookup failed");
                        self.categories.default_resolution(path, "mapping lookup failed")
                    }
                }
            }
            CategoryMappingMode::Auto => {
                self.categories
                    .get_or_create_mapping(
                        job.storefront_id,
                        path,
                        &record.name,
                        record.description.as_deref(),
                    )
                    .await
            }
        };
        if resolved.manual_review_required {
            tracing::debug!(
                job_id = job.id,
                path = %resolved.normalized_path,
                category_id = resolved.category_id,
                reasoning = resolved.reasoning.as_deref().unwrap_or("-"),
                "category mapping needs manual review"
            );
        }
        resolved.category_id
    }

    /// Resolved attributes are keyed by template code with a typed value;
    /// unresolved ones by their suggested code. The first attribute claiming
    /// a code wins.
    fn map_attributes(&self, attributes: &Attributes, category_id: i64) -> Attributes {
        let mut mapped = Attributes::new();
        for (name, value) in attributes {
            if name == ORIGINAL_CATEGORY_ATTRIBUTE || name == VARIANT_GROUP_ATTRIBUTE {
                mapped.insert(name.clone(), value.clone());
                continue;
            }
            let Some(raw) = value.as_text() else {
                mapped.entry(name.clone()).or_insert_with(|| value.clone());
                continue;
            };
            let attribute = self
                .attributes
                .map_external_attribute(name, raw, Some(category_id));
            mapped
                .entry(attribute.storage_code().to_string())
                .or_insert(attribute.value);
        }
        mapped
    }

    async fn persist_record(
        &self,
        job: &ImportJob,
        record: &ImportProductRequest,
    ) -> Result<(), String> {
        let storefront_id = job.storefront_id;
        let mode = job.options.update_mode;
        let sku = record
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let Some(sku) = sku else {
            if mode == UpdateMode::UpdateOnly {
                return Err("update_only mode requires a sku".to_string());
            }
            return self.create(storefront_id, record).await;
        };

        let existing = self
            .products
            .get_by_sku(storefront_id, sku)
            .await
            .map_err(|e| e.to_string())?;
        match (mode, existing) {
            (UpdateMode::CreateOnly, Some(_)) => {
                Err(format!("product with sku {sku} already exists"))
            }
            (UpdateMode::UpdateOnly, None) => Err(format!("product with sku {sku} not found")),
            (_, Some(product)) => self
                .products
                .update(product.id, record)
                .await
                .map_err(|e| e.to_string()),
            (_, None) => self.create(storefront_id, record).await,
        }
    }

    async fn create(
        &self,
        storefront_id: i64,
        record: &ImportProductRequest,
    ) -> Result<(), String> {
        self.products
            .create(storefront_id, record)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn is_cancelled(&self, job_id: i64) -> bool {
        match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => job.status == JobStatus::Cancelled,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "failed to reload job status");
                false
            }
        }
    }

    async fn flush_errors(&self, job_id: i64, rows: &[ImportError]) {
        if rows.is_empty() {
            return;
        }
        if let Err(e) = self.jobs.add_errors(rows).await {
            tracing::warn!(
                job_id,
                count = rows.len(),
                error = %e,
                "failed to persist import errors"
            );
        }
    }

    async fn flush_progress(&self, job_id: i64, counters: &JobCounters) {
        if let Err(e) = self.jobs.update_progress(job_id, counters).await {
            tracing::warn!(job_id, error = %e, "failed to update import progress");
        }
    }

    async fn fail(&self, job_id: i64, counters: &JobCounters, message: &str) -> JobOutcome {
        tracing::warn!(job_id, error = message, "import job failed");
        if let Err(e) = self.jobs.fail_job(job_id, counters, message).await {
            tracing::error!(job_id, error = %e, "failed to record import failure");
        }
        JobOutcome::Failed(message.to_string())
    }

    async fn interrupt(&self, job_id: i64, counters: &JobCounters) -> JobOutcome {
        tracing::warn!(
            job_id,
            processed = counters.processed_records,
            "import interrupted by shutdown"
        );
        if let Err(e) = self
            .jobs
            .fail_job(job_id, counters, "import interrupted by shutdown")
            .await
        {
            tracing::error!(job_id, error = %e, "failed to record import interruption");
        }
        JobOutcome::Interrupted
    }
}
