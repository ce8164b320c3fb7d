//! In-memory collaborators and a wired-up service for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sfimport_core::{
    AttributePurpose, AttributeTemplate, AttributeValueType, Category, FileType, ImportError,
    ImportJob, ImportOptions, ImportProductRequest, JobCounters, JobStatus, NewCategoryMapping,
    NewImportJob, StoreError, StorefrontCategoryMapping, ValidationRules,
};
use sfimport_mapping::{
    AttributeMapper, CategoryDetector, CategoryMapper, CategoryMapperConfig,
    CategoryMappingStore, DetectedCategory, DetectionRequest, MappingError, TaxonomyStore,
};
use sfimport_pipeline::{
    CatalogDownloader, DownloadConfig, ExistingProduct, ImportJobStore, ImportQueueManager,
    ImportService, ImportSubmission, ImportWorker, ProductStore, QueueConfig,
};
use sfimport_variants::VariantDetector;
use tokio::sync::Semaphore;

pub const STOREFRONT: i64 = 7;
pub const USER: i64 = 3;
pub const DEFAULT_CATEGORY: i64 = 1001;
/// Size limit of the harness downloader.
pub const MAX_DOWNLOAD_BYTES: u64 = 4096;

// ----------------------------------------------------------------
// job store
// ----------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobs {
    jobs: Mutex<Vec<ImportJob>>,
    errors: Mutex<Vec<ImportError>>,
    next_id: AtomicI64,
    /// When set, `mark_processing` waits for a permit, holding workers at
    /// the claim step.
    pub claim_gate: Option<Arc<Semaphore>>,
    pub progress_updates: AtomicUsize,
}

impl MemoryJobs {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                claim_gate: Some(Arc::clone(&gate)),
                ..Self::default()
            },
            gate,
        )
    }

    pub fn job(&self, job_id: i64) -> Option<ImportJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
    }

    pub fn errors_for(&self, job_id: i64) -> Vec<ImportError> {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    fn transition(
        &self,
        job_id: i64,
        allowed: &[JobStatus],
        to: JobStatus,
        apply: impl FnOnce(&mut ImportJob),
    ) -> Result<ImportJob, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "import job",
                key: job_id.to_string(),
            })?;
        if !allowed.contains(&job.status) {
            return Err(StoreError::InvalidTransition {
                entity: "import job",
                id: job_id,
                from: job.status.to_string(),
                to: to.to_string(),
            });
        }
        job.status = to;
        apply(job);
        Ok(job.clone())
    }
}

#[async_trait]
impl ImportJobStore for MemoryJobs {
    async fn create_job(&self, new: &NewImportJob) -> Result<ImportJob, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = ImportJob {
            id,
            public_id: uuid::Uuid::new_v4(),
            storefront_id: new.storefront_id,
            user_id: new.user_id,
            file_name: new.file_name.clone(),
            file_type: new.file_type,
            file_url: new.file_url.clone(),
            status: JobStatus::Pending,
            options: new.options,
            counters: JobCounters::default(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.job(job_id))
    }

    async fn list_jobs(
        &self,
        storefront_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, StoreError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| j.storefront_id == storefront_id)
            .filter(|j| status.is_none_or(|s| j.status == s))
            .skip(usize::try_from(offset).unwrap())
            .take(usize::try_from(limit).unwrap())
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, job_id: i64) -> Result<ImportJob, StoreError> {
        if let Some(gate) = &self.claim_gate {
            let _permit = gate.acquire().await.map_err(StoreError::backend)?;
        }
        self.transition(job_id, &[JobStatus::Pending], JobStatus::Processing, |j| {
            j.started_at = Some(Utc::now());
        })
    }

    async fn update_progress(
        &self,
        job_id: i64,
        counters: &JobCounters,
    ) -> Result<(), StoreError> {
        self.progress_updates.fetch_add(1, Ordering::SeqCst);
        let counters = *counters;
        self.transition(
            job_id,
            &[JobStatus::Processing],
            JobStatus::Processing,
            |j| j.counters = counters,
        )
        .map(|_| ())
    }

    async fn complete_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: Option<&str>,
    ) -> Result<ImportJob, StoreError> {
        let counters = *counters;
        self.transition(job_id, &[JobStatus::Processing], JobStatus::Completed, |j| {
            j.counters = counters;
            j.error_message = error_message.map(str::to_string);
            j.completed_at = Some(Utc::now());
        })
    }

    async fn fail_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: &str,
    ) -> Result<ImportJob, StoreError> {
        let counters = *counters;
        self.transition(
            job_id,
            &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Failed,
            |j| {
                j.counters = counters;
                j.error_message = Some(error_message.to_string());
                j.completed_at = Some(Utc::now());
            },
        )
    }

    async fn cancel_job(&self, job_id: i64) -> Result<ImportJob, StoreError> {
        self.transition(
            job_id,
            &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Cancelled,
            |j| j.completed_at = Some(Utc::now()),
        )
    }

    async fn add_errors(&self, errors: &[ImportError]) -> Result<(), StoreError> {
        self.errors.lock().unwrap().extend_from_slice(errors);
        Ok(())
    }

    async fn list_errors(&self, job_id: i64) -> Result<Vec<ImportError>, StoreError> {
        Ok(self.errors_for(job_id))
    }
}

// ----------------------------------------------------------------
// product store
// ----------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: i64,
    pub storefront_id: i64,
    pub product: ImportProductRequest,
}

#[derive(Default)]
pub struct MemoryProducts {
    rows: Mutex<Vec<StoredProduct>>,
    /// Pause before every write, so a job stays in flight long enough to be
    /// cancelled or interrupted.
    pub write_delay: Option<Duration>,
}

impl MemoryProducts {
    pub fn slow(write_delay: Duration) -> Self {
        Self {
            write_delay: Some(write_delay),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn seed(&self, storefront_id: i64, product: ImportProductRequest) {
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        rows.push(StoredProduct {
            id,
            storefront_id,
            product,
        });
    }

    pub fn all(&self) -> Vec<StoredProduct> {
        self.rows.lock().unwrap().clone()
    }

    pub fn by_sku(&self, sku: &str) -> Option<StoredProduct> {
        self.all()
            .into_iter()
            .find(|p| p.product.sku.as_deref() == Some(sku))
    }
}

#[async_trait]
impl ProductStore for MemoryProducts {
    async fn get_by_sku(
        &self,
        storefront_id: i64,
        sku: &str,
    ) -> Result<Option<ExistingProduct>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.storefront_id == storefront_id && p.product.sku.as_deref() == Some(sku))
            .map(|p| ExistingProduct {
                id: p.id,
                sku: sku.to_string(),
            }))
    }

    async fn create(
        &self,
        storefront_id: i64,
        product: &ImportProductRequest,
    ) -> Result<i64, StoreError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        rows.push(StoredProduct {
            id,
            storefront_id,
            product: product.clone(),
        });
        Ok(id)
    }

    async fn update(
        &self,
        product_id: i64,
        product: &ImportProductRequest,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            })?;
        row.product = product.clone();
        Ok(())
    }
}

// ----------------------------------------------------------------
// taxonomy and mappings
// ----------------------------------------------------------------

#[derive(Default)]
pub struct MemoryMappings {
    rows: Mutex<HashMap<(i64, String), StorefrontCategoryMapping>>,
}

impl MemoryMappings {
    pub fn seed(&self, storefront_id: i64, normalized_path: &str, category_id: i64) {
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        rows.insert(
            (storefront_id, normalized_path.to_string()),
            StorefrontCategoryMapping {
                id,
                storefront_id,
                external_path: normalized_path.to_string(),
                normalized_path: normalized_path.to_string(),
                category_id,
                confidence: 1.0,
                reasoning: None,
                is_manual: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
    }

    fn row(id: i64, m: &NewCategoryMapping) -> StorefrontCategoryMapping {
        StorefrontCategoryMapping {
            id,
            storefront_id: m.storefront_id,
            external_path: m.external_path.clone(),
            normalized_path: m.normalized_path.clone(),
            category_id: m.category_id,
            confidence: m.confidence,
            reasoning: m.reasoning.clone(),
            is_manual: m.is_manual,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CategoryMappingStore for MemoryMappings {
    async fn find_mapping(
        &self,
        storefront_id: i64,
        normalized_path: &str,
    ) -> Result<Option<StorefrontCategoryMapping>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(storefront_id, normalized_path.to_string()))
            .cloned())
    }

    async fn insert_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        Ok(rows
            .entry((mapping.storefront_id, mapping.normalized_path.clone()))
            .or_insert_with(|| Self::row(id, mapping))
            .clone())
    }

    async fn upsert_manual_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        let row = Self::row(id, mapping);
        rows.insert(
            (mapping.storefront_id, mapping.normalized_path.clone()),
            row.clone(),
        );
        Ok(row)
    }

    async fn list_mappings(
        &self,
        storefront_id: i64,
    ) -> Result<Vec<StorefrontCategoryMapping>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.storefront_id == storefront_id)
            .cloned()
            .collect())
    }
}

pub struct MemoryTaxonomy;

pub fn color_template() -> AttributeTemplate {
    AttributeTemplate {
        id: 1,
        code: "color".to_string(),
        name: "Boja".to_string(),
        value_type: AttributeValueType::Text,
        purpose: AttributePurpose::Variant,
        validation_rules: ValidationRules::default(),
        is_searchable: true,
        is_filterable: true,
        is_required: false,
        category_ids: vec![],
    }
}

pub fn weight_template() -> AttributeTemplate {
    AttributeTemplate {
        id: 2,
        code: "weight_kg".to_string(),
        name: "Weight".to_string(),
        value_type: AttributeValueType::Number,
        purpose: AttributePurpose::Regular,
        validation_rules: ValidationRules::default(),
        is_searchable: false,
        is_filterable: true,
        is_required: false,
        category_ids: vec![],
    }
}

#[async_trait]
impl TaxonomyStore for MemoryTaxonomy {
    async fn get_all_attributes(&self) -> Result<Vec<AttributeTemplate>, StoreError> {
        Ok(vec![color_template(), weight_template()])
    }

    async fn get_category_by_id(&self, id: i64) -> Result<Option<Category>, StoreError> {
        Ok([DEFAULT_CATEGORY, 2040, 3000].contains(&id).then(|| Category {
            id,
            name: format!("Category {id}"),
            slug: format!("category-{id}"),
            parent_id: None,
        }))
    }
}

/// Always answers with the same category and counts calls.
pub struct FixedDetector {
    pub category_id: i64,
    pub calls: AtomicU32,
}

impl FixedDetector {
    pub fn new(category_id: i64) -> Arc<Self> {
        Arc::new(Self {
            category_id,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategoryDetector for FixedDetector {
    async fn detect_category(
        &self,
        _request: &DetectionRequest,
    ) -> Result<DetectedCategory, MappingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DetectedCategory {
            category_id: self.category_id,
            confidence: 0.9,
            reasoning: None,
        })
    }
}

// ----------------------------------------------------------------
// harness
// ----------------------------------------------------------------

pub struct Harness {
    pub jobs: Arc<MemoryJobs>,
    pub products: Arc<MemoryProducts>,
    pub mappings: Arc<MemoryMappings>,
    pub detector: Arc<FixedDetector>,
    pub worker: ImportWorker,
    pub service: ImportService,
}

impl Harness {
    /// A service whose queue has not been started.
    pub fn idle(jobs: MemoryJobs, config: QueueConfig) -> Self {
        Self::idle_with(jobs, MemoryProducts::default(), config)
    }

    pub fn idle_with(jobs: MemoryJobs, products: MemoryProducts, config: QueueConfig) -> Self {
        let jobs = Arc::new(jobs);
        let products = Arc::new(products);
        let mappings = Arc::new(MemoryMappings::default());
        let detector = FixedDetector::new(2040);
        let taxonomy = Arc::new(MemoryTaxonomy);

        let categories = Arc::new(CategoryMapper::new(
            Arc::clone(&mappings) as Arc<dyn CategoryMappingStore>,
            Arc::clone(&taxonomy) as Arc<dyn TaxonomyStore>,
            Some(Arc::clone(&detector) as Arc<dyn CategoryDetector>),
            CategoryMapperConfig::default(),
        ));
        let attributes = Arc::new(AttributeMapper::new(taxonomy));
        let variants = Arc::new(VariantDetector::default());

        let worker = ImportWorker::new(
            Arc::clone(&jobs) as Arc<dyn ImportJobStore>,
            Arc::clone(&products) as Arc<dyn ProductStore>,
            Arc::clone(&variants),
            Arc::clone(&categories),
            Arc::clone(&attributes),
        );
        let queue = Arc::new(ImportQueueManager::new(worker.clone(), config));
        let downloader = CatalogDownloader::new(DownloadConfig {
            timeout: Duration::from_secs(5),
            max_bytes: MAX_DOWNLOAD_BYTES,
        })
        .unwrap();
        let service = ImportService::new(
            Arc::clone(&jobs) as Arc<dyn ImportJobStore>,
            queue,
            variants,
            categories,
            attributes,
        )
        .with_downloader(downloader);

        Self {
            jobs,
            products,
            mappings,
            detector,
            worker,
            service,
        }
    }

    /// A service with a running queue of two workers.
    pub fn running() -> Self {
        Self::running_with(MemoryJobs::default(), QueueConfig { workers: 2, capacity: 10 })
    }

    pub fn running_with(jobs: MemoryJobs, config: QueueConfig) -> Self {
        let harness = Self::idle(jobs, config);
        harness.service.queue().start().unwrap();
        harness
    }

    /// Polls until at least `count` products have been written.
    pub async fn wait_products(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.products.count() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("products should be written");
    }

    pub async fn submit(&self, csv: &str, options: ImportOptions) -> ImportJob {
        self.service
            .submit_file(submission(FileType::Csv, options), csv.as_bytes().to_vec())
            .await
            .unwrap()
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: i64) -> ImportJob {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(job) = self.jobs.job(job_id) {
                    if job.status.is_terminal() {
                        return job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job should reach a terminal state")
    }

    /// Polls until no job is queued or in flight.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.service.queue().stats().in_flight > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue should drain");
    }
}

pub fn submission(file_type: FileType, options: ImportOptions) -> ImportSubmission {
    ImportSubmission {
        storefront_id: STOREFRONT,
        user_id: USER,
        file_name: Some(format!("catalog.{}", file_type.as_str())),
        file_type,
        file_url: None,
        options,
    }
}
