//! [`PgStore`]: the Postgres implementation of every persistence seam the
//! pipeline and mappers depend on.

use async_trait::async_trait;
use sfimport_core::{
    AttributeTemplate, Category, ImportError, ImportJob, ImportProductRequest, JobCounters,
    JobStatus, NewCategoryMapping, NewImportJob, StoreError, StorefrontCategoryMapping,
};
use sfimport_mapping::{CategoryMappingStore, TaxonomyStore};
use sfimport_pipeline::{ExistingProduct, ImportJobStore, ProductStore};
use sqlx::PgPool;

use crate::{category_mappings, import_jobs, storefront_products, taxonomy};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ImportJobStore for PgStore {
    async fn create_job(&self, new: &NewImportJob) -> Result<ImportJob, StoreError> {
        Ok(import_jobs::create_import_job(&self.pool, new).await?)
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<ImportJob>, StoreError> {
        Ok(import_jobs::get_import_job(&self.pool, job_id).await?)
    }

    async fn list_jobs(
        &self,
        storefront_id: i64,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, StoreError> {
        Ok(import_jobs::list_import_jobs(&self.pool, storefront_id, status, limit, offset).await?)
    }

    async fn mark_processing(&self, job_id: i64) -> Result<ImportJob, StoreError> {
        Ok(import_jobs::mark_import_job_processing(&self.pool, job_id).await?)
    }

    async fn update_progress(
        &self,
        job_id: i64,
        counters: &JobCounters,
    ) -> Result<(), StoreError> {
        Ok(import_jobs::update_import_job_progress(&self.pool, job_id, counters).await?)
    }

    async fn complete_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: Option<&str>,
    ) -> Result<ImportJob, StoreError> {
        Ok(import_jobs::complete_import_job(&self.pool, job_id, counters, error_message).await?)
    }

    async fn fail_job(
        &self,
        job_id: i64,
        counters: &JobCounters,
        error_message: &str,
    ) -> Result<ImportJob, StoreError> {
        Ok(import_jobs::fail_import_job(&self.pool, job_id, counters, error_message).await?)
    }

    async fn cancel_job(&self, job_id: i64) -> Result<ImportJob, StoreError> {
        Ok(import_jobs::cancel_import_job(&self.pool, job_id).await?)
    }

    async fn add_errors(&self, errors: &[ImportError]) -> Result<(), StoreError> {
        let inserted = import_jobs::insert_import_errors(&self.pool, errors).await?;
        tracing::debug!(inserted, "import errors persisted");
        Ok(())
    }

    async fn list_errors(&self, job_id: i64) -> Result<Vec<ImportError>, StoreError> {
        Ok(import_jobs::list_import_errors(&self.pool, job_id).await?)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get_by_sku(
        &self,
        storefront_id: i64,
        sku: &str,
    ) -> Result<Option<ExistingProduct>, StoreError> {
        Ok(
            storefront_products::find_storefront_product_by_sku(&self.pool, storefront_id, sku)
                .await?,
        )
    }

    async fn create(
        &self,
        storefront_id: i64,
        product: &ImportProductRequest,
    ) -> Result<i64, StoreError> {
        Ok(
            storefront_products::create_storefront_product(&self.pool, storefront_id, product)
                .await?,
        )
    }

    async fn update(
        &self,
        product_id: i64,
        product: &ImportProductRequest,
    ) -> Result<(), StoreError> {
        Ok(storefront_products::update_storefront_product(&self.pool, product_id, product).await?)
    }
}

#[async_trait]
impl CategoryMappingStore for PgStore {
    async fn find_mapping(
        &self,
        storefront_id: i64,
        normalized_path: &str,
    ) -> Result<Option<StorefrontCategoryMapping>, StoreError> {
        Ok(
            category_mappings::find_category_mapping(&self.pool, storefront_id, normalized_path)
                .await?,
        )
    }

    async fn insert_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError> {
        Ok(category_mappings::insert_category_mapping(&self.pool, mapping).await?)
    }

    async fn upsert_manual_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError> {
        Ok(category_mappings::upsert_manual_category_mapping(&self.pool, mapping).await?)
    }

    async fn list_mappings(
        &self,
        storefront_id: i64,
    ) -> Result<Vec<StorefrontCategoryMapping>, StoreError> {
        Ok(category_mappings::list_category_mappings(&self.pool, storefront_id).await?)
    }
}

#[async_trait]
impl TaxonomyStore for PgStore {
    async fn get_all_attributes(&self) -> Result<Vec<AttributeTemplate>, StoreError> {
        Ok(taxonomy::list_attribute_templates(&self.pool).await?)
    }

    async fn get_category_by_id(&self, id: i64) -> Result<Option<Category>, StoreError> {
        Ok(taxonomy::get_category(&self.pool, id).await?)
    }
}
