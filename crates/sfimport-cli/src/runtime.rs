//! Wiring of the Postgres store, mappers, worker pool and import service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sfimport_core::AppConfig;
use sfimport_db::PgStore;
use sfimport_mapping::{
    AttributeMapper, CategoryDetector, CategoryMapper, CategoryMapperConfig,
    CategoryMappingStore, HttpCategoryDetector, RetryPolicy, TaxonomyStore, FALLBACK_CONFIDENCE,
};
use sfimport_pipeline::{
    CatalogDownloader, DownloadConfig, ImportJobStore, ImportQueueManager, ImportService,
    ImportWorker, ProductStore, QueueConfig,
};
use sfimport_variants::{DetectorConfig, PatternTables, VariantDetector};

pub(crate) struct Runtime {
    pub(crate) service: ImportService,
    pub(crate) categories: Arc<CategoryMapper>,
}

/// Opens the connection pool described by `config`.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = sfimport_db::PoolConfig::from_app_config(config);
    sfimport_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to the database")
}

fn build_variant_detector(config: &AppConfig) -> anyhow::Result<VariantDetector> {
    let detector_config = DetectorConfig {
        min_group_size: config.variant_min_group_size,
        min_confidence: config.variant_min_confidence,
    };
    match &config.variant_patterns_path {
        Some(path) => {
            let extra = PatternTables::from_path(path)?;
            tracing::info!(path = %path.display(), "loaded extra variant patterns");
            Ok(VariantDetector::with_extra_patterns(detector_config, extra)?)
        }
        None => Ok(VariantDetector::new(detector_config)),
    }
}

fn build_category_detector(
    config: &AppConfig,
) -> anyhow::Result<Option<Arc<dyn CategoryDetector>>> {
    let Some(url) = config.ai_detector_url.as_deref() else {
        tracing::info!("no category detector configured; unmapped paths use the default category");
        return Ok(None);
    };
    let api_key = config.ai_api_key.as_deref();
    let client = HttpCategoryDetector::with_base_url(api_key, config.ai_timeout_secs, url)
        .context("failed to build category detector client")?
        .with_retry(retry_policy(config));
    tracing::info!(endpoint = %client.endpoint(), "category detector enabled");
    Ok(Some(Arc::new(client)))
}

fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.ai_max_retries,
        backoff_base_ms: config.ai_retry_backoff_base_ms,
    }
}

/// Upper bound for one classification: every attempt running into the
/// request timeout plus the longest back-off between them.
pub(crate) fn detection_budget(timeout_secs: u64, retry: RetryPolicy) -> Duration {
    let attempts = u64::from(retry.max_retries) + 1;
    Duration::from_secs(timeout_secs.saturating_mul(attempts)) + retry.max_backoff()
}

impl Runtime {
    /// Builds every component and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the variant pattern file or an HTTP client cannot
    /// be loaded, or if the queue fails to start.
    pub(crate) fn build(config: &AppConfig, pool: sqlx::PgPool) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::new(pool));

        let categories = Arc::new(CategoryMapper::new(
            Arc::clone(&store) as Arc<dyn CategoryMappingStore>,
            Arc::clone(&store) as Arc<dyn TaxonomyStore>,
            build_category_detector(config)?,
            CategoryMapperConfig {
                default_category_id: config.default_category_id,
                fallback_confidence: FALLBACK_CONFIDENCE,
                detection_timeout: detection_budget(config.ai_timeout_secs, retry_policy(config)),
            },
        ));
        let attributes = Arc::new(AttributeMapper::new(
            Arc::clone(&store) as Arc<dyn TaxonomyStore>
        ));
        let variants = Arc::new(build_variant_detector(config)?);
        let downloader = CatalogDownloader::new(DownloadConfig {
            timeout: Duration::from_secs(config.download_timeout_secs),
            max_bytes: config.download_max_bytes,
        })
        .context("failed to build catalog download client")?;

        let worker = ImportWorker::new(
            Arc::clone(&store) as Arc<dyn ImportJobStore>,
            Arc::clone(&store) as Arc<dyn ProductStore>,
            Arc::clone(&variants),
            Arc::clone(&categories),
            Arc::clone(&attributes),
        );
        let queue = Arc::new(ImportQueueManager::new(
            worker,
            QueueConfig {
                workers: config.queue_workers,
                capacity: config.queue_capacity,
            },
        ));
        queue.start()?;

        let service = ImportService::new(
            store as Arc<dyn ImportJobStore>,
            queue,
            variants,
            Arc::clone(&categories),
            attributes,
        )
        .with_downloader(downloader);
        Ok(Self {
            service,
            categories,
        })
    }

    pub(crate) async fn shutdown(&self) {
        self.service.queue().stop().await;
    }
}
