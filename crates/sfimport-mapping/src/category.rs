//! External category path → internal category resolution.
//!
//! Resolution order for one `(storefront_id, path)`:
//!
//! 1. in-process cache,
//! 2. persisted mapping,
//! 3. the classifier (bounded by a timeout), whose answer is persisted,
//! 4. a fixed fallback category flagged for manual review.
//!
//! [`CategoryMapper::get_or_create_mapping`] never fails; every problem
//! degrades to step 4.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use sfimport_core::{CategoryMappingSuggestion, NewCategoryMapping, StorefrontCategoryMapping};

use crate::error::MappingError;
use crate::normalize::{category_hints, normalize_category_path};
use crate::traits::{CategoryDetector, CategoryMappingStore, DetectionRequest, TaxonomyStore};

pub const DEFAULT_CATEGORY_ID: i64 = 1001;
pub const FALLBACK_CONFIDENCE: f64 = 0.1;
/// Detected mappings below this confidence are flagged for manual review.
pub const REVIEW_THRESHOLD: f64 = 0.7;
pub const HIGH_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryMapperConfig {
    pub default_category_id: i64,
    pub fallback_confidence: f64,
    pub detection_timeout: Duration,
}

impl Default for CategoryMapperConfig {
    fn default() -> Self {
        Self {
            default_category_id: DEFAULT_CATEGORY_ID,
            fallback_confidence: FALLBACK_CONFIDENCE,
            detection_timeout: Duration::from_secs(30),
        }
    }
}

/// Where a resolved category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Stored mapping produced by an earlier detection.
    Cached,
    /// Operator pin.
    Manual,
    /// Fresh classifier answer.
    Detected,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResolution {
    pub category_id: i64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub source: ResolutionSource,
    pub manual_review_required: bool,
    pub normalized_path: String,
}

/// One external category string with a representative product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySample {
    pub external_category: String,
    pub title: String,
    pub description: Option<String>,
}

/// Confidence tiers over a batch of suggestions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingQualitySummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub average_confidence: f64,
    /// External categories in the low tier.
    pub needs_review: Vec<String>,
}

#[derive(Debug, Clone)]
struct CachedMapping {
    category_id: i64,
    reasoning: Option<String>,
    is_manual: bool,
}

impl From<&StorefrontCategoryMapping> for CachedMapping {
    fn from(m: &StorefrontCategoryMapping) -> Self {
        Self {
            category_id: m.category_id,
            reasoning: m.reasoning.clone(),
            is_manual: m.is_manual,
        }
    }
}

type CacheKey = (i64, String);

/// Resolves external category paths, shared by every worker.
pub struct CategoryMapper {
    mappings: Arc<dyn CategoryMappingStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
    detector: Option<Arc<dyn CategoryDetector>>,
    config: CategoryMapperConfig,
    cache: RwLock<HashMap<CacheKey, CachedMapping>>,
}

impl CategoryMapper {
    /// `detector` may be `None` when no classifier is configured; unknown
    /// paths then resolve to the fallback category.
    #[must_use]
    pub fn new(
        mappings: Arc<dyn CategoryMappingStore>,
        taxonomy: Arc<dyn TaxonomyStore>,
        detector: Option<Arc<dyn CategoryDetector>>,
        config: CategoryMapperConfig,
    ) -> Self {
        Self {
            mappings,
            taxonomy,
            detector,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CategoryMapperConfig {
        &self.config
    }

    /// Resolves `external_path` for `storefront_id`, calling the classifier
    /// at most once per unseen path.
    pub async fn get_or_create_mapping(
        &self,
        storefront_id: i64,
        external_path: &str,
        title: &str,
        description: Option<&str>,
    ) -> CategoryResolution {
        let normalized = normalize_category_path(external_path);
        if normalized.is_empty() {
            return self.fallback(normalized, "no external category");
        }

        match self.lookup_normalized(storefront_id, &normalized).await {
            Ok(Some(found)) => return found,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    error = %e,
                    "category mapping lookup failed; treating as miss"
                );
            }
        }

        let Some(detector) = &self.detector else {
            return self.fallback(normalized, "no category classifier configured");
        };

        let request = DetectionRequest {
            title: title.to_string(),
            description: description.map(str::to_string),
            hints: category_hints(&normalized),
        };
        let timeout = self.config.detection_timeout;
        let detected = match tokio::time::timeout(timeout, detector.detect_category(&request)).await
        {
            Ok(Ok(detected)) => detected,
            Ok(Err(e)) => {
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    error = %e,
                    "category detection failed"
                );
                return self.fallback(normalized, "category detection failed");
            }
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let err = MappingError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                };
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    error = %err,
                    "category detection timed out"
                );
                return self.fallback(normalized, "category detection timed out");
            }
        };

        match self.taxonomy.get_category_by_id(detected.category_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    category_id = detected.category_id,
                    "classifier returned an unknown category"
                );
                return self.fallback(normalized, "classifier returned an unknown category");
            }
            Err(e) => {
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    error = %e,
                    "category lookup failed"
                );
                return self.fallback(normalized, "category lookup failed");
            }
        }

        let confidence = detected.confidence.clamp(0.0, 1.0);
        let new_mapping = NewCategoryMapping {
            storefront_id,
            external_path: external_path.trim().to_string(),
            normalized_path: normalized.clone(),
            category_id: detected.category_id,
            confidence,
            reasoning: detected.reasoning.clone(),
            is_manual: false,
        };

        match self.mappings.insert_mapping(&new_mapping).await {
            Ok(stored) => {
                self.remember(storefront_id, &normalized, CachedMapping::from(&stored));
                if stored.category_id != detected.category_id || stored.is_manual {
                    // Another writer stored this path first; its row wins.
                    return Self::from_stored(&stored, normalized);
                }
            }
            Err(e) => {
                tracing::warn!(
                    storefront_id,
                    path = %normalized,
                    error = %e,
                    "failed to persist detected category mapping"
                );
            }
        }

        tracing::debug!(
            storefront_id,
            path = %normalized,
            category_id = detected.category_id,
            confidence,
            "category detected"
        );
        CategoryResolution {
            category_id: detected.category_id,
            confidence,
            reasoning: detected.reasoning,
            source: ResolutionSource::Detected,
            manual_review_required: confidence < REVIEW_THRESHOLD,
            normalized_path: normalized,
        }
    }

    /// Cache and store lookup only; never calls the classifier.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Store`] if the mapping store fails.
    pub async fn lookup_mapping(
        &self,
        storefront_id: i64,
        external_path: &str,
    ) -> Result<Option<CategoryResolution>, MappingError> {
        let normalized = normalize_category_path(external_path);
        if normalized.is_empty() {
            return Ok(None);
        }
        self.lookup_normalized(storefront_id, &normalized).await
    }

    /// Fallback resolution for a path the caller could not or must not
    /// resolve, such as an unpinned path under manual mapping.
    #[must_use]
    pub fn default_resolution(&self, external_path: &str, reason: &str) -> CategoryResolution {
        self.fallback(normalize_category_path(external_path), reason)
    }

    /// Pins `external_path` to `category_id` for a storefront. Later
    /// detections never replace a pinned mapping.
    ///
    /// # Errors
    ///
    /// - [`MappingError::EmptyCategoryPath`] if the path normalizes to nothing.
    /// - [`MappingError::UnknownCategory`] if the category does not exist.
    /// - [`MappingError::Store`] on persistence failure.
    pub async fn pin_mapping(
        &self,
        storefront_id: i64,
        external_path: &str,
        category_id: i64,
    ) -> Result<StorefrontCategoryMapping, MappingError> {
        let normalized = normalize_category_path(external_path);
        if normalized.is_empty() {
            return Err(MappingError::EmptyCategoryPath);
        }
        if self.taxonomy.get_category_by_id(category_id).await?.is_none() {
            return Err(MappingError::UnknownCategory(category_id));
        }

        let stored = self
            .mappings
            .upsert_manual_mapping(&NewCategoryMapping {
                storefront_id,
                external_path: external_path.trim().to_string(),
                normalized_path: normalized.clone(),
                category_id,
                confidence: 1.0,
                reasoning: Some("pinned by operator".to_string()),
                is_manual: true,
            })
            .await?;
        self.remember(storefront_id, &normalized, CachedMapping::from(&stored));
        tracing::info!(storefront_id, path = %normalized, category_id, "category mapping pinned");
        Ok(stored)
    }

    /// Every persisted mapping of a storefront.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Store`] if the mapping store fails.
    pub async fn list_mappings(
        &self,
        storefront_id: i64,
    ) -> Result<Vec<StorefrontCategoryMapping>, MappingError> {
        Ok(self.mappings.list_mappings(storefront_id).await?)
    }

    /// Resolves each sample and returns one suggestion per distinct external
    /// category. Samples whose category is blank are skipped.
    pub async fn suggest_mappings(
        &self,
        storefront_id: i64,
        samples: &[CategorySample],
    ) -> Vec<CategoryMappingSuggestion> {
        let mut seen = std::collections::HashSet::new();
        let mut suggestions = Vec::with_capacity(samples.len());
        for sample in samples {
            let normalized = normalize_category_path(&sample.external_category);
            if normalized.is_empty() {
                tracing::debug!(
                    storefront_id,
                    external_category = %sample.external_category,
                    "skipping blank category"
                );
                continue;
            }
            if !seen.insert(normalized) {
                continue;
            }
            let resolved = self
                .get_or_create_mapping(
                    storefront_id,
                    &sample.external_category,
                    &sample.title,
                    sample.description.as_deref(),
                )
                .await;
            suggestions.push(CategoryMappingSuggestion {
                external_category: sample.external_category.clone(),
                normalized_path: resolved.normalized_path,
                suggested_category_id: resolved.category_id,
                confidence: resolved.confidence,
                reasoning: resolved.reasoning,
                is_manual: resolved.source == ResolutionSource::Manual,
                from_cache: matches!(
                    resolved.source,
                    ResolutionSource::Cached | ResolutionSource::Manual
                ),
            });
        }
        suggestions
    }

    async fn lookup_normalized(
        &self,
        storefront_id: i64,
        normalized: &str,
    ) -> Result<Option<CategoryResolution>, MappingError> {
        let key = (storefront_id, normalized.to_string());
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(hit) = cached {
            return Ok(Some(Self::from_cached(&hit, normalized.to_string())));
        }

        let Some(stored) = self.mappings.find_mapping(storefront_id, normalized).await? else {
            return Ok(None);
        };
        let entry = CachedMapping::from(&stored);
        self.remember(storefront_id, normalized, entry);
        Ok(Some(Self::from_stored(&stored, normalized.to_string())))
    }

    fn remember(&self, storefront_id: i64, normalized: &str, entry: CachedMapping) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((storefront_id, normalized.to_string()), entry);
    }

    fn from_stored(stored: &StorefrontCategoryMapping, normalized: String) -> CategoryResolution {
        Self::from_cached(&CachedMapping::from(stored), normalized)
    }

    /// Persisted mappings are trusted outright.
    fn from_cached(hit: &CachedMapping, normalized: String) -> CategoryResolution {
        CategoryResolution {
            category_id: hit.category_id,
            confidence: 1.0,
            reasoning: hit.reasoning.clone(),
            source: if hit.is_manual {
                ResolutionSource::Manual
            } else {
                ResolutionSource::Cached
            },
            manual_review_required: false,
            normalized_path: normalized,
        }
    }

    fn fallback(&self, normalized: String, reason: &str) -> CategoryResolution {
        CategoryResolution {
            category_id: self.config.default_category_id,
            confidence: self.config.fallback_confidence,
            reasoning: Some(format!("{reason}; manual review required")),
            source: ResolutionSource::Fallback,
            manual_review_required: true,
            normalized_path: normalized,
        }
    }
}

/// Buckets suggestions into high (≥ 0.90), medium (≥ 0.70) and low tiers.
#[must_use]
pub fn summarize_quality(suggestions: &[CategoryMappingSuggestion]) -> MappingQualitySummary {
    let mut summary = MappingQualitySummary {
        total: suggestions.len(),
        ..MappingQualitySummary::default()
    };
    let mut sum = 0.0;
    for s in suggestions {
        sum += s.confidence;
        if s.confidence >= HIGH_CONFIDENCE {
            summary.high += 1;
        } else if s.confidence >= REVIEW_THRESHOLD {
            summary.medium += 1;
        } else {
            summary.low += 1;
            summary.needs_review.push(s.external_category.clone());
        }
    }
    if !suggestions.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let n = suggestions.len() as f64;
        summary.average_confidence = sum / n;
    }
    summary
}
