//! Category and attribute mapping onto the internal taxonomy.
//!
//! [`CategoryMapper`] resolves external category paths through a cache, the
//! persisted storefront mappings and finally an external classifier.
//! [`AttributeMapper`] resolves external attribute names against the cached
//! attribute templates and converts values to their declared types. Both are
//! shared by every import worker and synchronize internally.

pub mod attribute;
pub mod category;
pub mod detector_client;
pub mod error;
pub mod normalize;
mod retry;
pub mod traits;

pub use attribute::{transform_value, AttributeMapper};
pub use category::{
    summarize_quality, CategoryMapper, CategoryMapperConfig, CategoryResolution, CategorySample,
    MappingQualitySummary, ResolutionSource, DEFAULT_CATEGORY_ID, FALLBACK_CONFIDENCE,
};
pub use detector_client::{HttpCategoryDetector, RetryPolicy};
pub use error::MappingError;
pub use normalize::{normalize_attribute_name, normalize_category_path, suggested_code};
pub use traits::{
    CategoryDetector, CategoryHints, CategoryMappingStore, DetectedCategory, DetectionRequest,
    TaxonomyStore,
};
