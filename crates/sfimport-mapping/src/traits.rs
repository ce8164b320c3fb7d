//! Collaborator interfaces consumed by the mappers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sfimport_core::{
    AttributeTemplate, Category, NewCategoryMapping, StoreError, StorefrontCategoryMapping,
};

use crate::error::MappingError;

/// Persisted storefront category mappings, unique per
/// `(storefront_id, normalized_path)`.
#[async_trait]
pub trait CategoryMappingStore: Send + Sync {
    async fn find_mapping(
        &self,
        storefront_id: i64,
        normalized_path: &str,
    ) -> Result<Option<StorefrontCategoryMapping>, StoreError>;

    /// Inserts a mapping unless one already exists for the same key and
    /// returns whichever row is stored afterwards. An existing row is never
    /// modified.
    async fn insert_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError>;

    /// Creates or replaces the mapping for the key as a manual pin.
    async fn upsert_manual_mapping(
        &self,
        mapping: &NewCategoryMapping,
    ) -> Result<StorefrontCategoryMapping, StoreError>;

    async fn list_mappings(
        &self,
        storefront_id: i64,
    ) -> Result<Vec<StorefrontCategoryMapping>, StoreError>;
}

/// Read access to the internal taxonomy.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn get_all_attributes(&self) -> Result<Vec<AttributeTemplate>, StoreError>;

    async fn get_category_by_id(&self, id: i64) -> Result<Option<Category>, StoreError>;
}

/// Structured hints derived from an external category path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryHints {
    pub domain: Option<String>,
    pub product_type: Option<String>,
    pub keywords: Vec<String>,
}

/// Input for one classification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRequest {
    pub title: String,
    pub description: Option<String>,
    pub hints: CategoryHints,
}

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedCategory {
    pub category_id: i64,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Opaque category classification service.
#[async_trait]
pub trait CategoryDetector: Send + Sync {
    async fn detect_category(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectedCategory, MappingError>;
}
