//! Database operations for `storefront_category_mappings`.

use chrono::{DateTime, Utc};
use sfimport_core::{NewCategoryMapping, StorefrontCategoryMapping};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `storefront_category_mappings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryMappingRow {
    pub id: i64,
    pub storefront_id: i64,
    pub external_path: String,
    pub normalized_path: String,
    pub category_id: i64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryMappingRow> for StorefrontCategoryMapping {
    fn from(row: CategoryMappingRow) -> Self {
        StorefrontCategoryMapping {
            id: row.id,
            storefront_id: row.storefront_id,
            external_path: row.external_path,
            normalized_path: row.normalized_path,
            category_id: row.category_id,
            confidence: row.confidence,
            reasoning: row.reasoning,
            is_manual: row.is_manual,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const MAPPING_COLUMNS: &str = "id, storefront_id, external_path, normalized_path, category_id, \
     confidence, reasoning, is_manual, created_at, updated_at";

/// Looks up the mapping for `(storefront_id, normalized_path)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_category_mapping(
    pool: &PgPool,
    storefront_id: i64,
    normalized_path: &str,
) -> Result<Option<StorefrontCategoryMapping>, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM storefront_category_mappings \
         WHERE storefront_id = $1 AND normalized_path = $2"
    ))
    .bind(storefront_id)
    .bind(normalized_path)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StorefrontCategoryMapping::from))
}

/// Inserts a mapping unless one already exists for the same key, and
/// returns whichever row is stored. An existing row is never modified, so a
/// concurrent detection cannot overwrite a manual pin or an earlier result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or re-select fails.
pub async fn insert_category_mapping(
    pool: &PgPool,
    mapping: &NewCategoryMapping,
) -> Result<StorefrontCategoryMapping, DbError> {
    let inserted = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "INSERT INTO storefront_category_mappings \
             (storefront_id, external_path, normalized_path, category_id, \
              confidence, reasoning, is_manual) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (storefront_id, normalized_path) DO NOTHING \
         RETURNING {MAPPING_COLUMNS}"
    ))
    .bind(mapping.storefront_id)
    .bind(&mapping.external_path)
    .bind(&mapping.normalized_path)
    .bind(mapping.category_id)
    .bind(mapping.confidence)
    .bind(&mapping.reasoning)
    .bind(mapping.is_manual)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        return Ok(row.into());
    }

    find_category_mapping(pool, mapping.storefront_id, &mapping.normalized_path)
        .await?
        .ok_or_else(|| DbError::NotFound {
            entity: "category mapping",
            key: format!("{}:{}", mapping.storefront_id, mapping.normalized_path),
        })
}

/// Inserts or replaces the mapping for the key as an operator pin.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_manual_category_mapping(
    pool: &PgPool,
    mapping: &NewCategoryMapping,
) -> Result<StorefrontCategoryMapping, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "INSERT INTO storefront_category_mappings \
             (storefront_id, external_path, normalized_path, category_id, \
              confidence, reasoning, is_manual) \
         VALUES ($1, $2, $3, $4, $5, $6, TRUE) \
         ON CONFLICT (storefront_id, normalized_path) DO UPDATE SET \
             external_path = EXCLUDED.external_path, \
             category_id   = EXCLUDED.category_id, \
             confidence    = EXCLUDED.confidence, \
             reasoning     = EXCLUDED.reasoning, \
             is_manual     = TRUE, \
             updated_at    = NOW() \
         RETURNING {MAPPING_COLUMNS}"
    ))
    .bind(mapping.storefront_id)
    .bind(&mapping.external_path)
    .bind(&mapping.normalized_path)
    .bind(mapping.category_id)
    .bind(mapping.confidence)
    .bind(&mapping.reasoning)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// All mappings of a storefront ordered by normalized path.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_category_mappings(
    pool: &PgPool,
    storefront_id: i64,
) -> Result<Vec<StorefrontCategoryMapping>, DbError> {
    let rows = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM storefront_category_mappings \
         WHERE storefront_id = $1 \
         ORDER BY normalized_path"
    ))
    .bind(storefront_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StorefrontCategoryMapping::from).collect())
}
