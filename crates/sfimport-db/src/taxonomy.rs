//! Read-only access to `categories` and `attribute_templates`.

use sfimport_core::{AttributeTemplate, Category, ValidationRules};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            parent_id: row.parent_id,
        }
    }
}

/// A row from the `attribute_templates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeTemplateRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub value_type: String,
    pub purpose: String,
    /// `JSONB NOT NULL DEFAULT '{}'`.
    pub validation_rules: serde_json::Value,
    pub is_searchable: bool,
    pub is_filterable: bool,
    pub is_required: bool,
    pub category_ids: Vec<i64>,
}

impl TryFrom<AttributeTemplateRow> for AttributeTemplate {
    type Error = DbError;

    fn try_from(row: AttributeTemplateRow) -> Result<Self, Self::Error> {
        let validation_rules: ValidationRules = serde_json::from_value(row.validation_rules)
            .map_err(|source| DbError::Json {
                column: "attribute_templates.validation_rules",
                source,
            })?;
        Ok(AttributeTemplate {
            id: row.id,
            code: row.code,
            name: row.name,
            value_type: row.value_type.parse()?,
            purpose: row.purpose.parse()?,
            validation_rules,
            is_searchable: row.is_searchable,
            is_filterable: row.is_filterable,
            is_required: row.is_required,
            category_ids: row.category_ids,
        })
    }
}

/// Fetches one category by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category(pool: &PgPool, id: i64) -> Result<Option<Category>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug, parent_id FROM categories WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Category::from))
}

/// Every active attribute template ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or a conversion error if a
/// stored row is malformed.
pub async fn list_attribute_templates(pool: &PgPool) -> Result<Vec<AttributeTemplate>, DbError> {
    let rows = sqlx::query_as::<_, AttributeTemplateRow>(
        "SELECT id, code, name, value_type, purpose, validation_rules, \
                is_searchable, is_filterable, is_required, category_ids \
         FROM attribute_templates \
         WHERE is_active = TRUE \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AttributeTemplate::try_from).collect()
}
