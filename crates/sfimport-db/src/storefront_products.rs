//! Write side of `storefront_products` used by the import worker.

use sfimport_core::ImportProductRequest;
use sfimport_pipeline::ExistingProduct;
use sqlx::PgPool;

use crate::DbError;

fn attributes_json(product: &ImportProductRequest) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(&product.attributes).map_err(|source| DbError::Json {
        column: "storefront_products.attributes",
        source,
    })
}

/// Finds a product of the storefront by exact SKU.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_storefront_product_by_sku(
    pool: &PgPool,
    storefront_id: i64,
    sku: &str,
) -> Result<Option<ExistingProduct>, DbError> {
    let row = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, sku FROM storefront_products \
         WHERE storefront_id = $1 AND sku = $2",
    )
    .bind(storefront_id)
    .bind(sku)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, sku)| ExistingProduct { id, sku }))
}

/// Inserts a product and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including a unique
/// violation on `(storefront_id, sku)`.
pub async fn create_storefront_product(
    pool: &PgPool,
    storefront_id: i64,
    product: &ImportProductRequest,
) -> Result<i64, DbError> {
    let attributes = attributes_json(product)?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO storefront_products \
             (storefront_id, name, description, price, currency, wholesale_price, sale_price, \
              stock_quantity, sku, barcode, image_urls, attributes, category_id, \
              is_active, on_sale) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::jsonb, $13, $14, $15) \
         RETURNING id",
    )
    .bind(storefront_id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(&product.currency)
    .bind(product.wholesale_price)
    .bind(product.sale_price)
    .bind(product.stock_quantity)
    .bind(&product.sku)
    .bind(&product.barcode)
    .bind(&product.image_urls)
    .bind(attributes)
    .bind(product.category_id)
    .bind(product.is_active)
    .bind(product.on_sale)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Replaces every imported field of an existing product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_storefront_product(
    pool: &PgPool,
    product_id: i64,
    product: &ImportProductRequest,
) -> Result<(), DbError> {
    let attributes = attributes_json(product)?;

    let result = sqlx::query(
        "UPDATE storefront_products SET \
             name            = $1, \
             description     = $2, \
             price           = $3, \
             currency        = $4, \
             wholesale_price = $5, \
             sale_price      = $6, \
             stock_quantity  = $7, \
             barcode         = $8, \
             image_urls      = $9, \
             attributes      = $10::jsonb, \
             category_id     = $11, \
             is_active       = $12, \
             on_sale         = $13, \
             updated_at      = NOW() \
         WHERE id = $14",
    )
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(&product.currency)
    .bind(product.wholesale_price)
    .bind(product.sale_price)
    .bind(product.stock_quantity)
    .bind(&product.barcode)
    .bind(&product.image_urls)
    .bind(attributes)
    .bind(product.category_id)
    .bind(product.is_active)
    .bind(product.on_sale)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            entity: "product",
            key: product_id.to_string(),
        });
    }
    Ok(())
}
