//! Conversion of a flat `column → value` map into a normalized product.
//!
//! Both the CSV reader and the generic XML reader produce the same flat map
//! keyed by canonical column names, so validation lives in one place.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sfimport_core::{AttributeValue, ImportProductRequest, ImportValidationError};
use sfimport_core::ORIGINAL_CATEGORY_ATTRIBUTE;

use crate::fields::{is_explicit_false, is_truthy, parse_decimal, split_urls};

/// Column names understood by the record builder, in template order.
pub const CSV_COLUMNS: &[&str] = &[
    "name",
    "price",
    "currency",
    "sku",
    "description",
    "wholesale_price",
    "category",
    "stock_quantity",
    "barcode",
    "image_url",
    "is_active",
    "on_sale",
    "sale_price",
    "brand",
    "model",
    "country_of_origin",
];

/// Columns that map onto dedicated record fields. Everything else becomes an
/// attribute.
const FIELD_COLUMNS: &[&str] = &[
    "name",
    "price",
    "currency",
    "sku",
    "description",
    "wholesale_price",
    "category",
    "stock_quantity",
    "barcode",
    "image_url",
    "is_active",
    "on_sale",
    "sale_price",
];

pub(crate) const DEFAULT_CURRENCY: &str = "RSD";

pub(crate) type FieldMap = BTreeMap<String, String>;

fn non_empty<'a>(fields: &'a FieldMap, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parses a non-negative decimal. `Ok(None)` when the column is blank.
pub(crate) fn parse_price_field(
    raw: Option<&str>,
    field: &str,
    line: i32,
) -> Result<Option<Decimal>, ImportValidationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match parse_decimal(raw) {
        Some(value) if value.is_sign_negative() => Err(ImportValidationError::new(
            line,
            field,
            format!("{field} must not be negative"),
            Some(raw),
        )),
        Some(value) => Ok(Some(value)),
        None => Err(ImportValidationError::new(
            line,
            field,
            format!("invalid {field}"),
            Some(raw),
        )),
    }
}

fn parse_currency(raw: Option<&str>, line: i32) -> Result<String, ImportValidationError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_CURRENCY.to_string());
    };
    if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(raw.to_ascii_uppercase())
    } else {
        Err(ImportValidationError::new(
            line,
            "currency",
            "currency must be a three-letter ISO code",
            Some(raw),
        ))
    }
}

fn parse_stock(raw: Option<&str>, line: i32) -> Result<i32, ImportValidationError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    match raw.parse::<i32>() {
        Ok(qty) if qty < 0 => Err(ImportValidationError::new(
            line,
            "stock_quantity",
            "stock quantity must not be negative",
            Some(raw),
        )),
        Ok(qty) => Ok(qty),
        Err(_) => Err(ImportValidationError::new(
            line,
            "stock_quantity",
            "invalid stock quantity",
            Some(raw),
        )),
    }
}

/// Builds one product from canonical columns.
///
/// Every field is checked before returning so a row with several problems
/// reports all of them.
///
/// # Errors
///
/// Returns every field-level [`ImportValidationError`] found on the row.
pub(crate) fn product_from_fields(
    fields: &FieldMap,
    line: i32,
) -> Result<ImportProductRequest, Vec<ImportValidationError>> {
    let mut errors = Vec::new();

    let name = non_empty(fields, "name");
    if name.is_none() {
        errors.push(ImportValidationError::new(
            line,
            "name",
            "name is required",
            None,
        ));
    }

    let price = match parse_price_field(non_empty(fields, "price"), "price", line) {
        Ok(Some(price)) => Some(price),
        Ok(None) => {
            errors.push(ImportValidationError::new(
                line,
                "price",
                "price is required",
                None,
            ));
            None
        }
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let currency = parse_currency(non_empty(fields, "currency"), line)
        .map_err(|e| errors.push(e))
        .ok();
    let wholesale_price =
        parse_price_field(non_empty(fields, "wholesale_price"), "wholesale_price", line)
            .map_err(|e| errors.push(e))
            .ok()
            .flatten();
    let sale_price = parse_price_field(non_empty(fields, "sale_price"), "sale_price", line)
        .map_err(|e| errors.push(e))
        .ok()
        .flatten();
    let stock_quantity = parse_stock(non_empty(fields, "stock_quantity"), line)
        .map_err(|e| errors.push(e))
        .ok();

    let (Some(name), Some(price), Some(currency), Some(stock_quantity)) =
        (name, price, currency, stock_quantity)
    else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut product = ImportProductRequest::new(name, price, line);
    product.currency = currency;
    product.wholesale_price = wholesale_price;
    product.sale_price = sale_price;
    product.stock_quantity = stock_quantity;
    product.sku = non_empty(fields, "sku").map(str::to_string);
    product.barcode = non_empty(fields, "barcode").map(str::to_string);
    product.description = non_empty(fields, "description").map(str::to_string);
    product.image_urls = non_empty(fields, "image_url")
        .map(|raw| split_urls(raw).collect())
        .unwrap_or_default();
    product.is_active = !non_empty(fields, "is_active").is_some_and(is_explicit_false);
    product.on_sale = non_empty(fields, "on_sale").is_some_and(is_truthy);

    if let Some(category) = non_empty(fields, "category") {
        product.attributes.insert(
            ORIGINAL_CATEGORY_ATTRIBUTE.to_string(),
            AttributeValue::text(category),
        );
    }
    for (column, value) in fields {
        let value = value.trim();
        if value.is_empty() || FIELD_COLUMNS.contains(&column.as_str()) {
            continue;
        }
        product
            .attributes
            .insert(column.clone(), AttributeValue::text(value));
    }

    Ok(product)
}
