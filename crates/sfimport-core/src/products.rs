use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attribute bag keyed by attribute code. Ordered so that persistence and
/// comparisons are deterministic.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attribute key under which parsers carry the external category path.
pub const ORIGINAL_CATEGORY_ATTRIBUTE: &str = "original_category";

/// Attribute key set on members of an accepted variant family.
pub const VARIANT_GROUP_ATTRIBUTE: &str = "variant_group";

/// A typed attribute value.
///
/// Parsers only ever produce [`AttributeValue::Text`]; the attribute mapper
/// converts values to the template's declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl AttributeValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::Text(value.into())
    }

    /// Returns the inner string for text values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// A normalized product record produced by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// ISO 4217 code, upper-cased. Defaults to `RSD`.
    pub currency: String,
    pub wholesale_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub image_urls: Vec<String>,
    pub attributes: Attributes,
    pub is_active: bool,
    pub on_sale: bool,
    /// Internal category, filled in by the category mapping step.
    pub category_id: Option<i64>,
    /// Source row (CSV) or record ordinal (XML) for error reporting.
    pub line_number: i32,
    /// Archive entry the record came from. Line numbers restart per entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ImportProductRequest {
    /// Creates a record with the parser defaults: `RSD`, zero stock, active.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal, line_number: i32) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            currency: "RSD".to_string(),
            wholesale_price: None,
            sale_price: None,
            stock_quantity: 0,
            sku: None,
            barcode: None,
            image_urls: Vec::new(),
            attributes: Attributes::new(),
            is_active: true,
            on_sale: false,
            category_id: None,
            line_number,
            source: None,
        }
    }

    /// The external category path carried from the source file, if any.
    #[must_use]
    pub fn original_category(&self) -> Option<&str> {
        self.attributes
            .get(ORIGINAL_CATEGORY_ATTRIBUTE)
            .and_then(AttributeValue::as_text)
            .filter(|s| !s.trim().is_empty())
    }

    /// First image URL, used as the representative image of a record.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.image_urls
            .iter()
            .map(String::as_str)
            .find(|url| !url.trim().is_empty())
    }
}

/// A non-fatal, field-level problem found while parsing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportValidationError {
    pub field: String,
    pub message: String,
    pub value: Option<String>,
    pub line_number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ImportValidationError {
    #[must_use]
    pub fn new(
        line_number: i32,
        field: impl Into<String>,
        message: impl Into<String>,
        value: Option<&str>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: value.map(str::to_owned),
            line_number,
            source: None,
        }
    }

    /// Location for messages: `line 3`, or `b.csv line 3` inside an archive.
    #[must_use]
    pub fn location(&self) -> String {
        record_location(self.source.as_deref(), self.line_number)
    }
}

/// Formats a record position for operator-facing messages.
#[must_use]
pub fn record_location(source: Option<&str>, line_number: i32) -> String {
    match source {
        Some(source) => format!("{source} line {line_number}"),
        None => format!("line {line_number}"),
    }
}
