//! Internal taxonomy and mapping result types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::products::AttributeValue;
use crate::CoreError;

/// Declared value type of an attribute template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValueType {
    Text,
    Number,
    Boolean,
    Date,
    Select,
}

impl AttributeValueType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeValueType::Text => "text",
            AttributeValueType::Number => "number",
            AttributeValueType::Boolean => "boolean",
            AttributeValueType::Date => "date",
            AttributeValueType::Select => "select",
        }
    }
}

impl fmt::Display for AttributeValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeValueType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "string" => Ok(AttributeValueType::Text),
            "number" | "numeric" => Ok(AttributeValueType::Number),
            "boolean" | "bool" => Ok(AttributeValueType::Boolean),
            "date" => Ok(AttributeValueType::Date),
            "select" | "multiselect" => Ok(AttributeValueType::Select),
            other => Err(CoreError::InvalidAttributeType(other.to_string())),
        }
    }
}

/// Whether an attribute describes the product, distinguishes variants, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributePurpose {
    #[default]
    Regular,
    Variant,
    Both,
}

impl AttributePurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttributePurpose::Regular => "regular",
            AttributePurpose::Variant => "variant",
            AttributePurpose::Both => "both",
        }
    }
}

impl FromStr for AttributePurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(AttributePurpose::Regular),
            "variant" => Ok(AttributePurpose::Variant),
            "both" => Ok(AttributePurpose::Both),
            other => Err(CoreError::InvalidAttributePurpose(other.to_string())),
        }
    }
}

/// Validation constraints stored alongside a template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed values for `select` attributes. Empty means unrestricted.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

/// Cached internal attribute definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeTemplate {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub value_type: AttributeValueType,
    pub purpose: AttributePurpose,
    pub validation_rules: ValidationRules,
    pub is_searchable: bool,
    pub is_filterable: bool,
    pub is_required: bool,
    /// Categories this attribute applies to. Empty means every category.
    pub category_ids: Vec<i64>,
}

impl AttributeTemplate {
    /// Returns `true` if the template may be used for `category_id`.
    #[must_use]
    pub fn applies_to(&self, category_id: Option<i64>) -> bool {
        match category_id {
            Some(id) => self.category_ids.is_empty() || self.category_ids.contains(&id),
            None => true,
        }
    }
}

/// A node of the internal category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
}

/// Result of mapping one external attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedAttribute {
    pub external_name: String,
    /// Resolved template id. `None` when no template matched.
    pub attribute_id: Option<i64>,
    pub attribute_code: Option<String>,
    pub value: AttributeValue,
    pub confidence: f64,
    pub is_new_attribute: bool,
    /// Proposed code for an unresolved attribute.
    pub suggested_code: Option<String>,
}

impl MappedAttribute {
    /// The key under which this attribute is stored on a product.
    #[must_use]
    pub fn storage_code(&self) -> &str {
        self.attribute_code
            .as_deref()
            .or(self.suggested_code.as_deref())
            .unwrap_or(self.external_name.as_str())
    }
}

/// A persisted external-path → internal-category mapping for one storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorefrontCategoryMapping {
    pub id: i64,
    pub storefront_id: i64,
    pub external_path: String,
    pub normalized_path: String,
    pub category_id: i64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    /// Pinned by an operator; never replaced by detection results.
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to persist a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCategoryMapping {
    pub storefront_id: i64,
    pub external_path: String,
    pub normalized_path: String,
    pub category_id: i64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub is_manual: bool,
}

/// Operator-facing suggestion for one external category string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMappingSuggestion {
    pub external_category: String,
    pub normalized_path: String,
    pub suggested_category_id: i64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub is_manual: bool,
    /// `true` when the suggestion came from a persisted mapping.
    pub from_cache: bool,
}
