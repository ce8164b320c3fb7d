//! Variant family detection.
//!
//! Records are bucketed by the base name left over after stripping colour,
//! size and model tokens. A bucket only becomes a family when it is large
//! enough and enough of its members carry an extractable variant attribute;
//! otherwise its members stay independent products.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use sfimport_core::ImportProductRequest;

use crate::error::VariantError;
use crate::patterns::{PatternSet, PatternTables};

/// Maximum stripping passes. Each pass removes tokens exposed by the previous
/// one; real names settle in two or three.
const MAX_STRIP_PASSES: usize = 8;

const TRAILING_PUNCTUATION: &[char] = &[
    '-', '–', '—', ',', '/', '|', ':', ';', '.', '+', '_', '(', '[',
];
const LEADING_PUNCTUATION: &[char] = &[
    '-', '–', '—', ',', '/', '|', ':', ';', '.', '+', '_', ')', ']',
];

/// Grouping thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Smallest bucket that may become a family.
    pub min_group_size: usize,
    /// Share of bucket members that must yield at least one attribute.
    pub min_confidence: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_group_size: 2,
            min_confidence: 0.7,
        }
    }
}

/// Attribute name → lower-cased token, e.g. `color → "red"`.
pub type VariantAttributes = BTreeMap<String, String>;

/// One record inside a [`VariantGroup`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductVariant {
    /// Position of the record in the input slice.
    pub source_index: usize,
    pub product: ImportProductRequest,
    pub variant_attributes: VariantAttributes,
}

/// A variant family, or a single ungrouped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantGroup {
    pub base_name: String,
    pub variants: Vec<ProductVariant>,
    /// Index into `variants` of the representative product.
    pub base_index: usize,
    /// Attribute names whose values differ across the members.
    pub variant_attribute_names: BTreeSet<String>,
    pub variant_count: usize,
    pub confidence: f64,
    pub is_grouped: bool,
}

impl VariantGroup {
    /// The member chosen to represent the family.
    #[must_use]
    pub fn base_product(&self) -> Option<&ProductVariant> {
        self.variants.get(self.base_index)
    }

    fn singleton(variant: ProductVariant) -> Self {
        Self {
            base_name: variant.product.name.trim().to_string(),
            variants: vec![variant],
            base_index: 0,
            variant_attribute_names: BTreeSet::new(),
            variant_count: 1,
            confidence: 1.0,
            is_grouped: false,
        }
    }
}

/// Groups product records into variant families.
#[derive(Debug, Clone)]
pub struct VariantDetector {
    patterns: PatternSet,
    config: DetectorConfig,
}

impl Default for VariantDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl VariantDetector {
    /// A detector over the built-in pattern tables.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            patterns: PatternSet::builtin(),
            config,
        }
    }

    /// A detector over the built-in tables extended with `extra`.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::InvalidPattern`] if an extra pattern does not
    /// compile.
    pub fn with_extra_patterns(
        config: DetectorConfig,
        extra: PatternTables,
    ) -> Result<Self, VariantError> {
        let mut tables = PatternTables::builtin();
        tables.extend(extra);
        Ok(Self {
            patterns: PatternSet::compile(&tables)?,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Strips every variant token from `name`.
    ///
    /// The result is a fixed point: feeding it back returns it unchanged. If
    /// stripping would leave nothing, the whitespace-collapsed input is
    /// returned instead.
    #[must_use]
    pub fn extract_base_name(&self, name: &str) -> String {
        let original = collapse_whitespace(name);
        let mut current = original.clone();
        for _ in 0..MAX_STRIP_PASSES {
            let next = self.strip_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        if current.is_empty() {
            original
        } else {
            current
        }
    }

    fn strip_pass(&self, name: &str) -> String {
        let mut stripped = name.to_string();
        for class in &self.patterns.classes {
            for re in &class.regexes {
                stripped = re.replace_all(&stripped, " ").into_owned();
            }
        }
        tidy(&stripped)
    }

    /// Extracts the first token of each class present in `name`.
    #[must_use]
    pub fn extract_attributes(&self, name: &str) -> VariantAttributes {
        let mut attributes = VariantAttributes::new();
        for class in &self.patterns.classes {
            let earliest = class
                .regexes
                .iter()
                .filter_map(|re| re.captures(name))
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let value = caps.name("value").unwrap_or(whole);
                    Some((whole.start(), std::cmp::Reverse(whole.len()), value.as_str()))
                })
                .min_by_key(|(start, len, _)| (*start, *len));
            if let Some((_, _, value)) = earliest {
                let value = collapse_whitespace(&value.to_lowercase());
                if !value.is_empty() {
                    attributes.insert(class.class.as_str().to_string(), value);
                }
            }
        }
        attributes
    }

    /// Buckets `products` into variant families.
    ///
    /// Buckets are keyed by lower-cased base name and kept in first-seen
    /// order. Buckets below `min_group_size`, and buckets whose share of
    /// members with extracted attributes is below `min_confidence`, become
    /// singleton entries. The result is stably sorted by descending variant
    /// count.
    #[must_use]
    pub fn group_products(&self, products: &[ImportProductRequest]) -> Vec<VariantGroup> {
        let mut order: Vec<String> = Vec::new();
        let mut buckets: HashMap<String, (String, Vec<ProductVariant>)> = HashMap::new();

        for (source_index, product) in products.iter().enumerate() {
            let base_name = self.extract_base_name(&product.name);
            let key = base_name.to_lowercase();
            let variant = ProductVariant {
                source_index,
                product: product.clone(),
                variant_attributes: self.extract_attributes(&product.name),
            };
            buckets
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    (base_name, Vec::new())
                })
                .1
                .push(variant);
        }

        let mut groups = Vec::with_capacity(order.len());
        for key in order {
            let Some((base_name, members)) = buckets.remove(&key) else {
                continue;
            };
            self.settle_bucket(base_name, members, &mut groups);
        }
        groups.sort_by(|a, b| b.variant_count.cmp(&a.variant_count));
        groups
    }

    fn settle_bucket(
        &self,
        base_name: String,
        members: Vec<ProductVariant>,
        groups: &mut Vec<VariantGroup>,
    ) {
        if members.len() < self.config.min_group_size.max(2) {
            groups.extend(members.into_iter().map(VariantGroup::singleton));
            return;
        }

        let confidence = bucket_confidence(&members);
        if confidence < self.config.min_confidence {
            tracing::debug!(
                base_name = %base_name,
                members = members.len(),
                confidence,
                "variant bucket below confidence threshold, keeping products separate"
            );
            groups.extend(members.into_iter().map(VariantGroup::singleton));
            return;
        }

        let base_index = members
            .iter()
            .position(|m| m.product.primary_image().is_some())
            .unwrap_or(0);
        let variant_attribute_names = varying_attribute_names(&members);
        groups.push(VariantGroup {
            base_name,
            variant_count: members.len(),
            variants: members,
            base_index,
            variant_attribute_names,
            confidence,
            is_grouped: true,
        });
    }

    /// Non-fatal consistency checks on an accepted family.
    ///
    /// Warns when a member lacks an attribute other members declare, and when
    /// two members have identical attribute sets (likely duplicate rows).
    #[must_use]
    pub fn validate_variant_group(&self, group: &VariantGroup) -> Vec<String> {
        let mut warnings = Vec::new();
        if group.variants.len() < 2 {
            return warnings;
        }

        let declared: BTreeSet<&str> = group
            .variants
            .iter()
            .flat_map(|v| v.variant_attributes.keys().map(String::as_str))
            .collect();
        for variant in &group.variants {
            for name in &declared {
                if !variant.variant_attributes.contains_key(*name) {
                    warnings.push(format!(
                        "variant \"{}\" is missing attribute \"{name}\" declared by other members of \"{}\"",
                        variant.product.name, group.base_name
                    ));
                }
            }
        }

        for (i, left) in group.variants.iter().enumerate() {
            for right in &group.variants[i + 1..] {
                if left.variant_attributes == right.variant_attributes {
                    warnings.push(format!(
                        "variants \"{}\" and \"{}\" of \"{}\" have identical attributes",
                        left.product.name, right.product.name, group.base_name
                    ));
                }
            }
        }
        warnings
    }
}

/// `k / n` where `k` members yielded at least one attribute.
#[allow(clippy::cast_precision_loss)]
fn bucket_confidence(members: &[ProductVariant]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let with_attributes = members
        .iter()
        .filter(|m| !m.variant_attributes.is_empty())
        .count();
    with_attributes as f64 / members.len() as f64
}

fn varying_attribute_names(members: &[ProductVariant]) -> BTreeSet<String> {
    let mut values: BTreeMap<&str, BTreeSet<Option<&str>>> = BTreeMap::new();
    for name in members.iter().flat_map(|m| m.variant_attributes.keys()) {
        values.entry(name.as_str()).or_default();
    }
    for member in members {
        for (name, seen) in &mut values {
            seen.insert(member.variant_attributes.get(*name).map(String::as_str));
        }
    }
    values
        .into_iter()
        .filter(|(_, seen)| seen.len() > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes bracket pairs emptied by stripping, collapses whitespace and trims
/// dangling separators at both ends.
fn tidy(s: &str) -> String {
    let mut out = collapse_whitespace(s);
    loop {
        let next = collapse_whitespace(
            &out.replace("()", " ")
                .replace("( )", " ")
                .replace("[]", " ")
                .replace("[ ]", " "),
        );
        let next = next
            .trim_end_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c))
            .trim_start_matches(|c: char| c.is_whitespace() || LEADING_PUNCTUATION.contains(&c))
            .to_string();
        if next == out {
            return out;
        }
        out = next;
    }
}
