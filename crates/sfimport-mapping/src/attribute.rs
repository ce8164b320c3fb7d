//! External attribute name → attribute template resolution.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use sfimport_core::{AttributeTemplate, AttributeValue, AttributeValueType, MappedAttribute};

use crate::error::MappingError;
use crate::normalize::{normalize_attribute_name, suggested_code};
use crate::traits::TaxonomyStore;

const EXACT_CODE_SCORE: f64 = 1.0;
const EXACT_NAME_SCORE: f64 = 0.95;
const SUBSTRING_SCORE: f64 = 0.8;
/// Score for a template matched outside the record's category scope.
const BASELINE_SCORE: f64 = 0.5;
const VALID_VALUE_BONUS: f64 = 0.1;
/// Shortest name that may take part in a substring match.
const MIN_SUBSTRING_LEN: usize = 3;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d.%m.%Y.", "%d/%m/%Y", "%Y/%m/%d"];

/// Maps external attribute names onto cached templates.
///
/// The template list is swapped atomically on reload, so readers never see
/// a partially loaded cache.
pub struct AttributeMapper {
    taxonomy: Arc<dyn TaxonomyStore>,
    templates: RwLock<Arc<Vec<AttributeTemplate>>>,
    learned: RwLock<HashMap<String, i64>>,
}

impl AttributeMapper {
    #[must_use]
    pub fn new(taxonomy: Arc<dyn TaxonomyStore>) -> Self {
        Self {
            taxonomy,
            templates: RwLock::new(Arc::new(Vec::new())),
            learned: RwLock::new(HashMap::new()),
        }
    }

    /// Reloads the template cache from the taxonomy store and returns the
    /// number of templates loaded.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Store`] if the store fails; the previous cache
    /// is kept in that case.
    pub async fn load_attributes_cache(&self) -> Result<usize, MappingError> {
        let templates = self.taxonomy.get_all_attributes().await?;
        let count = templates.len();
        *self.templates.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(templates);
        tracing::info!(count, "attribute template cache loaded");
        Ok(count)
    }

    #[must_use]
    pub fn cached_template_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Records a confirmed `external_name → attribute_id` association. Later
    /// lookups of the same normalized name resolve with full confidence.
    /// Returns `false` if no cached template has that id.
    pub fn learn(&self, external_name: &str, attribute_id: i64) -> bool {
        if !self.snapshot().iter().any(|t| t.id == attribute_id) {
            return false;
        }
        self.remember(normalize_attribute_name(external_name), attribute_id);
        true
    }

    #[must_use]
    pub fn learned_count(&self) -> usize {
        self.learned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn remember(&self, normalized: String, attribute_id: i64) {
        self.learned
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalized, attribute_id);
    }

    /// Resolves one external attribute and converts its value to the
    /// template's declared type.
    ///
    /// An in-scope exact code or name match is remembered, so the same
    /// external name resolves from the learned map on later records and
    /// jobs. Learned names only apply where their template is in scope.
    #[must_use]
    pub fn map_external_attribute(
        &self,
        name: &str,
        value: &str,
        category_id: Option<i64>,
    ) -> MappedAttribute {
        let normalized = normalize_attribute_name(name);
        let templates = self.snapshot();

        let learned_id = self
            .learned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalized)
            .copied();
        let learned = learned_id
            .and_then(|id| templates.iter().find(|t| t.id == id))
            .filter(|t| t.applies_to(category_id))
            .map(|t| (t, EXACT_CODE_SCORE));
        let matched = match learned {
            Some(hit) => Some(hit),
            None => {
                let found = best_match(&templates, &normalized, category_id);
                if let Some((template, score)) = found {
                    if score >= EXACT_NAME_SCORE {
                        tracing::debug!(
                            external_name = name,
                            attribute_id = template.id,
                            "learned attribute name"
                        );
                        self.remember(normalized.clone(), template.id);
                    }
                }
                found
            }
        };

        let Some((template, score)) = matched else {
            return MappedAttribute {
                external_name: name.to_string(),
                attribute_id: None,
                attribute_code: None,
                value: AttributeValue::text(value.trim()),
                confidence: 0.0,
                is_new_attribute: true,
                suggested_code: Some(suggested_code(name)),
            };
        };

        let (typed, valid) = transform_value(template, value);
        let bonus = if valid { VALID_VALUE_BONUS } else { 0.0 };
        MappedAttribute {
            external_name: name.to_string(),
            attribute_id: Some(template.id),
            attribute_code: Some(template.code.clone()),
            value: typed,
            confidence: (score + bonus).clamp(0.0, 1.0),
            is_new_attribute: false,
            suggested_code: None,
        }
    }

    /// Maps every `(name, value)` pair in order.
    pub fn map_attributes<'a, I>(
        &self,
        attributes: I,
        category_id: Option<i64>,
    ) -> Vec<MappedAttribute>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        attributes
            .into_iter()
            .map(|(name, value)| self.map_external_attribute(name, value, category_id))
            .collect()
    }

    fn snapshot(&self) -> Arc<Vec<AttributeTemplate>> {
        Arc::clone(&self.templates.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Name score of `template` for an already normalized external name.
fn name_score(template: &AttributeTemplate, normalized: &str) -> Option<f64> {
    let code = normalize_attribute_name(&template.code);
    let display = normalize_attribute_name(&template.name);
    if code == normalized {
        return Some(EXACT_CODE_SCORE);
    }
    if display == normalized {
        return Some(EXACT_NAME_SCORE);
    }
    let contains = |candidate: &str| {
        candidate.chars().count() >= MIN_SUBSTRING_LEN
            && normalized.chars().count() >= MIN_SUBSTRING_LEN
            && (candidate.contains(normalized) || normalized.contains(candidate))
    };
    if contains(&code) || contains(&display) {
        return Some(SUBSTRING_SCORE);
    }
    None
}

/// Best template for `normalized`. Templates scoped to `category_id` win
/// over out-of-scope ones, which score at the baseline regardless of how
/// well their name matched. Ties keep cache order.
fn best_match<'t>(
    templates: &'t [AttributeTemplate],
    normalized: &str,
    category_id: Option<i64>,
) -> Option<(&'t AttributeTemplate, f64)> {
    if normalized.is_empty() {
        return None;
    }
    let mut best: Option<(&AttributeTemplate, f64, bool)> = None;
    for template in templates {
        let Some(score) = name_score(template, normalized) else {
            continue;
        };
        let in_scope = template.applies_to(category_id);
        let better = match best {
            None => true,
            Some((_, best_score, best_scope)) => {
                (in_scope && !best_scope) || (in_scope == best_scope && score > best_score)
            }
        };
        if better {
            best = Some((template, score, in_scope));
        }
    }
    best.map(|(t, score, in_scope)| (t, if in_scope { score } else { BASELINE_SCORE }))
}

/// Converts `raw` to the template's value type. The flag reports whether the
/// value parsed and satisfied the template's validation rules; unparsable
/// values come back as trimmed text.
#[must_use]
pub fn transform_value(template: &AttributeTemplate, raw: &str) -> (AttributeValue, bool) {
    let trimmed = raw.trim();
    let rules = &template.validation_rules;
    let as_text = || AttributeValue::text(trimmed);

    match template.value_type {
        AttributeValueType::Number => match parse_number(trimmed) {
            Some(n) => {
                let in_range =
                    rules.min.is_none_or(|min| n >= min) && rules.max.is_none_or(|max| n <= max);
                (AttributeValue::Number(n), in_range)
            }
            None => (as_text(), false),
        },
        AttributeValueType::Boolean => match parse_bool(trimmed) {
            Some(b) => (AttributeValue::Boolean(b), true),
            None => (as_text(), false),
        },
        AttributeValueType::Date => match parse_date(trimmed) {
            Some(d) => (AttributeValue::Date(d), true),
            None => (as_text(), false),
        },
        AttributeValueType::Select => {
            if rules.options.is_empty() {
                return (as_text(), !trimmed.is_empty());
            }
            let wanted = trimmed.to_lowercase();
            match rules.options.iter().find(|o| o.trim().to_lowercase() == wanted) {
                Some(option) => (AttributeValue::text(option.trim()), true),
                None => (as_text(), false),
            }
        }
        AttributeValueType::Text => {
            let fits = rules.max_length.is_none_or(|max| trimmed.chars().count() <= max);
            (as_text(), fits)
        }
    }
}

/// Leading number of `s`, accepting a comma decimal separator and a trailing
/// unit such as `15 kg`.
fn parse_number(s: &str) -> Option<f64> {
    let unified = s.replace(',', ".");
    let mut end = 0;
    for (i, ch) in unified.char_indices() {
        if ch.is_ascii_digit() || ch == '.' || (i == 0 && (ch == '-' || ch == '+')) {
            end = i + ch.len_utf8();
        } else {
            break;
        }
    }
    let number = &unified[..end];
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let rest = unified[end..].trim();
    if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" | "da" | "да" | "есть" => Some(true),
        "false" | "no" | "n" | "0" | "off" | "ne" | "нет" | "не" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use sfimport_core::{AttributePurpose, ValidationRules};

    use super::*;

    fn template(value_type: AttributeValueType, rules: ValidationRules) -> AttributeTemplate {
        AttributeTemplate {
            id: 1,
            code: "weight".to_string(),
            name: "Weight".to_string(),
            value_type,
            purpose: AttributePurpose::Regular,
            validation_rules: rules,
            is_searchable: false,
            is_filterable: true,
            is_required: false,
            category_ids: vec![],
        }
    }

    // ----------------------------------------------------------------
    // value transformation
    // ----------------------------------------------------------------

    #[test]
    fn numbers_accept_comma_and_units() {
        assert_eq!(parse_number("1,5"), Some(1.5));
        assert_eq!(parse_number("15 kg"), Some(15.0));
        assert_eq!(parse_number("-3"), Some(-3.0));
        assert_eq!(parse_number("kg"), None);
        assert_eq!(parse_number("12 34"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn number_range_is_validated() {
        let t = template(
            AttributeValueType::Number,
            ValidationRules {
                min: Some(0.0),
                max: Some(100.0),
                ..ValidationRules::default()
            },
        );
        assert_eq!(transform_value(&t, "42"), (AttributeValue::Number(42.0), true));
        assert_eq!(transform_value(&t, "142"), (AttributeValue::Number(142.0), false));
        assert_eq!(transform_value(&t, "heavy"), (AttributeValue::text("heavy"), false));
    }

    #[test]
    fn booleans_are_multilingual() {
        let t = template(AttributeValueType::Boolean, ValidationRules::default());
        for raw in ["true", "Yes", "1", "da", "Да"] {
            assert_eq!(transform_value(&t, raw), (AttributeValue::Boolean(true), true), "{raw}");
        }
        for raw in ["false", "NO", "0", "ne", "нет"] {
            assert_eq!(transform_value(&t, raw), (AttributeValue::Boolean(false), true), "{raw}");
        }
        assert_eq!(transform_value(&t, "maybe"), (AttributeValue::text("maybe"), false));
    }

    #[test]
    fn dates_accept_common_formats() {
        let t = template(AttributeValueType::Date, ValidationRules::default());
        let expected = AttributeValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        for raw in ["2024-03-09", "09.03.2024", "09.03.2024.", "09/03/2024", "2024/03/09"] {
            assert_eq!(transform_value(&t, raw), (expected.clone(), true), "{raw}");
        }
        assert_eq!(transform_value(&t, "spring"), (AttributeValue::text("spring"), false));
    }

    #[test]
    fn select_canonicalizes_options() {
        let t = template(
            AttributeValueType::Select,
            ValidationRules {
                options: vec!["Pamuk".to_string(), "Poliester".to_string()],
                ..ValidationRules::default()
            },
        );
        assert_eq!(transform_value(&t, " pamuk "), (AttributeValue::text("Pamuk"), true));
        assert_eq!(transform_value(&t, "svila"), (AttributeValue::text("svila"), false));
    }

    #[test]
    fn text_respects_max_length() {
        let t = template(
            AttributeValueType::Text,
            ValidationRules {
                max_length: Some(5),
                ..ValidationRules::default()
            },
        );
        assert!(transform_value(&t, "short").1);
        assert!(!transform_value(&t, "too long").1);
    }
}
