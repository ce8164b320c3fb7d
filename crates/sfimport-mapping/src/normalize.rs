//! Key normalization for category paths and attribute names.

use crate::traits::CategoryHints;

/// Longest code [`suggested_code`] will produce, in characters.
pub const MAX_SUGGESTED_CODE_LEN: usize = 50;

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduces an external category path to a canonical `/`-separated form.
///
/// `/`, `>` and `|` always separate segments; `-` only does when surrounded by
/// whitespace, so `T-Shirts` stays one segment. Segments are trimmed,
/// lower-cased and emptied ones dropped. Normalizing a normalized path is a
/// no-op.
#[must_use]
pub fn normalize_category_path(path: &str) -> String {
    let chars: Vec<char> = path.chars().collect();
    let mut unified = String::with_capacity(path.len());
    for (i, &ch) in chars.iter().enumerate() {
        let spaced_dash = ch == '-'
            && i > 0
            && chars[i - 1].is_whitespace()
            && chars.get(i + 1).is_some_and(|c| c.is_whitespace());
        if matches!(ch, '/' | '>' | '|') || spaced_dash {
            unified.push('/');
        } else {
            unified.push(ch);
        }
    }

    unified
        .split('/')
        .map(|segment| collapse_whitespace(segment).to_lowercase())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Splits a normalized path into classifier hints: the first segment is the
/// domain, the second the product type and the rest are keywords.
#[must_use]
pub fn category_hints(normalized_path: &str) -> CategoryHints {
    let mut segments = normalized_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    CategoryHints {
        domain: segments.next(),
        product_type: segments.next(),
        keywords: segments.collect(),
    }
}

/// Lower-cases, trims, turns underscores into spaces and collapses runs of
/// whitespace.
#[must_use]
pub fn normalize_attribute_name(name: &str) -> String {
    collapse_whitespace(&name.to_lowercase().replace('_', " "))
}

/// Proposes an attribute code for an unknown external attribute.
///
/// Letters and digits are kept (lower-cased), every other run of characters
/// becomes a single `_`, and the result is capped at
/// [`MAX_SUGGESTED_CODE_LEN`] characters.
#[must_use]
pub fn suggested_code(name: &str) -> String {
    let mut code = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !code.is_empty() {
                code.push('_');
            }
            pending_separator = false;
            code.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    let capped: String = code.chars().take(MAX_SUGGESTED_CODE_LEN).collect();
    let capped = capped.trim_end_matches('_');
    if capped.is_empty() {
        "attribute".to_string()
    } else {
        capped.to_string()
    }
}
