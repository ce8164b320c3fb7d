//! Scalar helpers shared by the CSV and XML readers.

use rust_decimal::Decimal;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Parses a price-like number accepting either `,` or `.` as the decimal
/// separator.
///
/// When both separators appear, the one that occurs last is the decimal
/// separator and the other is treated as a thousands separator
/// (`1.234,50` and `1,234.50` both parse to `1234.50`). A separator that
/// repeats is always a thousands separator (`1.000.000`).
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    if compact.is_empty() {
        return None;
    }

    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) if compact.matches('.').count() == 1 => Some('.'),
        (None, Some(_)) if compact.matches(',').count() == 1 => Some(','),
        _ => None,
    };

    let mut normalized = String::with_capacity(compact.len());
    for ch in compact.chars() {
        match ch {
            '.' | ',' if Some(ch) == decimal_sep => normalized.push('.'),
            '.' | ',' => {}
            other => normalized.push(other),
        }
    }
    normalized.parse::<Decimal>().ok()
}

/// `true` for the usual affirmative spellings, including Serbian `da`.
pub(crate) fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "da" | "on"
    )
}

/// `true` only when the value explicitly says "no".
pub(crate) fn is_explicit_false(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "n" | "ne" | "off"
    )
}

/// Removes literal CDATA wrappers that survive in double-encoded feeds.
pub(crate) fn strip_cdata(raw: &str) -> String {
    let mut value = raw.trim();
    while let Some(inner) = value
        .strip_prefix(CDATA_OPEN)
        .and_then(|v| v.strip_suffix(CDATA_CLOSE))
    {
        value = inner.trim();
    }
    value.to_string()
}

/// Splits a comma separated URL list, dropping blanks.
pub(crate) fn split_urls(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn decimal_with_dot() {
        assert_eq!(parse_decimal("99.99"), Some(dec("99.99")));
    }

    #[test]
    fn decimal_with_comma() {
        assert_eq!(parse_decimal("1299,50"), Some(dec("1299.50")));
    }

    #[test]
    fn decimal_with_both_separators() {
        assert_eq!(parse_decimal("1.234,50"), Some(dec("1234.50")));
        assert_eq!(parse_decimal("1,234.50"), Some(dec("1234.50")));
    }

    #[test]
    fn decimal_with_repeated_thousands_separator() {
        assert_eq!(parse_decimal("1.000.000"), Some(dec("1000000")));
        assert_eq!(parse_decimal("2 499,00"), Some(dec("2499.00")));
    }

    #[test]
    fn decimal_rejects_garbage() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("12a"), None);
    }

    #[test]
    fn negative_decimal_still_parses() {
        assert_eq!(parse_decimal("-5"), Some(dec("-5")));
    }

    #[test]
    fn truthy_and_false_flags() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("da"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));

        assert!(is_explicit_false("0"));
        assert!(is_explicit_false("No"));
        assert!(!is_explicit_false(""));
        assert!(!is_explicit_false("maybe"));
    }

    #[test]
    fn cdata_wrappers_are_removed() {
        assert_eq!(strip_cdata("<![CDATA[Lampa]]>"), "Lampa");
        assert_eq!(strip_cdata("  <![CDATA[ <![CDATA[x]]> ]]> "), "x");
        assert_eq!(strip_cdata("plain"), "plain");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(strip_bom(b"\xEF\xBB\xBFname"), b"name");
        assert_eq!(strip_bom(b"name"), b"name");
    }

    #[test]
    fn url_list_is_split_and_trimmed() {
        let urls: Vec<String> = split_urls("a.jpg, b.jpg,, ").collect();
        assert_eq!(urls, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    }
}
