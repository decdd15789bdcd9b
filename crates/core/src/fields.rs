//! Labeled-value extraction from slide text.

use regex::Regex;

/// The syntax expected after a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Digits with optional thousands separators: `12,345`.
    Integer,
    /// Optional `$`, digits, and at least two fraction digits: `$1,234.56`.
    Currency,
    /// Digits and decimal point followed by `%`: `45.3%`.
    Percent,
}

impl FieldKind {
    fn value_pattern(self) -> &'static str {
        match self {
            FieldKind::Integer => r"([\d,]+)",
            FieldKind::Currency => r"\$?([\d,]+\.\d{2,})",
            FieldKind::Percent => r"([\d.]+)%",
        }
    }
}

/// Find `label: value` (or `label | value`) in `text` and cast the value.
///
/// Matching is case-insensitive and the label is taken literally. A missing
/// label or a value that does not cast yields `None`.
pub fn parse_field(text: &str, label: &str, kind: FieldKind) -> Option<f64> {
    let pattern = format!(
        r"(?i){}\s*[:|]\s*{}",
        regex::escape(label),
        kind.value_pattern()
    );
    let re = Regex::new(&pattern).ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '$')).collect();

    match kind {
        FieldKind::Integer => cleaned.parse::<u64>().ok().map(|v| v as f64),
        FieldKind::Currency | FieldKind::Percent => {
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
    }
}
