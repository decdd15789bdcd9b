//! Number formatting for report values.
//!
//! Formatting options are passed explicitly on every call; there is no
//! process-wide locale.

use crate::record::MetricValue;

/// Key fragments that mark a metric as a currency amount.
const CURRENCY_KEYS: &[&str] = &["cpc", "cpm", "cost_conv", "cost", "cpl", "cpa", "cpv"];

/// Separators and symbols used when rendering numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    /// Thousands separator.
    pub grouping: char,
    /// Decimal separator.
    pub decimal: char,
    /// Currency prefix.
    pub currency: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            grouping: ',',
            decimal: '.',
            currency: "$".to_string(),
        }
    }
}

impl NumberFormat {
    /// US-style formatting: `1,234.56` and `$`.
    pub fn us() -> Self {
        Self::default()
    }

    pub fn with_grouping(mut self, grouping: char) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_decimal(mut self, decimal: char) -> Self {
        self.decimal = decimal;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Format with thousands grouping; whole numbers get no decimals,
    /// everything else gets exactly two.
    pub fn format_number(&self, value: f64) -> String {
        let decimals = if value.fract() == 0.0 { 0 } else { 2 };
        let fixed = format!("{:.*}", decimals, value.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (fixed.as_str(), None),
        };

        let mut out = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
        if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
            out.push('-');
        }
        out.push_str(&self.group_digits(int_part));
        if let Some(frac) = frac_part {
            out.push(self.decimal);
            out.push_str(frac);
        }
        out
    }

    /// Format as a percentage with exactly two decimals.
    pub fn format_percent(&self, value: f64) -> String {
        let fixed = format!("{:.2}", value);
        format!("{}%", fixed.replace('.', &self.decimal.to_string()))
    }

    fn group_digits(&self, digits: &str) -> String {
        let len = digits.len();
        let mut out = String::with_capacity(len + len / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(self.grouping);
            }
            out.push(c);
        }
        out
    }
}

/// Whether a flat key names a currency metric.
pub fn is_currency_key(key: &str) -> bool {
    let key = key.to_lowercase();
    CURRENCY_KEYS.iter().any(|t| key.contains(t))
}

/// Render a metric value for display, or `None` when it is a placeholder.
///
/// View rates become two-decimal percentages, currency keys get the
/// currency prefix, and lists use their first entry.
pub fn format_value(key: &str, value: &MetricValue, format: &NumberFormat) -> Option<String> {
    let number = value.resolve()?;

    if key.to_lowercase().contains("viewrate") {
        return Some(format.format_percent(number));
    }

    let rendered = format.format_number(number);
    if is_currency_key(key) {
        Some(format!("{}{}", format.currency, rendered))
    } else {
        Some(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Figure;

    fn number(v: f64) -> MetricValue {
        MetricValue::Number(Figure::from_f64(v).unwrap())
    }

    #[test]
    fn test_format_number_integers() {
        let f = NumberFormat::us();
        assert_eq!(f.format_number(0.0), "0");
        assert_eq!(f.format_number(999.0), "999");
        assert_eq!(f.format_number(1000.0), "1,000");
        assert_eq!(f.format_number(1234567.0), "1,234,567");
    }

    #[test]
    fn test_format_number_fractions() {
        let f = NumberFormat::us();
        assert_eq!(f.format_number(1234.5), "1,234.50");
        assert_eq!(f.format_number(0.456), "0.46");
        assert_eq!(f.format_number(-1234.5), "-1,234.50");
    }

    #[test]
    fn test_alternate_separators() {
        let f = NumberFormat::us().with_grouping('.').with_decimal(',').with_currency("€");
        assert_eq!(f.format_number(1234567.25), "1.234.567,25");
        assert_eq!(
            format_value("rsa_cpc", &number(2.5), &f).as_deref(),
            Some("€2,50")
        );
    }

    #[test]
    fn test_currency_keys() {
        let f = NumberFormat::us();
        assert_eq!(format_value("rsa_cpc", &number(1.5), &f).as_deref(), Some("$1.50"));
        assert_eq!(
            format_value("pmax_vla_cost_conv", &number(42.0), &f).as_deref(),
            Some("$42")
        );
        assert_eq!(format_value("dg_cpm", &number(7.1), &f).as_deref(), Some("$7.10"));
        assert_eq!(format_value("rsa_clicks", &number(1500.0), &f).as_deref(), Some("1,500"));
    }

    #[test]
    fn test_viewrate_is_percent() {
        let f = NumberFormat::us();
        assert_eq!(format_value("dv_viewrate", &number(45.3), &f).as_deref(), Some("45.30%"));
        assert_eq!(format_value("dv_viewrate", &number(0.4), &f).as_deref(), Some("0.40%"));
        assert_eq!(format_value("dv_viewrate", &number(12.0), &f).as_deref(), Some("12.00%"));
    }

    #[test]
    fn test_list_uses_first_entry() {
        let f = NumberFormat::us();
        let list = MetricValue::NumberList(vec![
            Figure::from_f64(2500.0).unwrap(),
            Figure::from_f64(10.0).unwrap(),
        ]);
        assert_eq!(format_value("bcdf_impr", &list, &f).as_deref(), Some("2,500"));
    }

    #[test]
    fn test_placeholder_renders_nothing() {
        let f = NumberFormat::us();
        assert_eq!(
            format_value("rsa_impr", &MetricValue::Placeholder("[x,xxx]".into()), &f),
            None
        );
    }
}
