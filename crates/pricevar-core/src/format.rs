//! Display formatting for currency amounts, percentages, and counts.
//!
//! Every fact value, KPI tile, and table cell goes through these helpers, so
//! the downstream text generator always sees the same short forms.
//!
//! # Currency scale
//!
//! - magnitude ≥ 1,000,000: `$X.XM` (one decimal)
//! - magnitude ≥ 1,000: `$XK` (no decimal)
//! - otherwise: `$X` (no decimal)
//!
//! Negative amounts keep the same tiers with a leading `-` (`-$1.2M`).
//! Anything that cannot be read as a finite number renders as `$0`.

/// A value headed for the currency formatter.
///
/// Query results occasionally carry pre-formatted strings or nulls; both are
/// accepted and coerced rather than rejected.
#[derive(Debug, Clone, Copy)]
pub enum Amount<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

impl From<f64> for Amount<'_> {
    fn from(v: f64) -> Self {
        Amount::Number(v)
    }
}

impl From<Option<f64>> for Amount<'_> {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Amount::Missing, Amount::Number)
    }
}

impl<'a> From<&'a str> for Amount<'a> {
    fn from(v: &'a str) -> Self {
        Amount::Text(v)
    }
}

impl<'a> From<Option<&'a str>> for Amount<'a> {
    fn from(v: Option<&'a str>) -> Self {
        v.map_or(Amount::Missing, Amount::Text)
    }
}

impl Amount<'_> {
    /// Resolve to a finite number, if there is one.
    pub fn to_f64(self) -> Option<f64> {
        match self {
            Amount::Number(v) if v.is_finite() => Some(v),
            Amount::Number(_) | Amount::Missing => None,
            Amount::Text(s) => coerce_number(s),
        }
    }
}

/// Parse a loosely formatted number such as `"$1,234.50"` or `" 42 "`.
///
/// Strips `$`, thousands separators, and surrounding whitespace. Returns
/// `None` for anything that is not a finite number afterwards.
pub fn coerce_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format an amount with the three-tier short currency scale.
pub fn format_currency<'a>(value: impl Into<Amount<'a>>) -> String {
    let Some(v) = value.into().to_f64() else {
        return "$0".to_string();
    };

    let magnitude = v.abs();
    let body = if magnitude >= 1_000_000.0 {
        format!("${:.1}M", magnitude / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("${:.0}K", magnitude / 1_000.0)
    } else {
        format!("${magnitude:.0}")
    };

    // A tiny negative rounds to "$0"; no sign on zero.
    if v < 0.0 && body != "$0" {
        format!("-{body}")
    } else {
        body
    }
}

/// Format a percentage with one decimal place. Missing values render `0.0%`.
pub fn format_pct(value: impl Into<Option<f64>>) -> String {
    let v = finite_or_zero(value.into());
    format!("{v:.1}%")
}

/// Format a unit price with cents, e.g. `$12.50`.
pub fn format_unit_price(value: impl Into<Option<f64>>) -> String {
    let v = finite_or_zero(value.into());
    if v < 0.0 {
        format!("-${:.2}", v.abs())
    } else {
        format!("${v:.2}")
    }
}

/// Format a count or quantity rounded to a whole number with thousands separators.
pub fn format_count(value: impl Into<Option<f64>>) -> String {
    let v = finite_or_zero(value.into()).round();
    let digits = format!("{:.0}", v.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if v < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_thousand_is_whole_dollars() {
        assert_eq!(format_currency(0.0), "$0");
        assert_eq!(format_currency(12.4), "$12");
        assert_eq!(format_currency(999.0), "$999");
    }

    #[test]
    fn thousand_boundary() {
        assert_eq!(format_currency(1_000.0), "$1K");
        assert_eq!(format_currency(1_499.0), "$1K");
        assert_eq!(format_currency(156_000.0), "$156K");
        assert_eq!(format_currency(999_999.0), "$1000K");
    }

    #[test]
    fn million_boundary() {
        assert_eq!(format_currency(1_000_000.0), "$1.0M");
        assert_eq!(format_currency(4_990_598.0), "$5.0M");
        assert_eq!(format_currency(6_240_000.0), "$6.2M");
    }

    #[test]
    fn negative_amounts_keep_tiers() {
        assert_eq!(format_currency(-12.0), "-$12");
        assert_eq!(format_currency(-5_000.0), "-$5K");
        assert_eq!(format_currency(-1_200_000.0), "-$1.2M");
        assert_eq!(format_currency(-0.2), "$0");
    }

    #[test]
    fn strings_are_coerced() {
        assert_eq!(format_currency("$1,234.50"), "$1K");
        assert_eq!(format_currency(" 2500000 "), "$2.5M");
        assert_eq!(format_currency("not a number"), "$0");
        assert_eq!(format_currency(""), "$0");
    }

    #[test]
    fn missing_and_non_finite_render_zero() {
        assert_eq!(format_currency(None::<f64>), "$0");
        assert_eq!(format_currency(None::<&str>), "$0");
        assert_eq!(format_currency(f64::NAN), "$0");
        assert_eq!(format_currency(f64::INFINITY), "$0");
    }

    #[test]
    fn coerce_number_cases() {
        assert_eq!(coerce_number("$1,234.50"), Some(1234.5));
        assert_eq!(coerce_number("-42"), Some(-42.0));
        assert_eq!(coerce_number("$"), None);
        assert_eq!(coerce_number("abc"), None);
        assert_eq!(coerce_number("inf"), None);
    }

    #[test]
    fn percentages() {
        assert_eq!(format_pct(12.345), "12.3%");
        assert_eq!(format_pct(30.0), "30.0%");
        assert_eq!(format_pct(-4.26), "-4.3%");
        assert_eq!(format_pct(None::<f64>), "0.0%");
        assert_eq!(format_pct(f64::NAN), "0.0%");
    }

    #[test]
    fn unit_prices() {
        assert_eq!(format_unit_price(12.5), "$12.50");
        assert_eq!(format_unit_price(0.0), "$0.00");
        assert_eq!(format_unit_price(-3.1), "-$3.10");
        assert_eq!(format_unit_price(None::<f64>), "$0.00");
    }

    #[test]
    fn counts_are_grouped() {
        assert_eq!(format_count(0.0), "0");
        assert_eq!(format_count(999.0), "999");
        assert_eq!(format_count(1_000.0), "1,000");
        assert_eq!(format_count(45_680.0), "45,680");
        assert_eq!(format_count(1_234_567.4), "1,234,567");
        assert_eq!(format_count(-2_500.0), "-2,500");
        assert_eq!(format_count(None::<f64>), "0");
    }
}
