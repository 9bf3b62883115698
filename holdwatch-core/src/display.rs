//! Presentation helpers. They never mutate stored values and accept absent fields.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// Placeholder rendered for absent values.
pub const MISSING: &str = "-";

/// Formats a dollar amount as `$1,234,000.00`.
pub fn format_usd(value: Option<Decimal>) -> String {
    let Some(value) = value else {
        return MISSING.to_string();
    };
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    format!("{sign}${}.{frac}", group_thousands(whole))
}

/// Inverse of [`format_usd`] for display round trips.
pub fn parse_usd(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed == MISSING || trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ','))
        .collect();
    Decimal::from_str(&cleaned).ok()
}

/// Formats a percentage-scale weight as `5.12%`, keeping up to `dp` decimals.
pub fn format_percent(value: Option<Decimal>, dp: u32) -> String {
    match value {
        Some(value) => format!(
            "{}%",
            value
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
                .normalize()
        ),
        None => MISSING.to_string(),
    }
}

/// Formats a share count with thousands separators, keeping fractional units.
pub fn format_shares(value: Option<Decimal>) -> String {
    let Some(value) = value else {
        return MISSING.to_string();
    };
    let text = value.normalize().to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    match digits.split_once('.') {
        Some((whole, frac)) => format!("{sign}{}.{frac}", group_thousands(whole)),
        None => format!("{sign}{}", group_thousands(digits)),
    }
}

pub fn format_date(value: Option<NaiveDate>) -> String {
    value
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn usd_formatting_groups_and_rounds() {
        assert_eq!(format_usd(Some(dec!(1234000))), "$1,234,000.00");
        assert_eq!(format_usd(Some(dec!(999.995))), "$1,000.00");
        assert_eq!(format_usd(Some(dec!(-42.1))), "-$42.10");
        assert_eq!(format_usd(None), MISSING);
    }

    #[test]
    fn usd_display_round_trip_is_within_a_cent() {
        for value in [dec!(0), dec!(12.345), dec!(1234000), dec!(-98765.4321)] {
            let recovered = parse_usd(&format_usd(Some(value))).unwrap();
            assert!((recovered - value).abs() <= dec!(0.005), "{value} -> {recovered}");
        }
        assert_eq!(parse_usd(MISSING), None);
    }

    #[test]
    fn percent_shares_and_dates() {
        assert_eq!(format_percent(Some(dec!(5.120000)), 2), "5.12%");
        assert_eq!(format_percent(None, 2), MISSING);
        assert_eq!(format_shares(Some(dec!(1234567.50))), "1,234,567.5");
        assert_eq!(format_shares(Some(dec!(-1000))), "-1,000");
        assert_eq!(
            format_date(NaiveDate::from_ymd_opt(2025, 6, 30)),
            "2025-06-30"
        );
    }
}
