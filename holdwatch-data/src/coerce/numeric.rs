use std::str::FromStr;

use rust_decimal::Decimal;

/// Outcome of coercing a vendor cell into a number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericValue {
    /// Blank or a recognised placeholder such as `-` or `N/A`.
    Empty,
    /// Parsed value; `percent` records an explicit `%` sign.
    Number { value: Decimal, percent: bool },
    /// Non-numeric text remained after stripping formatting.
    Invalid,
}

impl NumericValue {
    pub fn value(self) -> Option<Decimal> {
        match self {
            NumericValue::Number { value, .. } => Some(value),
            NumericValue::Empty | NumericValue::Invalid => None,
        }
    }
}

const PLACEHOLDERS: [&str; 9] = ["-", "--", "—", "n/a", "na", "n.a.", "null", "none", "nan"];

/// Parses amounts such as `$1,234,000`, `(1.5)`, `5.12%`, `1.234,56` or `USD 12 500`.
pub fn parse_number(raw: &str) -> NumericValue {
    let cleaned = raw.replace(['\u{a0}', '\u{202f}'], " ");
    let trimmed = cleaned.trim().trim_matches('"').trim();
    if trimmed.is_empty()
        || PLACEHOLDERS
            .iter()
            .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
    {
        return NumericValue::Empty;
    }

    let mut negative = false;
    let mut text = trimmed.to_string();
    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }

    let percent = text.contains('%');
    let lower = text.to_ascii_lowercase();
    let mut body: String = lower
        .replace("us$", "")
        .replace("usd", "")
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '%' | '\'' | ' ' | '\t'))
        .collect();

    if let Some(rest) = body.strip_prefix('-') {
        negative = !negative;
        body = rest.to_string();
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest.to_string();
    } else if let Some(rest) = body.strip_suffix('-') {
        negative = !negative;
        body = rest.to_string();
    }

    let Some(normalized) = normalize_separators(&body) else {
        return NumericValue::Invalid;
    };
    let parsed = Decimal::from_str(&normalized).or_else(|_| Decimal::from_scientific(&normalized));
    match parsed {
        Ok(value) => NumericValue::Number {
            value: if negative { -value } else { value },
            percent,
        },
        Err(_) => NumericValue::Invalid,
    }
}

/// Rewrites thousands and decimal separators into plain `1234.56` form.
fn normalize_separators(body: &str) -> Option<String> {
    if body.is_empty() || !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            if dot > comma {
                body.replace(',', "")
            } else {
                body.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(comma)) => {
            let commas = body.matches(',').count();
            let before = &body[..comma];
            let after = &body[comma + 1..];
            let grouped = commas > 1
                || (after.len() == 3
                    && (1..=3).contains(&before.len())
                    && !before.starts_with('0'));
            if grouped {
                body.replace(',', "")
            } else {
                body.replacen(',', ".", 1)
            }
        }
        (Some(_), None) => {
            if body.matches('.').count() > 1 {
                body.replace('.', "")
            } else {
                body.to_string()
            }
        }
        (None, None) => body.to_string(),
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn number(raw: &str) -> Decimal {
        parse_number(raw).value().unwrap_or_else(|| panic!("{raw} did not parse"))
    }

    #[test]
    fn strips_currency_and_grouping() {
        assert_eq!(number("$1,234,000"), dec!(1234000));
        assert_eq!(number(" USD 12 500.25 "), dec!(12500.25));
        assert_eq!(number("1\u{a0}234"), dec!(1234));
        assert_eq!(number("US$850,000,000.00"), dec!(850000000.00));
    }

    #[test]
    fn handles_decimal_comma_and_negatives() {
        assert_eq!(number("1.234,56"), dec!(1234.56));
        assert_eq!(number("0,512"), dec!(0.512));
        assert_eq!(number("12,5"), dec!(12.5));
        assert_eq!(number("(1,500)"), dec!(-1500));
        assert_eq!(number("-$42.10"), dec!(-42.10));
        assert_eq!(number("1.5e3"), dec!(1500));
    }

    #[test]
    fn records_explicit_percent() {
        assert_eq!(
            parse_number("10.50%"),
            NumericValue::Number {
                value: dec!(10.50),
                percent: true
            }
        );
        assert_eq!(
            parse_number("0.0512"),
            NumericValue::Number {
                value: dec!(0.0512),
                percent: false
            }
        );
    }

    #[test]
    fn placeholders_are_empty_and_text_is_invalid() {
        for raw in ["", "  ", "-", "N/A", "n/a", "--", "NaN"] {
            assert_eq!(parse_number(raw), NumericValue::Empty, "{raw:?}");
        }
        assert_eq!(parse_number("abc"), NumericValue::Invalid);
        assert_eq!(parse_number("12 shares"), NumericValue::Invalid);
    }
}
