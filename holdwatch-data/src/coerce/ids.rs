/// Trimmed text, or `None` when blank.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Uppercased, trimmed ticker. Placeholder cells yield `None`.
pub fn clean_ticker(raw: &str) -> Option<String> {
    let text = clean_text(raw)?;
    if matches!(text.as_str(), "-" | "--") || text.eq_ignore_ascii_case("n/a") {
        return None;
    }
    Some(text.to_uppercase())
}

/// CUSIP, ISIN or SEDOL: uppercased with spaces and dashes removed.
///
/// Spreadsheet-protected cells such as `="037833100"` are unwrapped.
pub fn clean_identifier(raw: &str) -> Option<String> {
    let text = raw.trim();
    let text = text.strip_prefix('=').unwrap_or(text);
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '"' | '\''))
        .flat_map(char::to_uppercase)
        .collect();
    if cleaned.is_empty() || cleaned == "N/A" || cleaned == "NA" {
        None
    } else {
        Some(cleaned)
    }
}

/// Check digit of the first eight characters of a CUSIP.
pub fn cusip_check_digit(base: &str) -> Option<u32> {
    if base.len() != 8 {
        return None;
    }
    let mut sum = 0;
    for (idx, ch) in base.chars().enumerate() {
        let mut value = match ch {
            '0'..='9' => ch.to_digit(10)?,
            'A'..='Z' => ch as u32 - 'A' as u32 + 10,
            '*' => 36,
            '@' => 37,
            '#' => 38,
            _ => return None,
        };
        if idx % 2 == 1 {
            value *= 2;
        }
        sum += value / 10 + value % 10;
    }
    Some((10 - sum % 10) % 10)
}

/// Whether `candidate` is a nine-character CUSIP with a matching check digit.
pub fn is_valid_cusip(candidate: &str) -> bool {
    if candidate.len() != 9 || !candidate.is_ascii() {
        return false;
    }
    let (base, check) = candidate.split_at(8);
    match (cusip_check_digit(base), check.chars().next().and_then(|c| c.to_digit(10))) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_identifiers() {
        assert_eq!(clean_identifier(" us-0378331005 ").as_deref(), Some("US0378331005"));
        assert_eq!(clean_identifier("=\"037833100\"").as_deref(), Some("037833100"));
        assert_eq!(clean_identifier("  "), None);
        assert_eq!(clean_ticker(" aapl ").as_deref(), Some("AAPL"));
        assert_eq!(clean_ticker("brk b").as_deref(), Some("BRK B"));
        assert_eq!(clean_ticker("-"), None);
    }

    #[test]
    fn validates_cusip_check_digits() {
        for cusip in ["037833100", "594918104", "02079K305", "88160R101"] {
            assert!(is_valid_cusip(cusip), "{cusip}");
        }
        assert!(!is_valid_cusip("037833101"));
        assert!(!is_valid_cusip("60000"));
        assert!(!is_valid_cusip("SOLE12345"));
    }
}
