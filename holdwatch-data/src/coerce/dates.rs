use chrono::{Datelike, NaiveDate};

const DATE_FORMATS: [&str; 14] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parses a vendor date, accepting ISO, US and spelled-out month forms.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(date) = try_formats(trimmed) {
        return Some(date);
    }
    // Timestamps such as `2025-09-24T00:00:00Z` or `2025-09-24 16:00:00`.
    let head = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    if head.len() < trimmed.len() {
        return try_formats(head);
    }
    None
}

fn try_formats(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .filter(|date| (1900..=2100).contains(&date.year()))
    })
}

/// Finds the first date mentioned in free text, preferring one following "as of".
pub fn find_date_in_text(text: &str) -> Option<NaiveDate> {
    let lower = text.to_ascii_lowercase();
    if let Some(idx) = lower.find("as of") {
        if let Some(date) = scan_tokens(&text[idx + "as of".len()..]) {
            return Some(date);
        }
    }
    scan_tokens(text)
}

fn scan_tokens(text: &str) -> Option<NaiveDate> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for start in 0..tokens.len() {
        for width in (1..=3).rev() {
            if start + width > tokens.len() {
                continue;
            }
            let candidate = tokens[start..start + width].join(" ");
            let candidate =
                candidate.trim_matches(|c: char| matches!(c, ',' | '.' | ':' | ';' | '(' | ')'));
            if let Some(date) = parse_date(candidate) {
                return Some(date);
            }
        }
    }
    None
}
