use std::collections::BTreeMap;

use holdwatch_core::ValueUnit;
use rust_decimal::Decimal;
use tracing::debug;

use super::{amount, FilingFormat, FilingParse, FilingParser};
use crate::coerce::{is_valid_cusip, parse_date};
use crate::error::ParseError;
use crate::parser::{FilingPosition, ParseWarning};

const PERIOD_LABEL: &str = "CONFORMED PERIOD OF REPORT:";
const DISCRETION: [&str; 5] = ["SOLE", "DEFINED", "SHARED", "OTHER", "DFND"];

/// Parser for the fixed-width information table of pre-2013 text submissions.
#[derive(Clone, Copy, Debug)]
pub struct TextInfoTableParser {
    unit: ValueUnit,
}

impl TextInfoTableParser {
    pub fn new(unit: ValueUnit) -> Self {
        Self { unit }
    }
}

struct Token<'a> {
    start: usize,
    text: &'a str,
}

enum CusipMatch {
    /// Token range `[first, last]` whose concatenation is a valid CUSIP.
    Valid { first: usize, last: usize, cusip: String },
    Invalid(String),
    Absent,
}

impl FilingParser for TextInfoTableParser {
    fn format(&self) -> FilingFormat {
        FilingFormat::Text
    }

    fn parse(&self, bytes: &[u8]) -> Result<FilingParse, ParseError> {
        let text = String::from_utf8_lossy(bytes);
        let lines: Vec<&str> = text.lines().collect();
        let mut parse = FilingParse {
            report_date: report_date(&lines),
            ..FilingParse::default()
        };

        let has_tables = lines
            .iter()
            .any(|line| line.trim_start().to_ascii_uppercase().starts_with("<TABLE>"));
        let mut in_table = !has_tables;
        let mut title_column: Option<usize> = None;
        let mut entries = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            let upper = trimmed.to_ascii_uppercase();
            if has_tables && upper.starts_with("<TABLE>") {
                in_table = true;
                continue;
            }
            if has_tables && upper.starts_with("</TABLE>") {
                in_table = false;
                continue;
            }
            if !in_table || trimmed.is_empty() || trimmed.starts_with('<') {
                continue;
            }
            let upper_line = line.to_ascii_uppercase();
            if upper_line.contains("NAME OF ISSUER") {
                title_column = upper_line.find("TITLE");
                continue;
            }

            let tokens = tokenize(line);
            match find_cusip(&tokens) {
                CusipMatch::Absent => {}
                CusipMatch::Invalid(candidate) => {
                    entries += 1;
                    parse.skipped += 1;
                    parse.warnings.push(ParseWarning::new(
                        format!("line {}", idx + 1),
                        format!("'{candidate}' fails the CUSIP check digit; row skipped"),
                    ));
                }
                CusipMatch::Valid { first, last, cusip } => {
                    entries += 1;
                    let position = self.position(
                        entries,
                        line,
                        &tokens,
                        (first, last, cusip),
                        title_column,
                        &mut parse.warnings,
                    );
                    parse.positions.push(position);
                }
            }
        }

        if parse.positions.is_empty() {
            return Err(ParseError::NoInformationTable);
        }
        debug!(
            positions = parse.positions.len(),
            skipped = parse.skipped,
            "parsed text information table"
        );
        Ok(parse)
    }
}

impl TextInfoTableParser {
    fn position(
        &self,
        entry: usize,
        line: &str,
        tokens: &[Token<'_>],
        (first, last, cusip): (usize, usize, String),
        title_column: Option<usize>,
        warnings: &mut Vec<ParseWarning>,
    ) -> FilingPosition {
        let prefix = &line[..tokens[first].start];
        let (name_of_issuer, title_of_class) = split_name_and_title(prefix, title_column);

        let rest: Vec<&str> = tokens[last + 1..].iter().map(|t| t.text).collect();
        let value_usd = amount(
            rest.first().copied(),
            self.unit.multiplier(),
            "value",
            entry,
            warnings,
        );
        let shares = amount(rest.get(1).copied(), Decimal::ONE, "shares", entry, warnings);

        let mut extras = BTreeMap::new();
        for token in rest.iter().skip(2) {
            let upper = token.to_ascii_uppercase();
            match upper.as_str() {
                "SH" | "PRN" => {
                    extras.entry("sh_prn_type".to_string()).or_insert(upper);
                }
                "PUT" | "CALL" => {
                    extras.entry("put_call".to_string()).or_insert(upper);
                }
                other if DISCRETION.contains(&other) => {
                    extras
                        .entry("investment_discretion".to_string())
                        .or_insert(upper);
                }
                _ => {}
            }
        }

        FilingPosition {
            entry,
            name_of_issuer,
            title_of_class,
            cusip,
            value_usd,
            shares,
            extras,
        }
    }
}

fn report_date(lines: &[&str]) -> Option<chrono::NaiveDate> {
    lines.iter().find_map(|line| {
        let upper = line.to_ascii_uppercase();
        let at = upper.find(PERIOD_LABEL)?;
        parse_date(line[at + PERIOD_LABEL.len()..].trim())
    })
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in line.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                tokens.push(Token {
                    start: begin,
                    text: &line[begin..idx],
                });
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        tokens.push(Token {
            start: begin,
            text: &line[begin..],
        });
    }
    tokens
}

/// Finds the CUSIP, written either as one nine-character token or split `6 2 1`.
fn find_cusip(tokens: &[Token<'_>]) -> CusipMatch {
    let mut invalid = None;
    for (idx, token) in tokens.iter().enumerate() {
        let candidate = token.text.to_ascii_uppercase();
        if candidate.len() == 9 && candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
            if is_valid_cusip(&candidate) {
                return CusipMatch::Valid {
                    first: idx,
                    last: idx,
                    cusip: candidate,
                };
            }
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            if digits >= 6 && invalid.is_none() {
                invalid = Some(candidate);
            }
        }
        if let [a, b, c] = tokens.get(idx..idx + 3).unwrap_or_default() {
            if a.text.len() == 6 && b.text.len() == 2 && c.text.len() == 1 {
                let joined = format!("{}{}{}", a.text, b.text, c.text).to_ascii_uppercase();
                if joined.chars().all(|ch| ch.is_ascii_alphanumeric()) && is_valid_cusip(&joined) {
                    return CusipMatch::Valid {
                        first: idx,
                        last: idx + 2,
                        cusip: joined,
                    };
                }
            }
        }
    }
    invalid.map_or(CusipMatch::Absent, CusipMatch::Invalid)
}

fn split_name_and_title(
    prefix: &str,
    title_column: Option<usize>,
) -> (Option<String>, Option<String>) {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    if let Some(column) = title_column {
        if let (Some(name), Some(title)) = (prefix.get(..column), prefix.get(column..)) {
            if !name.trim().is_empty() {
                return (non_empty(name), non_empty(title));
            }
        }
    }
    // Without a usable header offset, the widest gap separates issuer from class.
    let trimmed = prefix.trim_end();
    match trimmed.rfind("  ") {
        Some(at) => (non_empty(&trimmed[..at]), non_empty(&trimmed[at..])),
        None => (non_empty(trimmed), None),
    }
}
