use std::collections::BTreeMap;

use csv::{ByteRecord, Reader, ReaderBuilder, Trim};
use holdwatch_core::CanonicalField;
use tracing::debug;

use super::{DocumentFacts, HeaderResolver, TableRow};
use crate::coerce::find_date_in_text;
use crate::error::{ParseError, RowError};

/// Lines inspected while looking for the header row.
const MAX_HEADER_SCAN: usize = 200;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parses vendor holdings CSVs, tolerating preambles, footers and `;`/tab delimiters.
#[derive(Clone, Debug, Default)]
pub struct CsvHoldingsParser {
    resolver: HeaderResolver,
}

#[derive(Clone, Debug)]
enum Column {
    Mapped(CanonicalField),
    Extra(String),
}

impl CsvHoldingsParser {
    pub fn new(column_map: &BTreeMap<CanonicalField, Vec<String>>) -> Self {
        Self {
            resolver: HeaderResolver::new(column_map),
        }
    }

    /// Locates the header row and returns a lazy, one-pass iterator over the data rows.
    pub fn parse<'a>(&self, bytes: &'a [u8]) -> Result<CsvRows<'a>, ParseError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut offset = 0usize;
        let mut preamble = Vec::new();
        for (idx, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
            if idx >= MAX_HEADER_SCAN {
                break;
            }
            let line = String::from_utf8_lossy(raw_line);
            let line = line.trim_end_matches('\r');
            let delimiter = sniff_delimiter(line);
            let cells = split_line(line, delimiter);
            if self.resolver.is_header(&cells) {
                let columns = self.columns(&cells);
                debug!(
                    header_line = idx + 1,
                    delimiter = %(delimiter as char).escape_default(),
                    columns = columns.len(),
                    "located csv header row"
                );
                let reader = ReaderBuilder::new()
                    .delimiter(delimiter)
                    .has_headers(true)
                    .flexible(true)
                    .trim(Trim::All)
                    .from_reader(&bytes[offset..]);
                return Ok(CsvRows {
                    reader,
                    columns,
                    facts: scan_preamble(&preamble),
                    line_offset: idx,
                    record: ByteRecord::new(),
                });
            }
            preamble.push(line.to_string());
            offset += raw_line.len() + 1;
            if offset > bytes.len() {
                break;
            }
        }
        Err(ParseError::MissingHeader {
            scanned: preamble.len().min(MAX_HEADER_SCAN),
        })
    }

    fn columns(&self, headers: &[String]) -> Vec<Column> {
        self.resolver
            .resolve_row(headers)
            .into_iter()
            .zip(headers)
            .enumerate()
            .map(|(idx, (field, header))| match field {
                Some(field) => Column::Mapped(field),
                None => {
                    let name = header.trim().trim_matches('"').trim();
                    if name.is_empty() {
                        Column::Extra(format!("column_{}", idx + 1))
                    } else {
                        Column::Extra(name.to_string())
                    }
                }
            })
            .collect()
    }
}

/// Lazy sequence of data rows following the header.
pub struct CsvRows<'a> {
    reader: Reader<&'a [u8]>,
    columns: Vec<Column>,
    facts: DocumentFacts,
    line_offset: usize,
    record: ByteRecord,
}

impl CsvRows<'_> {
    /// Fund ticker and as-of date found in lines preceding the header.
    pub fn facts(&self) -> &DocumentFacts {
        &self.facts
    }

    fn build_row(&self, line: usize) -> Result<TableRow, RowError> {
        let mut row = TableRow {
            line,
            ..TableRow::default()
        };
        for (idx, cell) in self.record.iter().enumerate() {
            let value = String::from_utf8_lossy(cell);
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match self.columns.get(idx) {
                Some(Column::Mapped(field)) => {
                    row.values.insert(*field, value.to_string());
                }
                Some(Column::Extra(name)) => {
                    row.extras.insert(name.clone(), value.to_string());
                }
                None => {
                    row.extras
                        .insert(format!("column_{}", idx + 1), value.to_string());
                }
            }
        }
        if row.has_measure() {
            Ok(row)
        } else {
            Err(RowError::Empty { line })
        }
    }
}

impl Iterator for CsvRows<'_> {
    type Item = Result<TableRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let read = self.reader.read_byte_record(&mut self.record);
            let line = self.line_offset
                + self
                    .record
                    .position()
                    .map(|pos| pos.line() as usize)
                    .unwrap_or_default();
            match read {
                Ok(false) => return None,
                Ok(true) => {
                    if self.record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace)) {
                        continue;
                    }
                    return Some(self.build_row(line));
                }
                Err(err) => {
                    let line = err
                        .position()
                        .map(|pos| self.line_offset + pos.line() as usize)
                        .unwrap_or(line);
                    return Some(Err(RowError::Malformed {
                        line,
                        message: err.to_string(),
                    }));
                }
            }
        }
    }
}

/// Picks the delimiter occurring most often outside quotes; ties favour `,`.
fn sniff_delimiter(line: &str) -> u8 {
    let mut counts = [(b',', 0usize), (b';', 0), (b'\t', 0)];
    let mut quoted = false;
    for byte in line.bytes() {
        if byte == b'"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        for (candidate, count) in counts.iter_mut() {
            if byte == *candidate {
                *count += 1;
            }
        }
    }
    counts
        .iter()
        .fold((b',', 0), |best, &(candidate, count)| {
            if count > best.1 {
                (candidate, count)
            } else {
                best
            }
        })
        .0
}

fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Extracts the fund ticker (`Ticker Symbol:,IVES`) and as-of date from preamble lines.
fn scan_preamble(lines: &[String]) -> DocumentFacts {
    let mut facts = DocumentFacts::default();
    for line in lines {
        let cells = split_line(line, sniff_delimiter(line));
        if facts.fund_ticker.is_none() {
            if let Some(label) = cells.first() {
                let label: String = label
                    .to_lowercase()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect();
                let is_ticker_label = matches!(
                    label.as_str(),
                    "tickersymbol" | "fundticker" | "ticker" | "fundsymbol"
                );
                if is_ticker_label {
                    facts.fund_ticker = cells
                        .iter()
                        .skip(1)
                        .map(|cell| cell.trim())
                        .find(|cell| {
                            !cell.is_empty()
                                && cell
                                    .chars()
                                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
                        })
                        .map(str::to_ascii_uppercase);
                }
            }
        }
        if facts.as_of_date.is_none() {
            facts.as_of_date = find_date_in_text(line);
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use holdwatch_test_utils::fixtures::{ARK_CSV, PREAMBLE_CSV};

    #[test]
    fn parses_rows_with_default_aliases() {
        let parser = CsvHoldingsParser::default();
        let rows: Vec<_> = parser.parse(ARK_CSV.as_bytes()).unwrap().collect();
        assert_eq!(rows.len(), 4);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.line, 2);
        assert_eq!(first.get(CanonicalField::Ticker), Some("TSLA"));
        assert_eq!(first.get(CanonicalField::Name), Some("TESLA INC"));
        assert_eq!(first.get(CanonicalField::MarketValueUsd), Some("$850,000,000.00"));
        assert_eq!(first.get(CanonicalField::WeightPct), Some("10.50%"));
        assert_eq!(first.get(CanonicalField::AsOfDate), Some("09/24/2025"));
        assert_eq!(rows[3], Err(RowError::Empty { line: 5 }));
    }

    #[test]
    fn skips_preamble_and_reads_fund_facts() {
        let parser = CsvHoldingsParser::default();
        let rows = parser.parse(PREAMBLE_CSV.as_bytes()).unwrap();
        assert_eq!(rows.facts().fund_ticker.as_deref(), Some("IVES"));
        assert_eq!(
            rows.facts().as_of_date,
            NaiveDate::from_ymd_opt(2025, 9, 24)
        );
        let rows: Vec<_> = rows.collect();
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.line, 5);
        assert_eq!(first.get(CanonicalField::Ticker), Some("aapl"));
        assert_eq!(first.get(CanonicalField::WeightPct), Some("0.0512"));
        let cash = rows[2].as_ref().unwrap();
        assert_eq!(cash.get(CanonicalField::Name), Some("Cash & Other"));
        assert!(cash.get(CanonicalField::Ticker).is_none());
        assert!(matches!(rows[3], Err(RowError::Empty { line: 8 })));
    }

    #[test]
    fn honours_explicit_mapping_semicolons_and_extras() {
        let data = "\u{feff}Code;Bezeichnung;Gewicht;Sector\nsap;SAP SE;\"4,5\";Tech;extra\n";
        let mut map = BTreeMap::new();
        map.insert(CanonicalField::Ticker, vec!["code".to_string()]);
        map.insert(CanonicalField::Name, vec!["Bezeichnung".to_string()]);
        map.insert(CanonicalField::WeightPct, vec!["Gewicht".to_string()]);
        let parser = CsvHoldingsParser::new(&map);
        let rows: Vec<_> = parser.parse(data.as_bytes()).unwrap().collect();
        assert_eq!(rows.len(), 1);
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.get(CanonicalField::Ticker), Some("sap"));
        assert_eq!(row.get(CanonicalField::WeightPct), Some("4,5"));
        assert_eq!(row.extras.get("Sector").map(String::as_str), Some("Tech"));
        assert_eq!(row.extras.get("column_5").map(String::as_str), Some("extra"));
    }

    #[test]
    fn missing_header_is_a_parse_error() {
        let parser = CsvHoldingsParser::default();
        let err = parser.parse(b"foo,bar\n1,2\n").err().unwrap();
        assert!(matches!(err, ParseError::MissingHeader { .. }));
    }
}
