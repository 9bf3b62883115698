//! Typed raw rows produced by the vendor table and 13F parsers.

mod columns;
pub mod csv;
pub mod filing;
pub mod html;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use holdwatch_core::CanonicalField;
use rust_decimal::Decimal;

pub use columns::HeaderResolver;

/// One vendor table row: mapped cells keyed by canonical field plus unmapped cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableRow {
    /// 1-based line (CSV) or row (HTML) number within the document.
    pub line: usize,
    pub values: BTreeMap<CanonicalField, String>,
    pub extras: BTreeMap<String, String>,
}

impl TableRow {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    fn has_measure(&self) -> bool {
        self.values.keys().any(|field| field.is_measure())
    }
}

/// One position reported in a 13F information table, value already in whole USD.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilingPosition {
    /// 1-based index of the entry within the information table.
    pub entry: usize,
    pub name_of_issuer: Option<String>,
    pub title_of_class: Option<String>,
    pub cusip: String,
    pub value_usd: Option<Decimal>,
    pub shares: Option<Decimal>,
    pub extras: BTreeMap<String, String>,
}

/// Source-shaped row handed to the normalizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawRow {
    Table(TableRow),
    Filing(FilingPosition),
}

impl RawRow {
    /// Human-readable position of the row within its document.
    pub fn locator(&self) -> String {
        match self {
            RawRow::Table(row) => format!("line {}", row.line),
            RawRow::Filing(position) => format!("entry {}", position.entry),
        }
    }
}

/// Document-level facts found outside the table body (preamble lines, page text).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentFacts {
    pub fund_ticker: Option<String>,
    pub as_of_date: Option<NaiveDate>,
}

/// Recoverable problem found while parsing a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseWarning {
    pub locator: Option<String>,
    pub message: String,
}

impl ParseWarning {
    pub fn new(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            locator: Some(locator.into()),
            message: message.into(),
        }
    }
}
