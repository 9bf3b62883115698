//! 13F information table parsers.
//!
//! Filings arrive either as the XML information table introduced in 2013 or as the older
//! fixed-width text table embedded in a full submission. [`parser_for`] sniffs the payload and
//! returns the matching [`FilingParser`].

mod text;
mod xml;

use std::fmt;

use chrono::NaiveDate;
use holdwatch_core::{FilingFormatHint, ValueUnit};
use rust_decimal::Decimal;

pub use text::TextInfoTableParser;
pub use xml::XmlInfoTableParser;

use super::{FilingPosition, ParseWarning};
use crate::coerce::{parse_number, NumericValue};
use crate::error::ParseError;

/// Concrete information table layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilingFormat {
    Xml,
    Text,
}

impl fmt::Display for FilingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilingFormat::Xml => f.write_str("xml"),
            FilingFormat::Text => f.write_str("text"),
        }
    }
}

/// Positions recovered from one filing, plus the entries that had to be skipped.
#[derive(Clone, Debug, Default)]
pub struct FilingParse {
    pub positions: Vec<FilingPosition>,
    pub warnings: Vec<ParseWarning>,
    /// Entries recognised but dropped, each with a warning.
    pub skipped: usize,
    /// Period of report when the document itself states it (text submissions).
    pub report_date: Option<NaiveDate>,
}

impl FilingParse {
    /// Sum of the known position values, or `None` when nothing is known, the sum is zero
    /// or it does not fit a decimal.
    pub fn total_value(&self) -> Option<Decimal> {
        let total = self
            .positions
            .iter()
            .filter_map(|p| p.value_usd)
            .try_fold(Decimal::ZERO, Decimal::checked_add)?;
        if total.is_zero() {
            None
        } else {
            Some(total)
        }
    }
}

/// Extracts positions from one information table layout.
pub trait FilingParser: Send + Sync {
    fn format(&self) -> FilingFormat;

    fn parse(&self, bytes: &[u8]) -> Result<FilingParse, ParseError>;
}

/// Detects the information table layout from the payload.
pub fn sniff_format(bytes: &[u8]) -> FilingFormat {
    let lowered = String::from_utf8_lossy(bytes).to_ascii_lowercase();
    if lowered.contains("informationtable") {
        FilingFormat::Xml
    } else {
        FilingFormat::Text
    }
}

/// Selects the parser for a document, honouring an explicit format hint.
pub fn parser_for(hint: FilingFormatHint, bytes: &[u8], unit: ValueUnit) -> Box<dyn FilingParser> {
    let format = match hint {
        FilingFormatHint::Xml => FilingFormat::Xml,
        FilingFormatHint::Text => FilingFormat::Text,
        FilingFormatHint::Auto => sniff_format(bytes),
    };
    match format {
        FilingFormat::Xml => Box::new(XmlInfoTableParser::new(unit)),
        FilingFormat::Text => Box::new(TextInfoTableParser::new(unit)),
    }
}

/// Coerces a reported amount, recording a warning when the text is not numeric or the scaled
/// value overflows.
fn amount(
    raw: Option<&str>,
    scale: Decimal,
    label: &str,
    entry: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Option<Decimal> {
    let raw = raw?;
    match parse_number(raw) {
        NumericValue::Number { value, .. } => {
            let scaled = value.checked_mul(scale);
            if scaled.is_none() {
                warnings.push(ParseWarning::new(
                    format!("entry {entry}"),
                    format!("{label} '{raw}' is out of range"),
                ));
            }
            scaled
        }
        NumericValue::Empty => None,
        NumericValue::Invalid => {
            warnings.push(ParseWarning::new(
                format!("entry {entry}"),
                format!("{label} '{raw}' is not numeric"),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_test_utils::fixtures::{tci_info_table, LEGACY_TEXT_FILING};

    #[test]
    fn sniffs_formats() {
        assert_eq!(sniff_format(tci_info_table().as_bytes()), FilingFormat::Xml);
        assert_eq!(
            sniff_format(LEGACY_TEXT_FILING.as_bytes()),
            FilingFormat::Text
        );
        let forced = parser_for(
            FilingFormatHint::Text,
            tci_info_table().as_bytes(),
            ValueUnit::Thousands,
        );
        assert_eq!(forced.format(), FilingFormat::Text);
    }

    #[test]
    fn oversized_amount_becomes_null_with_warning() {
        let mut warnings = Vec::new();
        let value = amount(
            Some("79228162514264337593543950335"),
            ValueUnit::Thousands.multiplier(),
            "value",
            2,
            &mut warnings,
        );
        assert_eq!(value, None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].locator.as_deref(), Some("entry 2"));
    }

    #[test]
    fn total_value_gives_up_on_overflow() {
        let position = |value| FilingPosition {
            cusip: "037833100".to_string(),
            value_usd: Some(value),
            ..FilingPosition::default()
        };
        let parse = FilingParse {
            positions: vec![position(Decimal::MAX), position(Decimal::MAX)],
            ..FilingParse::default()
        };
        assert_eq!(parse.total_value(), None);
    }
}
