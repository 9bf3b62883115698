//! Conversion of typed raw rows into canonical [`HoldingRecord`]s.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use holdwatch_core::{CanonicalField, HoldingRecord, SourceConfig, WeightScale};
use rust_decimal::Decimal;

use crate::coerce::{clean_identifier, clean_text, clean_ticker, parse_date, parse_number, NumericValue};
use crate::error::NormalizationError;
use crate::parser::{DocumentFacts, FilingPosition, RawRow, TableRow};

const WEIGHT_DP: u32 = 6;

/// Everything known about a source and its document that rows are resolved against.
#[derive(Clone, Debug, Default)]
pub struct SourceContext {
    pub source_id: String,
    /// Fund ticker set in configuration.
    pub fund_ticker: Option<String>,
    /// As-of date set in configuration.
    pub as_of_date: Option<NaiveDate>,
    pub document: DocumentFacts,
    /// Period of report of the filing the rows came from.
    pub report_date: Option<NaiveDate>,
    pub weight_scale: WeightScale,
    /// Sum of position values in the filing, used to derive weights.
    pub filing_total_value: Option<Decimal>,
    /// Upper-cased label to fund ticker.
    fund_aliases: BTreeMap<String, String>,
    /// Document-level attributes copied into every record's extras.
    pub extras: BTreeMap<String, String>,
}

impl SourceContext {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    /// Context seeded with the fund, date and weight settings of a configured source.
    pub fn for_source(source: &SourceConfig) -> Self {
        let weight_scale = match source {
            SourceConfig::CsvUrl(csv) => csv.weight_scale,
            SourceConfig::HtmlTable(html) => html.weight_scale,
            SourceConfig::EdgarCik(_) => WeightScale::Auto,
        };
        Self {
            source_id: source.id().to_string(),
            fund_ticker: source.fund_ticker().map(str::to_string),
            as_of_date: source.as_of(),
            weight_scale,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_document(mut self, document: DocumentFacts) -> Self {
        self.document = document;
        self
    }

    #[must_use]
    pub fn with_report_date(mut self, report_date: Option<NaiveDate>) -> Self {
        self.report_date = report_date;
        self
    }

    #[must_use]
    pub fn with_filing_total(mut self, total: Option<Decimal>) -> Self {
        self.filing_total_value = total;
        self
    }

    #[must_use]
    pub fn with_fund_aliases(mut self, aliases: &BTreeMap<String, String>) -> Self {
        self.fund_aliases = aliases
            .iter()
            .map(|(label, ticker)| (label.trim().to_uppercase(), ticker.trim().to_uppercase()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    fn fund_label(&self, label: &str) -> Option<String> {
        let cleaned = clean_text(label)?.to_uppercase();
        Some(self.fund_aliases.get(&cleaned).cloned().unwrap_or(cleaned))
    }
}

/// A canonical record plus the recoverable problems met while building it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedRow {
    pub record: HoldingRecord,
    pub warnings: Vec<String>,
}

/// Stateless row normalizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn normalize(
        &self,
        row: &RawRow,
        context: &SourceContext,
    ) -> Result<NormalizedRow, NormalizationError> {
        let mut warnings = Vec::new();
        let row_fund = match row {
            RawRow::Table(table) => table.get(CanonicalField::FundTicker),
            RawRow::Filing(_) => None,
        };
        let fund_ticker = resolve_fund(context, row_fund)?;
        let row_date = match row {
            RawRow::Table(table) => table.get(CanonicalField::AsOfDate),
            RawRow::Filing(_) => None,
        };
        let as_of_date = resolve_as_of(context, row_date, &mut warnings)?;

        let mut record = HoldingRecord::new(fund_ticker, as_of_date);
        match row {
            RawRow::Table(table) => fill_from_table(&mut record, table, context, &mut warnings),
            RawRow::Filing(position) => fill_from_filing(&mut record, position, context),
        }
        for (key, value) in &context.extras {
            record
                .extras
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if record.security_id().is_none() {
            return Err(NormalizationError::MissingIdentifier);
        }
        Ok(NormalizedRow { record, warnings })
    }
}

fn resolve_fund(context: &SourceContext, row_fund: Option<&str>) -> Result<String, NormalizationError> {
    [
        context.fund_ticker.as_deref(),
        row_fund,
        context.document.fund_ticker.as_deref(),
        Some(context.source_id.as_str()),
    ]
    .into_iter()
    .flatten()
    .find_map(|label| context.fund_label(label))
    .ok_or(NormalizationError::MissingFundTicker)
}

fn resolve_as_of(
    context: &SourceContext,
    row_date: Option<&str>,
    warnings: &mut Vec<String>,
) -> Result<NaiveDate, NormalizationError> {
    if let Some(date) = context.as_of_date {
        return Ok(date);
    }
    if let Some(raw) = row_date {
        match parse_date(raw) {
            Some(date) => return Ok(date),
            None => warnings.push(format!("as_of_date '{raw}' is not a recognised date")),
        }
    }
    context
        .document
        .as_of_date
        .or(context.report_date)
        .ok_or(NormalizationError::MissingAsOfDate)
}

fn fill_from_table(
    record: &mut HoldingRecord,
    row: &TableRow,
    context: &SourceContext,
    warnings: &mut Vec<String>,
) {
    record.ticker = row.get(CanonicalField::Ticker).and_then(clean_ticker);
    record.name = row.get(CanonicalField::Name).and_then(clean_text);
    record.cusip = row.get(CanonicalField::Cusip).and_then(clean_identifier);
    record.isin = row.get(CanonicalField::Isin).and_then(clean_identifier);
    record.sedol = row.get(CanonicalField::Sedol).and_then(clean_identifier);
    record.shares = numeric(row, CanonicalField::Shares, warnings).map(|(value, _)| value);
    record.market_value_usd =
        numeric(row, CanonicalField::MarketValueUsd, warnings).map(|(value, _)| value);
    record.weight_pct = numeric(row, CanonicalField::WeightPct, warnings).and_then(
        |(value, percent)| {
            let weight = rescale_weight(value, percent, context.weight_scale);
            if weight.is_none() {
                warnings.push(format!("{} '{value}' is out of range", CanonicalField::WeightPct));
            }
            weight
        },
    );
    record.extras = row.extras.clone();
}

fn fill_from_filing(record: &mut HoldingRecord, position: &FilingPosition, context: &SourceContext) {
    record.name = position.name_of_issuer.as_deref().and_then(clean_text);
    record.cusip = clean_identifier(&position.cusip);
    record.shares = position.shares.map(|value| value.normalize());
    record.market_value_usd = position.value_usd.map(|value| value.normalize());
    record.weight_pct = match (position.value_usd, context.filing_total_value) {
        (Some(value), Some(total)) => value
            .checked_div(total)
            .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
            .map(|weight| weight.round_dp(WEIGHT_DP).normalize()),
        _ => None,
    };
    record.extras = position.extras.clone();
    if let Some(title) = position.title_of_class.as_deref().and_then(clean_text) {
        record.extras.insert("title_of_class".to_string(), title);
    }
}

fn numeric(
    row: &TableRow,
    field: CanonicalField,
    warnings: &mut Vec<String>,
) -> Option<(Decimal, bool)> {
    let raw = row.get(field)?;
    match parse_number(raw) {
        NumericValue::Number { value, percent } => Some((value.normalize(), percent)),
        NumericValue::Empty => None,
        NumericValue::Invalid => {
            warnings.push(format!("{field} '{raw}' is not numeric"));
            None
        }
    }
}

/// Expresses a vendor weight as a percentage rounded to six decimal places, or `None` when
/// the rescaled value does not fit a decimal.
///
/// Under [`WeightScale::Auto`], values in [0, 1] are fractions unless written with `%`.
pub fn rescale_weight(value: Decimal, percent: bool, scale: WeightScale) -> Option<Decimal> {
    let fraction = match scale {
        WeightScale::Fraction => true,
        WeightScale::Percent => false,
        WeightScale::Auto => !percent && (Decimal::ZERO..=Decimal::ONE).contains(&value),
    };
    let as_percent = if fraction {
        value.checked_mul(Decimal::ONE_HUNDRED)?
    } else {
        value
    };
    Some(as_percent.round_dp(WEIGHT_DP).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_test_utils::date;
    use rust_decimal_macros::dec;

    fn table(cells: &[(CanonicalField, &str)]) -> RawRow {
        let mut row = TableRow {
            line: 5,
            ..TableRow::default()
        };
        for (field, value) in cells {
            row.values.insert(*field, value.to_string());
        }
        RawRow::Table(row)
    }

    fn context() -> SourceContext {
        SourceContext::new("ives").with_document(DocumentFacts {
            fund_ticker: Some("ives".into()),
            as_of_date: Some(date("2025-09-24")),
        })
    }

    #[test]
    fn normalizes_vendor_csv_row() {
        let row = table(&[
            (CanonicalField::Ticker, " aapl "),
            (CanonicalField::WeightPct, "0.0512"),
            (CanonicalField::MarketValueUsd, "$1,234,000"),
        ]);
        let normalized = Normalizer.normalize(&row, &context()).unwrap();
        let record = normalized.record;
        assert_eq!(record.fund_ticker, "IVES");
        assert_eq!(record.as_of_date, date("2025-09-24"));
        assert_eq!(record.ticker.as_deref(), Some("AAPL"));
        assert_eq!(record.weight_pct, Some(dec!(5.12)));
        assert_eq!(record.market_value_usd, Some(dec!(1234000)));
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn weight_scale_rules() {
        let auto = |value, percent| rescale_weight(value, percent, WeightScale::Auto);
        assert_eq!(auto(dec!(0.0512), false), Some(dec!(5.12)));
        assert_eq!(auto(dec!(1), false), Some(dec!(100)));
        assert_eq!(auto(dec!(4.25), false), Some(dec!(4.25)));
        assert_eq!(auto(dec!(0.75), true), Some(dec!(0.75)));
        assert_eq!(auto(dec!(-0.5), false), Some(dec!(-0.5)));
        assert_eq!(auto(dec!(0.123456789), false), Some(dec!(12.345679)));
        assert_eq!(
            rescale_weight(dec!(0.75), false, WeightScale::Percent),
            Some(dec!(0.75))
        );
        assert_eq!(
            rescale_weight(dec!(2), false, WeightScale::Fraction),
            Some(dec!(200))
        );
        assert_eq!(rescale_weight(Decimal::MAX, false, WeightScale::Fraction), None);
    }

    #[test]
    fn out_of_range_weight_is_nulled_with_warning() {
        let source = SourceContext {
            weight_scale: WeightScale::Fraction,
            ..context()
        };
        let row = table(&[
            (CanonicalField::Ticker, "AAPL"),
            (CanonicalField::WeightPct, "79228162514264337593543950335"),
        ]);
        let normalized = Normalizer.normalize(&row, &source).unwrap();
        assert_eq!(normalized.record.weight_pct, None);
        assert_eq!(normalized.warnings.len(), 1);
        assert!(normalized.warnings[0].contains("out of range"));
    }

    #[test]
    fn filing_value_becomes_whole_dollars_and_weight() {
        let position = FilingPosition {
            entry: 1,
            name_of_issuer: Some("APPLE INC".into()),
            title_of_class: Some("COM".into()),
            cusip: "037833100".into(),
            value_usd: Some(dec!(5000) * Decimal::ONE_THOUSAND),
            shares: Some(dec!(25000)),
            extras: BTreeMap::new(),
        };
        let context = SourceContext::new("tci")
            .with_report_date(Some(date("2025-06-30")))
            .with_filing_total(Some(dec!(10000000)))
            .with_extra("accession_number", "0001647251-25-000004");
        let record = Normalizer
            .normalize(&RawRow::Filing(position), &context)
            .unwrap()
            .record;
        assert_eq!(record.fund_ticker, "TCI");
        assert_eq!(record.as_of_date, date("2025-06-30"));
        assert_eq!(record.market_value_usd, Some(dec!(5000000)));
        assert_eq!(record.weight_pct, Some(dec!(50)));
        assert_eq!(record.cusip.as_deref(), Some("037833100"));
        assert_eq!(record.extras.get("title_of_class").map(String::as_str), Some("COM"));
        assert_eq!(
            record.extras.get("accession_number").map(String::as_str),
            Some("0001647251-25-000004")
        );
    }

    #[test]
    fn row_without_identifier_is_dropped() {
        let row = table(&[(CanonicalField::Shares, "100")]);
        assert_eq!(
            Normalizer.normalize(&row, &context()),
            Err(NormalizationError::MissingIdentifier)
        );
    }

    #[test]
    fn resolution_precedence_and_aliases() {
        let mut aliases = BTreeMap::new();
        aliases.insert("Wedbush Ives".to_string(), "ives".to_string());
        let row = table(&[
            (CanonicalField::FundTicker, "wedbush ives"),
            (CanonicalField::AsOfDate, "09/23/2025"),
            (CanonicalField::Name, "Cash & Other"),
            (CanonicalField::MarketValueUsd, "12,000"),
        ]);
        let context = SourceContext::new("src").with_fund_aliases(&aliases);
        let record = Normalizer.normalize(&row, &context).unwrap().record;
        assert_eq!(record.fund_ticker, "IVES");
        assert_eq!(record.as_of_date, date("2025-09-23"));

        let configured = SourceContext {
            fund_ticker: Some("arkk".into()),
            as_of_date: Some(date("2025-01-02")),
            ..context
        };
        let record = Normalizer.normalize(&row, &configured).unwrap().record;
        assert_eq!(record.fund_ticker, "ARKK");
        assert_eq!(record.as_of_date, date("2025-01-02"));

        let undated = table(&[(CanonicalField::Ticker, "X"), (CanonicalField::Shares, "1")]);
        assert_eq!(
            Normalizer.normalize(&undated, &SourceContext::new("src")),
            Err(NormalizationError::MissingAsOfDate)
        );
    }

    #[test]
    fn non_numeric_cells_become_null_with_warning() {
        let row = table(&[
            (CanonicalField::Ticker, "msft"),
            (CanonicalField::Shares, "lots"),
            (CanonicalField::WeightPct, "N/A"),
        ]);
        let normalized = Normalizer.normalize(&row, &context()).unwrap();
        assert_eq!(normalized.record.shares, None);
        assert_eq!(normalized.record.weight_pct, None);
        assert_eq!(normalized.warnings, vec!["shares 'lots' is not numeric".to_string()]);
    }
}
