use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Descriptor of one configured holdings source, discriminated by `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    CsvUrl(CsvSource),
    HtmlTable(HtmlSource),
    EdgarCik(EdgarSource),
}

impl SourceConfig {
    pub fn id(&self) -> &str {
        match self {
            SourceConfig::CsvUrl(source) => &source.id,
            SourceConfig::HtmlTable(source) => &source.id,
            SourceConfig::EdgarCik(source) => &source.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::CsvUrl(_) => "csv_url",
            SourceConfig::HtmlTable(_) => "html_table",
            SourceConfig::EdgarCik(_) => "edgar_cik",
        }
    }

    /// Fund ticker pinned by configuration, if any.
    pub fn fund_ticker(&self) -> Option<&str> {
        match self {
            SourceConfig::CsvUrl(source) => source.fund_ticker.as_deref(),
            SourceConfig::HtmlTable(source) => source.fund_ticker.as_deref(),
            SourceConfig::EdgarCik(source) => source.fund_ticker.as_deref(),
        }
    }

    /// As-of date pinned by configuration, if any.
    pub fn as_of(&self) -> Option<NaiveDate> {
        match self {
            SourceConfig::CsvUrl(source) => source.as_of,
            SourceConfig::HtmlTable(source) => source.as_of,
            SourceConfig::EdgarCik(_) => None,
        }
    }
}

/// Vendor CSV download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsvSource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub fund_ticker: Option<String>,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub weight_scale: WeightScale,
    #[serde(default)]
    pub column_map: ColumnMap,
}

/// Vendor holdings page rendered as an HTML table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HtmlSource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub fund_ticker: Option<String>,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default = "default_table_selector")]
    pub table_selector: String,
    #[serde(default)]
    pub as_of_selector: Option<String>,
    #[serde(default)]
    pub weight_scale: WeightScale,
    #[serde(default)]
    pub column_map: ColumnMap,
}

fn default_table_selector() -> String {
    "table".to_string()
}

/// Institutional manager identified by its SEC central index key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgarSource {
    pub id: String,
    pub cik: String,
    #[serde(default)]
    pub fund_ticker: Option<String>,
    /// Upper bound on the filing's report date.
    #[serde(default)]
    pub before: Option<NaiveDate>,
    #[serde(default)]
    pub filing_format: FilingFormatHint,
    #[serde(default)]
    pub value_unit: ValueUnit,
}

impl EdgarSource {
    /// CIK without leading zeros, as used in archive paths.
    pub fn cik_digits(&self) -> String {
        let digits: String = self.cik.chars().filter(char::is_ascii_digit).collect();
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// CIK left-padded to the ten digits used by the submissions API.
    pub fn cik_padded(&self) -> String {
        format!("{:0>10}", self.cik_digits())
    }
}

/// Canonical field a vendor column can be mapped onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    FundTicker,
    AsOfDate,
    Ticker,
    Name,
    Cusip,
    Isin,
    Sedol,
    Shares,
    WeightPct,
    MarketValueUsd,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 10] = [
        CanonicalField::FundTicker,
        CanonicalField::AsOfDate,
        CanonicalField::Ticker,
        CanonicalField::Name,
        CanonicalField::Cusip,
        CanonicalField::Isin,
        CanonicalField::Sedol,
        CanonicalField::Shares,
        CanonicalField::WeightPct,
        CanonicalField::MarketValueUsd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::FundTicker => "fund_ticker",
            CanonicalField::AsOfDate => "as_of_date",
            CanonicalField::Ticker => "ticker",
            CanonicalField::Name => "name",
            CanonicalField::Cusip => "cusip",
            CanonicalField::Isin => "isin",
            CanonicalField::Sedol => "sedol",
            CanonicalField::Shares => "shares",
            CanonicalField::WeightPct => "weight_pct",
            CanonicalField::MarketValueUsd => "market_value_usd",
        }
    }

    /// Fields whose presence makes a table row worth keeping.
    pub fn is_measure(self) -> bool {
        matches!(
            self,
            CanonicalField::Shares | CanonicalField::WeightPct | CanonicalField::MarketValueUsd
        )
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == needle)
            .ok_or_else(|| format!("unknown canonical field: {s}"))
    }
}

/// One header or a list of alternative headers for a canonical field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderAliases {
    One(String),
    Many(Vec<String>),
}

impl HeaderAliases {
    pub fn headers(&self) -> Vec<&str> {
        match self {
            HeaderAliases::One(header) => vec![header.as_str()],
            HeaderAliases::Many(headers) => headers.iter().map(String::as_str).collect(),
        }
    }
}

/// Canonical field name to vendor header(s), as written in configuration.
///
/// Keys stay plain strings so configuration loaders that normalize key case keep working;
/// [`ColumnMap::resolve`] validates them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMap(pub BTreeMap<String, HeaderAliases>);

impl ColumnMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn with(mut self, field: CanonicalField, header: impl Into<String>) -> Self {
        let header = header.into();
        let entry = self
            .0
            .entry(field.as_str().to_string())
            .or_insert_with(|| HeaderAliases::Many(Vec::new()));
        match entry {
            HeaderAliases::One(existing) => {
                *entry = HeaderAliases::Many(vec![existing.clone(), header]);
            }
            HeaderAliases::Many(list) => list.push(header),
        }
        self
    }

    /// Validated mapping from canonical field to the configured headers.
    pub fn resolve(&self) -> Result<BTreeMap<CanonicalField, Vec<String>>, String> {
        let mut resolved = BTreeMap::new();
        for (field, aliases) in &self.0 {
            let field = CanonicalField::from_str(field)?;
            let headers: Vec<String> = aliases
                .headers()
                .into_iter()
                .map(str::to_string)
                .collect();
            resolved.insert(field, headers);
        }
        Ok(resolved)
    }
}

/// How a vendor expresses portfolio weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScale {
    /// Values in [0, 1] are fractions, larger values are percentages.
    #[default]
    Auto,
    Fraction,
    Percent,
}

/// Unit of the value column in a 13F information table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUnit {
    #[default]
    Thousands,
    Dollars,
}

impl ValueUnit {
    pub fn multiplier(self) -> Decimal {
        match self {
            ValueUnit::Thousands => Decimal::ONE_THOUSAND,
            ValueUnit::Dollars => Decimal::ONE,
        }
    }
}

/// Explicit filing format, bypassing content sniffing when not `Auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingFormatHint {
    #[default]
    Auto,
    Xml,
    Text,
}
