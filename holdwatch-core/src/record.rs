use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column order shared by the `holdings` table and every tabular artifact.
pub const CANONICAL_COLUMNS: [&str; 11] = [
    "fund_ticker",
    "as_of_date",
    "ticker",
    "name",
    "cusip",
    "isin",
    "sedol",
    "shares",
    "weight_pct",
    "market_value_usd",
    "extras",
];

/// Source-independent description of one reported position.
///
/// Records are ordered field by field, which gives every collection of records a canonical
/// order independent of the order in which sources produced them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub fund_ticker: String,
    pub as_of_date: NaiveDate,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub cusip: Option<String>,
    pub isin: Option<String>,
    pub sedol: Option<String>,
    pub shares: Option<Decimal>,
    pub weight_pct: Option<Decimal>,
    pub market_value_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
}

impl HoldingRecord {
    /// Creates an empty record for the given fund and reporting date.
    pub fn new(fund_ticker: impl Into<String>, as_of_date: NaiveDate) -> Self {
        Self {
            fund_ticker: fund_ticker.into(),
            as_of_date,
            ticker: None,
            name: None,
            cusip: None,
            isin: None,
            sedol: None,
            shares: None,
            weight_pct: None,
            market_value_usd: None,
            extras: BTreeMap::new(),
        }
    }

    /// First available security identifier, in ticker, CUSIP, ISIN, SEDOL, name order.
    pub fn security_id(&self) -> Option<SecurityId> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        present(&self.ticker)
            .map(SecurityId::Ticker)
            .or_else(|| present(&self.cusip).map(SecurityId::Cusip))
            .or_else(|| present(&self.isin).map(SecurityId::Isin))
            .or_else(|| present(&self.sedol).map(SecurityId::Sedol))
            .or_else(|| present(&self.name).map(SecurityId::Name))
    }

    /// Key used to match this position across snapshots.
    pub fn identity_key(&self) -> Option<IdentityKey> {
        self.security_id().map(|security| IdentityKey {
            fund_ticker: self.fund_ticker.clone(),
            security,
        })
    }

    /// Numeric value tracked by the differ for `field`.
    pub fn field_value(&self, field: HoldingField) -> Option<Decimal> {
        match field {
            HoldingField::Shares => self.shares,
            HoldingField::WeightPct => self.weight_pct,
            HoldingField::MarketValueUsd => self.market_value_usd,
        }
    }

    /// Checks the invariants every persisted record must satisfy.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.fund_ticker.trim().is_empty() {
            return Err(RecordError::MissingFundTicker);
        }
        if self.security_id().is_none() {
            return Err(RecordError::MissingIdentifier);
        }
        Ok(())
    }
}

/// Invariant violations detected on a [`HoldingRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no fund ticker")]
    MissingFundTicker,
    #[error("record has no security identifier (ticker, cusip, isin, sedol or name)")]
    MissingIdentifier,
}

/// Security identifier chosen for identity matching, tagged with its scheme.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "value", rename_all = "snake_case")]
pub enum SecurityId {
    Ticker(String),
    Cusip(String),
    Isin(String),
    Sedol(String),
    Name(String),
}

impl SecurityId {
    pub fn scheme(&self) -> &'static str {
        match self {
            SecurityId::Ticker(_) => "ticker",
            SecurityId::Cusip(_) => "cusip",
            SecurityId::Isin(_) => "isin",
            SecurityId::Sedol(_) => "sedol",
            SecurityId::Name(_) => "name",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            SecurityId::Ticker(v)
            | SecurityId::Cusip(v)
            | SecurityId::Isin(v)
            | SecurityId::Sedol(v)
            | SecurityId::Name(v) => v,
        }
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme(), self.value())
    }
}

/// `(fund_ticker, security identifier)` tuple matching positions across snapshots.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub fund_ticker: String,
    pub security: SecurityId,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.fund_ticker, self.security)
    }
}

/// Numeric fields compared when diffing two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingField {
    Shares,
    WeightPct,
    MarketValueUsd,
}

impl HoldingField {
    pub const ALL: [HoldingField; 3] = [
        HoldingField::Shares,
        HoldingField::WeightPct,
        HoldingField::MarketValueUsd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HoldingField::Shares => "shares",
            HoldingField::WeightPct => "weight_pct",
            HoldingField::MarketValueUsd => "market_value_usd",
        }
    }
}

impl fmt::Display for HoldingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldingField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shares" => Ok(HoldingField::Shares),
            "weight_pct" => Ok(HoldingField::WeightPct),
            "market_value_usd" => Ok(HoldingField::MarketValueUsd),
            other => Err(format!("unknown holding field: {other}")),
        }
    }
}
