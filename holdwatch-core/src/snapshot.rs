use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::HoldingRecord;

/// Storage key of a persisted snapshot: one fund on one reporting date.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub fund_ticker: String,
    pub as_of_date: NaiveDate,
}

impl SnapshotKey {
    pub fn new(fund_ticker: impl Into<String>, as_of_date: NaiveDate) -> Self {
        Self {
            fund_ticker: fund_ticker.into(),
            as_of_date,
        }
    }

    pub fn of(record: &HoldingRecord) -> Self {
        Self::new(record.fund_ticker.clone(), record.as_of_date)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.fund_ticker, self.as_of_date.format("%Y-%m-%d"))
    }
}

impl FromStr for SnapshotKey {
    type Err = String;

    /// Parses the `FUND@YYYY-MM-DD` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fund, date) = s
            .split_once('@')
            .ok_or_else(|| format!("snapshot key '{s}' must look like FUND@YYYY-MM-DD"))?;
        let fund = fund.trim();
        if fund.is_empty() {
            return Err(format!("snapshot key '{s}' has an empty fund ticker"));
        }
        let as_of_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|err| format!("snapshot key '{s}' has an invalid date: {err}"))?;
        Ok(Self::new(fund.to_ascii_uppercase(), as_of_date))
    }
}

/// Immutable set of records taken from one run, one stored key, or one artifact file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    label: String,
    records: Vec<HoldingRecord>,
}

impl Snapshot {
    pub fn new(label: impl Into<String>, records: Vec<HoldingRecord>) -> Self {
        Self {
            label: label.into(),
            records,
        }
    }

    /// Identifier of the snapshot (storage key or file path).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn records(&self) -> &[HoldingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct (fund, date) keys covered by this snapshot.
    pub fn keys(&self) -> BTreeSet<SnapshotKey> {
        self.records.iter().map(SnapshotKey::of).collect()
    }

    pub fn into_records(self) -> Vec<HoldingRecord> {
        self.records
    }
}
