//! Tabular artifacts written at the end of a run.
//!
//! The CSV layout doubles as a snapshot format: every file written by [`write_csv`] can be read
//! back with [`read_csv`] and diffed like a stored key.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use holdwatch_core::{HoldingRecord, Snapshot, CANONICAL_COLUMNS};
use rust_decimal::Decimal;
use tracing::debug;

use crate::{StoreError, StoreResult};

/// Writes `records` as CSV in canonical column order, replacing `path` atomically.
pub fn write_csv(path: &Path, records: &[HoldingRecord]) -> StoreResult<()> {
    let tmp = staging_path(path)?;
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(CANONICAL_COLUMNS)?;
        for record in records {
            let extras = if record.extras.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&record.extras)?
            };
            writer.write_record([
                record.fund_ticker.clone(),
                record.as_of_date.format("%Y-%m-%d").to_string(),
                text(&record.ticker),
                text(&record.name),
                text(&record.cusip),
                text(&record.isin),
                text(&record.sedol),
                number(record.shares),
                number(record.weight_pct),
                number(record.market_value_usd),
                extras,
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), rows = records.len(), "wrote csv artifact");
    Ok(())
}

/// Writes `records` as a JSON array, replacing `path` atomically.
pub fn write_json(path: &Path, records: &[HoldingRecord]) -> StoreResult<()> {
    let tmp = staging_path(path)?;
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(writer, records)?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), rows = records.len(), "wrote json artifact");
    Ok(())
}

/// Reads a CSV artifact back into a snapshot labelled with its path.
pub fn read_csv(path: &Path) -> StoreResult<Snapshot> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let index: BTreeMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();
    for required in ["fund_ticker", "as_of_date"] {
        if !index.contains_key(required) {
            return Err(StoreError::Serialization(format!(
                "{} is missing the {required} column",
                path.display()
            )));
        }
    }

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let line = row + 2;
        let row = result?;
        let field = |name: &str| -> Option<String> {
            index
                .get(name)
                .and_then(|idx| row.get(*idx))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let fund_ticker = field("fund_ticker").ok_or_else(|| {
            StoreError::Serialization(format!("{}:{line}: empty fund_ticker", path.display()))
        })?;
        let date = field("as_of_date").unwrap_or_default();
        let as_of_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|err| {
            StoreError::Serialization(format!(
                "{}:{line}: invalid as_of_date '{date}': {err}",
                path.display()
            ))
        })?;
        let decimal = |name: &str| -> StoreResult<Option<Decimal>> {
            field(name)
                .map(|value| {
                    Decimal::from_str(&value).map_err(|err| {
                        StoreError::Serialization(format!(
                            "{}:{line}: invalid {name} '{value}': {err}",
                            path.display()
                        ))
                    })
                })
                .transpose()
        };
        let extras = match field("extras") {
            Some(json) => serde_json::from_str(&json)?,
            None => BTreeMap::new(),
        };
        records.push(HoldingRecord {
            fund_ticker,
            as_of_date,
            ticker: field("ticker"),
            name: field("name"),
            cusip: field("cusip"),
            isin: field("isin"),
            sedol: field("sedol"),
            shares: decimal("shares")?,
            weight_pct: decimal("weight_pct")?,
            market_value_usd: decimal("market_value_usd")?,
            extras,
        });
    }
    Ok(Snapshot::new(path.display().to_string(), records))
}

fn staging_path(path: &Path) -> StoreResult<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidState(format!("{} is not a file path", path.display())))?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_test_utils::holding;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn records() -> Vec<HoldingRecord> {
        vec![
            holding("ARKK", "2025-09-24", "TSLA")
                .name("TESLA INC, CLASS A")
                .cusip("88160R101")
                .shares(dec!(2512345))
                .weight(dec!(10.25))
                .market_value(dec!(1150000000.50))
                .build(),
            holding("ARKK", "2025-09-24", "ROKU")
                .extra("sector", "Communication \"Services\"")
                .build(),
        ]
    }

    #[test]
    fn csv_artifact_keeps_canonical_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/holdings.csv");
        write_csv(&path, &records()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(header, CANONICAL_COLUMNS.join(","));
        assert!(!dir.path().join("out/holdings.csv.tmp").exists());

        let snapshot = read_csv(&path).unwrap();
        assert_eq!(snapshot.records(), records().as_slice());
        assert_eq!(snapshot.label(), path.display().to_string());
    }

    #[test]
    fn json_artifact_is_an_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("holdings.json");
        write_json(&path, &records()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ticker"], "TSLA");
        assert_eq!(rows[1]["extras"]["sector"], "Communication \"Services\"");
    }

    #[test]
    fn rejects_corrupt_snapshots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        fs::write(&path, "ticker,shares\nAAPL,10\n").unwrap();
        assert!(matches!(read_csv(&path), Err(StoreError::Serialization(_))));

        fs::write(&path, "fund_ticker,as_of_date,shares\nARKK,2025-09-24,lots\n").unwrap();
        assert!(matches!(read_csv(&path), Err(StoreError::Serialization(_))));

        assert!(read_csv(&dir.path().join("missing.csv")).is_err());
    }
}
