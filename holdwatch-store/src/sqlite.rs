use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use holdwatch_core::{HoldingRecord, Snapshot, SnapshotKey};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::{
    AppendOutcome, AppendPolicy, HoldingsQuery, SnapshotRepository, SnapshotSummary, StoreError,
    StoreResult,
};

const HOLDINGS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS holdings (
    id INTEGER PRIMARY KEY,
    fund_ticker TEXT NOT NULL,
    as_of_date TEXT NOT NULL,
    ticker TEXT,
    name TEXT,
    cusip TEXT,
    isin TEXT,
    sedol TEXT,
    shares TEXT,
    weight_pct TEXT,
    market_value_usd TEXT,
    extras TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS holdings_idx_fund_date ON holdings(fund_ticker, as_of_date);
CREATE INDEX IF NOT EXISTS holdings_idx_ticker ON holdings(ticker);
CREATE INDEX IF NOT EXISTS holdings_idx_cusip ON holdings(cusip);
CREATE INDEX IF NOT EXISTS holdings_idx_isin ON holdings(isin);
CREATE INDEX IF NOT EXISTS holdings_idx_sedol ON holdings(sedol);
"#;

const SELECT_COLUMNS: &str = "fund_ticker, as_of_date, ticker, name, cusip, isin, sedol, \
     shares, weight_pct, market_value_usd, extras";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed snapshot history.
#[derive(Clone, Debug)]
pub struct SqliteSnapshotStore {
    path: PathBuf,
    policy: AppendPolicy,
}

impl SqliteSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self {
            path: path.into(),
            policy: AppendPolicy::default(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AppendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AppendPolicy {
        self.policy
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(HOLDINGS_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    fn select(&self, sql: &str, params: Vec<Value>) -> StoreResult<Vec<HoldingRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }
}

impl SnapshotRepository for SqliteSnapshotStore {
    fn append_snapshot(&self, key: &SnapshotKey, records: &[HoldingRecord]) -> StoreResult<AppendOutcome> {
        for record in records {
            if record.fund_ticker != key.fund_ticker || record.as_of_date != key.as_of_date {
                return Err(StoreError::InvalidState(format!(
                    "record for {}@{} appended under {key}",
                    record.fund_ticker, record.as_of_date
                )));
            }
            record
                .validate()
                .map_err(|err| StoreError::InvalidState(format!("{key}: {err}")))?;
        }

        let date = key.as_of_date.format(DATE_FORMAT).to_string();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM holdings WHERE fund_ticker = ?1 AND as_of_date = ?2",
            params![key.fund_ticker, date],
            |row| row.get(0),
        )?;
        let replaced = if existing > 0 {
            match self.policy {
                AppendPolicy::Reject => return Err(StoreError::Conflict { key: key.clone() }),
                AppendPolicy::Replace => tx.execute(
                    "DELETE FROM holdings WHERE fund_ticker = ?1 AND as_of_date = ?2",
                    params![key.fund_ticker, date],
                )?,
            }
        } else {
            0
        };
        {
            let mut insert = tx.prepare(
                "INSERT INTO holdings (
                    fund_ticker, as_of_date, ticker, name, cusip, isin, sedol,
                    shares, weight_pct, market_value_usd, extras
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for record in records {
                let extras = serde_json::to_string(&record.extras)?;
                insert.execute(params![
                    record.fund_ticker,
                    date,
                    record.ticker,
                    record.name,
                    record.cusip,
                    record.isin,
                    record.sedol,
                    record.shares.map(|v| v.to_string()),
                    record.weight_pct.map(|v| v.to_string()),
                    record.market_value_usd.map(|v| v.to_string()),
                    extras
                ])?;
            }
        }
        tx.commit()?;
        info!(
            key = %key,
            inserted = records.len(),
            replaced,
            "stored snapshot"
        );
        Ok(AppendOutcome {
            key: key.clone(),
            inserted: records.len(),
            replaced,
        })
    }

    fn load(&self, key: &SnapshotKey) -> StoreResult<Snapshot> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM holdings
             WHERE fund_ticker = ?1 AND as_of_date = ?2 ORDER BY id ASC"
        );
        let records = self.select(
            &sql,
            vec![
                Value::from(key.fund_ticker.clone()),
                Value::from(key.as_of_date.format(DATE_FORMAT).to_string()),
            ],
        )?;
        if records.is_empty() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        debug!(key = %key, rows = records.len(), "loaded snapshot");
        Ok(Snapshot::new(key.to_string(), records))
    }

    fn load_date(&self, as_of_date: NaiveDate) -> StoreResult<Snapshot> {
        let date = as_of_date.format(DATE_FORMAT).to_string();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM holdings WHERE as_of_date = ?1 ORDER BY fund_ticker, id"
        );
        let records = self.select(&sql, vec![Value::from(date.clone())])?;
        let label = format!("*@{date}");
        if records.is_empty() {
            return Err(StoreError::NotFound(label));
        }
        Ok(Snapshot::new(label, records))
    }

    fn list_snapshots(&self, fund_ticker: Option<&str>) -> StoreResult<Vec<SnapshotSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT fund_ticker, as_of_date, COUNT(*) FROM holdings
             WHERE (?1 IS NULL OR fund_ticker = ?1)
             GROUP BY fund_ticker, as_of_date
             ORDER BY fund_ticker ASC, as_of_date ASC",
        )?;
        let fund = optional_text(fund_ticker.map(str::to_uppercase));
        let mut rows = stmt.query(params![fund])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            let fund_ticker: String = row.get(0)?;
            let date: String = row.get(1)?;
            let count: i64 = row.get(2)?;
            summaries.push(SnapshotSummary {
                key: SnapshotKey::new(fund_ticker, parse_date(&date)?),
                rows: count as usize,
            });
        }
        Ok(summaries)
    }

    fn latest_before(&self, fund_ticker: &str, as_of_date: NaiveDate) -> StoreResult<Option<SnapshotKey>> {
        let conn = self.connect()?;
        let fund = fund_ticker.to_uppercase();
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(as_of_date) FROM holdings WHERE fund_ticker = ?1 AND as_of_date < ?2",
            params![fund, as_of_date.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        latest
            .map(|date| Ok(SnapshotKey::new(fund.clone(), parse_date(&date)?)))
            .transpose()
    }

    fn query(&self, query: HoldingsQuery) -> StoreResult<Vec<HoldingRecord>> {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM holdings
             WHERE (?1 IS NULL OR fund_ticker = ?1)
               AND (?2 IS NULL OR as_of_date = ?2)
               AND (?3 IS NULL OR ticker = ?3)
               AND (?4 IS NULL OR cusip = ?4)
             ORDER BY as_of_date DESC, fund_ticker ASC, id ASC"
        );
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?5");
        }
        let mut params: Vec<Value> = Vec::with_capacity(5);
        params.push(optional_text(query.fund_ticker));
        params.push(optional_text(
            query.as_of_date.map(|d| d.format(DATE_FORMAT).to_string()),
        ));
        params.push(optional_text(query.ticker));
        params.push(optional_text(query.cusip));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }
        self.select(&sql, params)
    }
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn parse_date(value: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|err| StoreError::Serialization(format!("invalid date {value}: {err}")))
}

fn parse_decimal(value: Option<String>) -> StoreResult<Option<Decimal>> {
    value
        .map(|text| {
            Decimal::from_str(&text)
                .map_err(|err| StoreError::Serialization(format!("invalid decimal {text}: {err}")))
        })
        .transpose()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> StoreResult<HoldingRecord> {
    let fund_ticker: String = row.get(0)?;
    let date: String = row.get(1)?;
    let extras_json: Option<String> = row.get(10)?;
    let extras: BTreeMap<String, String> = match extras_json.as_deref() {
        None | Some("") => BTreeMap::new(),
        Some(json) => serde_json::from_str(json).map_err(|err| {
            StoreError::Serialization(format!("invalid extras payload: {err}"))
        })?,
    };
    Ok(HoldingRecord {
        fund_ticker,
        as_of_date: parse_date(&date)?,
        ticker: row.get(2)?,
        name: row.get(3)?,
        cusip: row.get(4)?,
        isin: row.get(5)?,
        sedol: row.get(6)?,
        shares: parse_decimal(row.get(7)?)?,
        weight_pct: parse_decimal(row.get(8)?)?,
        market_value_usd: parse_decimal(row.get(9)?)?,
        extras,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_test_utils::{date, holding};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn tci(as_of: &str, shares: Decimal) -> Vec<HoldingRecord> {
        vec![
            holding("TCI", as_of, "X1")
                .cusip("037833100")
                .shares(shares)
                .weight(dec!(12.5))
                .extra("accession_number", "0001647251-25-000004")
                .build(),
            holding("TCI", as_of, "GE").shares(dec!(10)).build(),
        ]
    }

    #[test]
    fn sqlite_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("nested/holdings.db")).unwrap();
        let outcome = store
            .append("TCI", date("2025-06-30"), &tci("2025-06-30", dec!(100)))
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.replaced, 0);

        let snapshot = store
            .load(&SnapshotKey::new("TCI", date("2025-06-30")))
            .unwrap();
        assert_eq!(snapshot.label(), "TCI@2025-06-30");
        assert_eq!(snapshot.records(), tci("2025-06-30", dec!(100)).as_slice());
    }

    #[test]
    fn replace_policy_swaps_rows_for_key() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db")).unwrap();
        let key = SnapshotKey::new("TCI", date("2025-06-30"));
        store.append_snapshot(&key, &tci("2025-06-30", dec!(100))).unwrap();
        let outcome = store
            .append_snapshot(&key, &tci("2025-06-30", dec!(150))[..1])
            .unwrap();
        assert_eq!(outcome.replaced, 2);

        let snapshot = store.load(&key).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records()[0].shares, Some(dec!(150)));
    }

    #[test]
    fn reject_policy_refuses_duplicates() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db"))
            .unwrap()
            .with_policy(AppendPolicy::Reject);
        let key = SnapshotKey::new("TCI", date("2025-06-30"));
        store.append_snapshot(&key, &tci("2025-06-30", dec!(100))).unwrap();
        let err = store
            .append_snapshot(&key, &tci("2025-06-30", dec!(150)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        let snapshot = store.load(&key).unwrap();
        assert_eq!(snapshot.records()[0].shares, Some(dec!(100)));
    }

    #[test]
    fn lists_keys_and_finds_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db")).unwrap();
        for as_of in ["2025-03-31", "2025-06-30"] {
            store.append("TCI", date(as_of), &tci(as_of, dec!(1))).unwrap();
        }
        store
            .append(
                "ARKK",
                date("2025-06-30"),
                &[holding("ARKK", "2025-06-30", "TSLA").shares(dec!(5)).build()],
            )
            .unwrap();

        let all = store.list_snapshots(None).unwrap();
        let keys: Vec<String> = all.iter().map(|s| s.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["ARKK@2025-06-30", "TCI@2025-03-31", "TCI@2025-06-30"]
        );
        assert_eq!(store.list_snapshots(Some("tci")).unwrap().len(), 2);
        assert_eq!(all[1].rows, 2);

        assert_eq!(
            store.latest_before("tci", date("2025-06-30")).unwrap(),
            Some(SnapshotKey::new("TCI", date("2025-03-31")))
        );
        assert_eq!(store.latest_before("TCI", date("2025-03-31")).unwrap(), None);

        let june = store.load_date(date("2025-06-30")).unwrap();
        assert_eq!(june.len(), 3);
        assert_eq!(june.label(), "*@2025-06-30");
        assert!(matches!(
            store.load(&SnapshotKey::new("TCI", date("2024-12-31"))),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn query_filters_holdings() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db")).unwrap();
        store.append("TCI", date("2025-03-31"), &tci("2025-03-31", dec!(1))).unwrap();
        store.append("TCI", date("2025-06-30"), &tci("2025-06-30", dec!(2))).unwrap();

        let latest_first = store.query(HoldingsQuery::default().with_fund("tci")).unwrap();
        assert_eq!(latest_first.len(), 4);
        assert_eq!(latest_first[0].as_of_date, date("2025-06-30"));

        let by_cusip = store
            .query(HoldingsQuery::default().with_cusip("037833100").with_limit(1))
            .unwrap();
        assert_eq!(by_cusip.len(), 1);
        assert_eq!(by_cusip[0].shares, Some(dec!(2)));

        let dated = store
            .query(HoldingsQuery::default().with_as_of(date("2025-03-31")).with_ticker("ge"))
            .unwrap();
        assert_eq!(dated.len(), 1);
        assert_eq!(dated[0].ticker.as_deref(), Some("GE"));
    }

    #[test]
    fn rejects_records_outside_the_key() {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db")).unwrap();
        let err = store
            .append("ARKK", date("2025-06-30"), &tci("2025-06-30", dec!(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }
}
