use chrono::NaiveDate;
use holdwatch_core::{HoldingRecord, Snapshot, SnapshotKey};
use serde::{Deserialize, Serialize};

use crate::{HoldingsQuery, StoreResult};

/// What to do when a (fund, as-of date) key is appended a second time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPolicy {
    /// Delete the stored rows for the key and insert the new ones in one transaction.
    #[default]
    Replace,
    /// Fail with [`crate::StoreError::Conflict`].
    Reject,
}

/// Result of one append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub key: SnapshotKey,
    pub inserted: usize,
    /// Rows deleted because the key was already stored.
    pub replaced: usize,
}

/// Stored key with its row count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    #[serde(flatten)]
    pub key: SnapshotKey,
    pub rows: usize,
}

/// Abstraction over durable snapshot storage engines.
pub trait SnapshotRepository: Send + Sync {
    /// Persist the records of one fund on one reporting date.
    fn append(
        &self,
        fund_ticker: &str,
        as_of_date: NaiveDate,
        records: &[HoldingRecord],
    ) -> StoreResult<AppendOutcome> {
        self.append_snapshot(&SnapshotKey::new(fund_ticker, as_of_date), records)
    }

    /// Persist a keyed group of records atomically, honouring the store's append policy.
    fn append_snapshot(&self, key: &SnapshotKey, records: &[HoldingRecord]) -> StoreResult<AppendOutcome>;

    /// Load one stored snapshot.
    fn load(&self, key: &SnapshotKey) -> StoreResult<Snapshot>;

    /// Load every fund stored for `as_of_date`.
    fn load_date(&self, as_of_date: NaiveDate) -> StoreResult<Snapshot>;

    /// Stored keys, optionally restricted to one fund.
    fn list_snapshots(&self, fund_ticker: Option<&str>) -> StoreResult<Vec<SnapshotSummary>>;

    /// Most recent key of `fund_ticker` strictly before `as_of_date`.
    fn latest_before(&self, fund_ticker: &str, as_of_date: NaiveDate) -> StoreResult<Option<SnapshotKey>>;

    /// Records matching the supplied query.
    fn query(&self, query: HoldingsQuery) -> StoreResult<Vec<HoldingRecord>>;
}
