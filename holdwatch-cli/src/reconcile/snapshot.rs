use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use holdwatch_core::{Snapshot, SnapshotKey};
use holdwatch_store::{read_csv, SnapshotRepository};

/// Where a snapshot compared by the differ comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotRef {
    /// CSV artifact written by a previous run.
    File(PathBuf),
    /// One stored (fund, date) key.
    Key(SnapshotKey),
    /// Every fund stored for one date (`*@YYYY-MM-DD`).
    Date(NaiveDate),
}

impl SnapshotRef {
    /// Existing paths win over the `FUND@DATE` syntax.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("snapshot reference must not be empty"));
        }
        if Path::new(value).exists() || !value.contains('@') {
            return Ok(Self::File(PathBuf::from(value)));
        }
        if let Some(date) = value.strip_prefix("*@") {
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid date in snapshot reference '{value}'"))?;
            return Ok(Self::Date(date));
        }
        value.parse::<SnapshotKey>().map(Self::Key).map_err(|err| anyhow!(err))
    }

    pub fn needs_store(&self) -> bool {
        !matches!(self, Self::File(_))
    }

    /// Loads the referenced snapshot; stored references require `store`.
    pub fn load(&self, store: Option<&dyn SnapshotRepository>) -> Result<Snapshot> {
        match self {
            Self::File(path) => {
                read_csv(path).with_context(|| format!("failed to load snapshot {}", path.display()))
            }
            Self::Key(key) => {
                let store = store.ok_or_else(|| anyhow!("snapshot {key} needs a database"))?;
                store
                    .load(key)
                    .with_context(|| format!("failed to load snapshot {key}"))
            }
            Self::Date(date) => {
                let store = store.ok_or_else(|| anyhow!("snapshot *@{date} needs a database"))?;
                store
                    .load_date(*date)
                    .with_context(|| format!("failed to load snapshots for {date}"))
            }
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Key(key) => write!(f, "{key}"),
            Self::Date(date) => write!(f, "*@{}", date.format("%Y-%m-%d")),
        }
    }
}
