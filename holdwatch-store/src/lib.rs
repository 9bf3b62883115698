//! Snapshot history and run artifacts for Holdwatch.

mod artifact;
mod error;
mod query;
mod repository;
mod sqlite;

pub use artifact::{read_csv, write_csv, write_json};
pub use error::{StoreError, StoreResult};
pub use query::HoldingsQuery;
pub use repository::{AppendOutcome, AppendPolicy, SnapshotRepository, SnapshotSummary};
pub use sqlite::SqliteSnapshotStore;
