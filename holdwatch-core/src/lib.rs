//! Canonical holdings vocabulary shared by every Holdwatch crate.

pub mod display;
mod record;
mod snapshot;
mod source;
mod warning;

pub use record::{
    HoldingField, HoldingRecord, IdentityKey, RecordError, SecurityId, CANONICAL_COLUMNS,
};
pub use snapshot::{Snapshot, SnapshotKey};
pub use source::{
    CanonicalField, ColumnMap, CsvSource, EdgarSource, FilingFormatHint, HeaderAliases,
    HtmlSource, SourceConfig, ValueUnit, WeightScale,
};
pub use warning::{RunWarning, WarningStage};
