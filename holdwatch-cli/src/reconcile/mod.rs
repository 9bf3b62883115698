pub mod diff;
pub mod report;
pub mod snapshot;

pub use diff::{DiffEntry, DiffKind, SnapshotDiff, SnapshotDiffer};
pub use report::{write_diff_csv, DIFF_COLUMNS};
pub use snapshot::SnapshotRef;
