use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use holdwatch_core::{HoldingField, HoldingRecord};

use super::diff::SnapshotDiff;

pub const DIFF_COLUMNS: [&str; 9] = [
    "key",
    "kind",
    "changed_fields",
    "before_shares",
    "before_weight_pct",
    "before_market_value_usd",
    "after_shares",
    "after_weight_pct",
    "after_market_value_usd",
];

/// Writes the diff as CSV, one row per entry in key order.
pub fn write_diff_csv(path: &Path, diff: &SnapshotDiff) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(DIFF_COLUMNS)?;
    for entry in &diff.entries {
        let changed = entry
            .changed_fields
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let mut row = vec![entry.key.to_string(), entry.kind.to_string(), changed];
        row.extend(values(entry.before.as_ref()));
        row.extend(values(entry.after.as_ref()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn values(record: Option<&HoldingRecord>) -> Vec<String> {
    HoldingField::ALL
        .iter()
        .map(|field| {
            record
                .and_then(|record| record.field_value(*field))
                .map(|value| value.to_string())
                .unwrap_or_default()
        })
        .collect()
}
