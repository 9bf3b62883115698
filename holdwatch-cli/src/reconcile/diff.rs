use std::collections::BTreeMap;
use std::fmt;

use holdwatch_core::{HoldingField, HoldingRecord, IdentityKey, Snapshot};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// Classification of one identity key across two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Changed,
}

impl DiffKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffKind::Added => "added",
            DiffKind::Removed => "removed",
            DiffKind::Changed => "changed",
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One position that differs between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub key: IdentityKey,
    pub kind: DiffKind,
    pub before: Option<HoldingRecord>,
    pub after: Option<HoldingRecord>,
    /// Empty unless `kind` is [`DiffKind::Changed`].
    pub changed_fields: Vec<HoldingField>,
}

/// Every divergence between two snapshots, sorted by identity key.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SnapshotDiff {
    pub before: String,
    pub after: String,
    pub entries: Vec<DiffEntry>,
    /// Records skipped because they carry no identifier at all.
    pub unkeyed: usize,
}

impl SnapshotDiff {
    pub fn count(&self, kind: DiffKind) -> usize {
        self.entries.iter().filter(|entry| entry.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stateless engine comparing two snapshots position by position.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotDiffer {
    tolerance: Decimal,
}

impl SnapshotDiffer {
    /// `tolerance` is the absolute delta a numeric field must exceed to count as changed.
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn diff(&self, before: &Snapshot, after: &Snapshot) -> SnapshotDiff {
        let (before_index, before_unkeyed) = index(before.records());
        let (mut after_index, after_unkeyed) = index(after.records());

        let mut entries = Vec::new();
        for (key, old) in before_index {
            match after_index.remove(&key) {
                Some(new) => {
                    let changed_fields = self.changed_fields(&old, &new);
                    if !changed_fields.is_empty() {
                        entries.push(DiffEntry {
                            key,
                            kind: DiffKind::Changed,
                            before: Some(old),
                            after: Some(new),
                            changed_fields,
                        });
                    }
                }
                None => entries.push(DiffEntry {
                    key,
                    kind: DiffKind::Removed,
                    before: Some(old),
                    after: None,
                    changed_fields: Vec::new(),
                }),
            }
        }
        entries.extend(after_index.into_iter().map(|(key, new)| DiffEntry {
            key,
            kind: DiffKind::Added,
            before: None,
            after: Some(new),
            changed_fields: Vec::new(),
        }));
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let diff = SnapshotDiff {
            before: before.label().to_string(),
            after: after.label().to_string(),
            entries,
            unkeyed: before_unkeyed + after_unkeyed,
        };
        debug!(
            before = %diff.before,
            after = %diff.after,
            added = diff.count(DiffKind::Added),
            removed = diff.count(DiffKind::Removed),
            changed = diff.count(DiffKind::Changed),
            "computed snapshot diff"
        );
        diff
    }

    fn changed_fields(&self, old: &HoldingRecord, new: &HoldingRecord) -> Vec<HoldingField> {
        HoldingField::ALL
            .into_iter()
            .filter(|field| {
                match (old.field_value(*field), new.field_value(*field)) {
                    (Some(a), Some(b)) => a
                        .checked_sub(b)
                        .map_or(true, |delta| delta.abs() > self.tolerance),
                    (None, None) => false,
                    _ => true,
                }
            })
            .collect()
    }
}

/// Groups records by identity key, merging duplicates within the snapshot.
fn index(records: &[HoldingRecord]) -> (BTreeMap<IdentityKey, HoldingRecord>, usize) {
    let mut groups: BTreeMap<IdentityKey, Vec<&HoldingRecord>> = BTreeMap::new();
    let mut unkeyed = 0;
    for record in records {
        match record.identity_key() {
            Some(key) => groups.entry(key).or_default().push(record),
            None => unkeyed += 1,
        }
    }
    let index = groups
        .into_iter()
        .filter_map(|(key, mut group)| {
            group.sort();
            let (first, rest) = group.split_first()?;
            Some((key, merge(first, rest)))
        })
        .collect();
    (index, unkeyed)
}

/// Folds canonically sorted duplicates into one record: quantities are summed, the first
/// non-null descriptive field wins.
fn merge(first: &HoldingRecord, rest: &[&HoldingRecord]) -> HoldingRecord {
    let mut merged = first.clone();
    for record in rest {
        merged.shares = sum(merged.shares, record.shares);
        merged.market_value_usd = sum(merged.market_value_usd, record.market_value_usd);
        merged.weight_pct = sum(merged.weight_pct, record.weight_pct);
        for (slot, value) in [
            (&mut merged.ticker, &record.ticker),
            (&mut merged.name, &record.name),
            (&mut merged.cusip, &record.cusip),
            (&mut merged.isin, &record.isin),
            (&mut merged.sedol, &record.sedol),
        ] {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        for (key, value) in &record.extras {
            merged
                .extras
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
    merged
}

fn sum(left: Option<Decimal>, right: Option<Decimal>) -> Option<Decimal> {
    match (left, right) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_core::SecurityId;
    use holdwatch_test_utils::{holding, RecordBuilder};
    use rust_decimal_macros::dec;

    fn snapshot(label: &str, records: Vec<HoldingRecord>) -> Snapshot {
        Snapshot::new(label, records)
    }

    fn tci(as_of: &str, x1_shares: Decimal) -> Vec<HoldingRecord> {
        vec![
            holding("TCI", as_of, "X1").shares(x1_shares).weight(dec!(40)).build(),
            holding("TCI", as_of, "GE").shares(dec!(10)).weight(dec!(60)).build(),
        ]
    }

    #[test]
    fn identical_snapshots_have_no_entries() {
        let a = snapshot("a", tci("2025-03-31", dec!(100)));
        let diff = SnapshotDiffer::default().diff(&a, &a);
        assert!(diff.is_empty());
    }

    #[test]
    fn share_change_reports_only_that_field() {
        let before = snapshot("before", tci("2025-03-31", dec!(100)));
        let after = snapshot("after", tci("2025-06-30", dec!(150)));
        let diff = SnapshotDiffer::default().diff(&before, &after);
        assert_eq!(diff.entries.len(), 1);
        let entry = &diff.entries[0];
        assert_eq!(entry.kind, DiffKind::Changed);
        assert_eq!(entry.key.security, SecurityId::Ticker("X1".into()));
        assert_eq!(entry.changed_fields, vec![HoldingField::Shares]);
        assert_eq!(entry.before.as_ref().unwrap().shares, Some(dec!(100)));
        assert_eq!(entry.after.as_ref().unwrap().shares, Some(dec!(150)));
    }

    #[test]
    fn added_and_removed_are_symmetric() {
        let a = snapshot(
            "a",
            vec![
                holding("ARKK", "2025-09-23", "TSLA").shares(dec!(5)).build(),
                holding("ARKK", "2025-09-23", "ROKU").shares(dec!(7)).build(),
            ],
        );
        let b = snapshot(
            "b",
            vec![
                holding("ARKK", "2025-09-24", "TSLA").shares(dec!(5)).build(),
                RecordBuilder::new("ARKK", "2025-09-24")
                    .cusip("037833100")
                    .shares(dec!(1))
                    .build(),
            ],
        );
        let differ = SnapshotDiffer::default();
        let forward = differ.diff(&a, &b);
        let backward = differ.diff(&b, &a);

        let keys = |diff: &SnapshotDiff, kind: DiffKind| -> Vec<IdentityKey> {
            diff.entries
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| entry.key.clone())
                .collect()
        };
        assert_eq!(keys(&forward, DiffKind::Added), keys(&backward, DiffKind::Removed));
        assert_eq!(keys(&forward, DiffKind::Removed), keys(&backward, DiffKind::Added));
        assert_eq!(
            keys(&forward, DiffKind::Added)[0].security,
            SecurityId::Cusip("037833100".into())
        );
        assert_eq!(forward.count(DiffKind::Changed), 0);
    }

    #[test]
    fn tolerance_and_null_transitions() {
        let before = snapshot(
            "before",
            vec![holding("TCI", "2025-03-31", "X1")
                .shares(dec!(100))
                .weight(dec!(10.0000004))
                .build()],
        );
        let after = snapshot(
            "after",
            vec![holding("TCI", "2025-06-30", "X1")
                .shares(dec!(100.4))
                .weight(dec!(10))
                .market_value(dec!(1000))
                .build()],
        );
        let diff = SnapshotDiffer::new(dec!(0.5)).diff(&before, &after);
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(
            diff.entries[0].changed_fields,
            vec![HoldingField::MarketValueUsd]
        );

        let exact = SnapshotDiffer::default().diff(&before, &after);
        assert_eq!(
            exact.entries[0].changed_fields,
            vec![
                HoldingField::Shares,
                HoldingField::WeightPct,
                HoldingField::MarketValueUsd
            ]
        );
    }

    #[test]
    fn duplicate_lots_merge_independent_of_order() {
        let lot_a = holding("TCI", "2025-06-30", "X1")
            .shares(dec!(60))
            .market_value(dec!(600))
            .extra("lot", "a")
            .build();
        let lot_b = holding("TCI", "2025-06-30", "X1")
            .name("X ONE CORP")
            .shares(dec!(40))
            .build();
        let (forward, _) = index(&[lot_a.clone(), lot_b.clone()]);
        let (reverse, _) = index(&[lot_b, lot_a]);
        assert_eq!(forward, reverse);

        let merged = forward.values().next().unwrap();
        assert_eq!(merged.shares, Some(dec!(100)));
        assert_eq!(merged.market_value_usd, Some(dec!(600)));
        assert_eq!(merged.name.as_deref(), Some("X ONE CORP"));
        assert_eq!(merged.extras.get("lot").map(String::as_str), Some("a"));

        let before = snapshot("before", vec![holding("TCI", "2025-03-31", "X1").shares(dec!(100)).build()]);
        let after = snapshot("after", forward.into_values().collect());
        let diff = SnapshotDiffer::default().diff(&before, &after);
        assert_eq!(diff.entries[0].changed_fields, vec![HoldingField::MarketValueUsd]);
    }

    #[test]
    fn entries_sorted_by_key() {
        let before = snapshot("before", Vec::new());
        let after = snapshot(
            "after",
            vec![
                holding("TCI", "2025-06-30", "ZZ").build(),
                holding("ARKK", "2025-06-30", "MM").build(),
                holding("TCI", "2025-06-30", "AA").build(),
            ],
        );
        let diff = SnapshotDiffer::default().diff(&before, &after);
        let keys: Vec<String> = diff.entries.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["ARKK|ticker:MM", "TCI|ticker:AA", "TCI|ticker:ZZ"]
        );
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let lots = vec![
            holding("TCI", "2025-06-30", "X1").shares(Decimal::MAX).build(),
            holding("TCI", "2025-06-30", "X1").shares(Decimal::MAX).build(),
        ];
        let (merged, _) = index(&lots);
        assert_eq!(merged.values().next().unwrap().shares, Some(Decimal::MAX));

        let before = snapshot("before", vec![holding("TCI", "2025-03-31", "X1").shares(Decimal::MIN).build()]);
        let after = snapshot("after", lots);
        let diff = SnapshotDiffer::default().diff(&before, &after);
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(diff.entries[0].changed_fields, vec![HoldingField::Shares]);
    }
}
