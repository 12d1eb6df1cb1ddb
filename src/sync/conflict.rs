// ABOUTME: Snapshot comparison for conflict detection
// ABOUTME: Rows are keyed by canonical primary-key JSON and compared column by column

use std::collections::BTreeMap;

use crate::value::{values_equal, Row, Value};

/// One row image, column name to normalized value.
pub type RowImage = BTreeMap<String, Value>;

/// Every row of a table keyed by canonical primary key.
pub type Snapshot = BTreeMap<String, RowImage>;

/// A key present on both sides whose rows differ.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub primary_key: String,
    pub source: RowImage,
    pub target: RowImage,
}

fn lookup<'a>(row: &'a RowImage, column: &str) -> Option<&'a Value> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

/// Sorted-key JSON of the primary-key columns.
///
/// Returns `None` when a key column is missing from the row.
pub fn primary_key_value(row: &RowImage, primary_key_columns: &[String]) -> Option<String> {
    let mut key = BTreeMap::new();
    for column in primary_key_columns {
        key.insert(column.as_str(), lookup(row, column)?.to_json());
    }
    serde_json::to_string(&key).ok()
}

/// Sorted-key JSON of a whole row, as stored in conflict records.
pub fn row_json(row: &RowImage) -> String {
    let json: BTreeMap<&str, serde_json::Value> = row
        .iter()
        .map(|(column, value)| (column.as_str(), value.to_json()))
        .collect();
    serde_json::to_string(&json).unwrap_or_else(|_| "{}".to_string())
}

/// True when both rows have the same columns and every value is equal.
pub fn compare_rows(a: &RowImage, b: &RowImage) -> bool {
    a.len() == b.len()
        && a.iter().all(|(column, value)| {
            lookup(b, column)
                .map(|other| values_equal(value, other))
                .unwrap_or(false)
        })
}

/// Add normalized rows to a snapshot. Rows without a full key are dropped.
pub fn extend_snapshot(
    snapshot: &mut Snapshot,
    rows: impl IntoIterator<Item = Row>,
    primary_key_columns: &[String],
) {
    for row in rows {
        let image = row.normalized().to_map();
        if let Some(key) = primary_key_value(&image, primary_key_columns) {
            snapshot.insert(key, image);
        }
    }
}

/// Keys present on both sides whose rows are not equal, in key order.
///
/// Keys that exist on only one side are ignored.
pub fn detect(source: &Snapshot, target: &Snapshot) -> Vec<Divergence> {
    source
        .iter()
        .filter_map(|(key, source_row)| {
            let target_row = target.get(key)?;
            if compare_rows(source_row, target_row) {
                None
            } else {
                Some(Divergence {
                    primary_key: key.clone(),
                    source: source_row.clone(),
                    target: target_row.clone(),
                })
            }
        })
        .collect()
}
