//! Custom assertions for routed query results

use std::collections::HashSet;

use rusqlite::types::Value;
use tiered_archive::Rows;

/// Assert that the `season` column holds exactly `expected` (as a set)
pub fn assert_seasons(rows: &Rows, expected: impl IntoIterator<Item = i64>) {
    let seen: HashSet<i64> = rows.column_i64("season").into_iter().collect();
    let expected: HashSet<i64> = expected.into_iter().collect();
    assert_eq!(seen, expected, "Unexpected seasons in result");
}

/// Assert that no two rows share the same values in `columns`
pub fn assert_unique_by(rows: &Rows, columns: &[&str]) {
    let idx: Vec<usize> = columns
        .iter()
        .map(|c| rows.column_index(c).expect("Key column missing from result"))
        .collect();
    let mut seen = HashSet::new();
    for row in &rows.rows {
        let key: Vec<String> = idx.iter().map(|&i| format!("{:?}", row[i])).collect();
        assert!(seen.insert(key.clone()), "Duplicate key {:?}", key);
    }
}

pub fn int(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        other => panic!("Expected integer, got {:?}", other),
    }
}
