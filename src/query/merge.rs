// File: src/query/merge.rs

//! Merging hot and cold result sets

use std::cmp::Ordering;
use std::collections::HashSet;

use rusqlite::types::Value;

use super::plan::{OrderKey, OrderTerm};
use super::rows::Rows;
use crate::error::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Integer(i64),
    Real(u64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Integer(i) => KeyPart::Integer(*i),
            Value::Real(f) => KeyPart::Real(f.to_bits()),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Blob(b) => KeyPart::Blob(b.clone()),
        }
    }
}

fn row_key(row: &[Value], key_columns: &[usize]) -> Vec<KeyPart> {
    key_columns
        .iter()
        .filter_map(|&i| row.get(i))
        .map(KeyPart::from)
        .collect()
}

/// Union hot and cold rows, dropping cold rows whose key is already in hot
///
/// `key_columns` are result positions of the primary key. Without them no
/// row identity is known, so every cold row is kept. Hot rows are never
/// dropped.
pub(crate) fn merge(hot: Rows, cold: Rows, key_columns: &[usize]) -> ArchiveResult<Rows> {
    if hot.columns.len() != cold.columns.len() {
        return Err(ArchiveError::Internal(format!(
            "hot returned {} columns, cold returned {}",
            hot.columns.len(),
            cold.columns.len()
        )));
    }

    let Rows { columns, mut rows } = hot;
    let before = rows.len();

    if key_columns.is_empty() {
        rows.extend(cold.rows);
        tracing::debug!(
            hot = before,
            cold = rows.len() - before,
            "Appended federated results without a key"
        );
        return Ok(Rows { columns, rows });
    }

    let seen: HashSet<Vec<KeyPart>> = rows.iter().map(|r| row_key(r, key_columns)).collect();
    let mut shadowed = 0usize;
    for row in cold.rows {
        if seen.contains(&row_key(&row, key_columns)) {
            shadowed += 1;
        } else {
            rows.push(row);
        }
    }

    tracing::debug!(
        hot = before,
        cold = rows.len() - before,
        shadowed,
        "Merged federated results"
    );
    Ok(Rows { columns, rows })
}

/// Sort rows by the statement's ORDER BY
///
/// `hidden` is the number of trailing sort-only columns that
/// [`OrderKey::Hidden`] indexes into.
pub(crate) fn sort_rows(rows: &mut Rows, terms: &[OrderTerm], hidden: usize) -> ArchiveResult<()> {
    let width = rows.columns.len();
    let resolved = terms
        .iter()
        .map(|term| {
            let idx = match &term.key {
                OrderKey::Position(p) => p.checked_sub(1).filter(|i| *i < width),
                OrderKey::Name(name) => rows.column_index(name),
                OrderKey::Hidden(k) => (*k < hidden && hidden <= width).then(|| width - hidden + k),
            };
            idx.map(|i| (i, term)).ok_or_else(|| {
                ArchiveError::Internal(format!("ORDER BY {:?} matches no result column", term.key))
            })
        })
        .collect::<ArchiveResult<Vec<(usize, &OrderTerm)>>>()?;

    rows.rows.sort_by(|a, b| {
        for (idx, term) in &resolved {
            let ord = compare_term(&a[*idx], &b[*idx], term);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn compare_term(a: &Value, b: &Value, term: &OrderTerm) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) if term.nulls_first => Ordering::Less,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) if term.nulls_first => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ if term.descending => compare_values(b, a),
        _ => compare_values(a, b),
    }
}

/// SQLite storage-class order: NULL < numbers < text < blob
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }

    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Integer(x), Value::Real(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Real(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
