//! Row movement between stores
//!
//! No function here holds two store locks at once: rows are read from the
//! source, the source lock is released, then rows are written to the target.

use rusqlite::types::Value;
use rusqlite::params_from_iter;

use super::sqlite::SqliteStore;
use crate::classification::quote_ident;
use crate::error::{ArchiveError, ArchiveResult};
use crate::query::Rows;

/// A WHERE clause plus its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    clause: String,
    params: Vec<Value>,
}

impl RowFilter {
    pub fn new(clause: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }

    /// Matches every row
    pub fn all() -> Self {
        Self::new("1", Vec::new())
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

pub(crate) fn count_rows(store: &SqliteStore, table: &str, filter: &RowFilter) -> ArchiveResult<u64> {
    let conn = store.get_conn()?;
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        quote_ident(table),
        filter.clause
    );
    let count: i64 = conn.query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))?;
    Ok(count as u64)
}

/// Insert-or-replace every matching `src` row into the same table in `dst`
///
/// Returns the number of rows written. Replace semantics keep the copy safe
/// to repeat after an interrupted run.
pub(crate) fn copy_rows(
    src: &SqliteStore,
    dst: &SqliteStore,
    table: &str,
    filter: &RowFilter,
) -> ArchiveResult<u64> {
    let rows = read_rows(src, table, filter)?;
    write_rows(dst, table, &rows)
}

/// Insert-or-replace `rows` into `table` in one transaction
///
/// Returns the number of rows the store reports as written, which is lower
/// than `rows.len()` when a trigger ignores some of them.
pub(crate) fn write_rows(dst: &SqliteStore, table: &str, rows: &Rows) -> ArchiveResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let column_list = rows
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=rows.columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list,
        placeholders
    );

    let mut conn = dst.get_conn()?;
    let tx = conn.transaction()?;
    let mut written = 0u64;
    {
        let mut stmt = tx.prepare(&insert)?;
        for row in &rows.rows {
            written += stmt.execute(params_from_iter(row.iter()))? as u64;
        }
    }
    tx.commit()?;

    Ok(written)
}

/// How many of `rows` exist in `store` with every column value intact
pub(crate) fn count_present(store: &SqliteStore, table: &str, rows: &Rows) -> ArchiveResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let conditions = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} IS ?{}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
        quote_ident(table),
        conditions
    );

    let conn = store.get_conn()?;
    let mut stmt = conn.prepare(&sql)?;
    let mut present = 0u64;
    for row in &rows.rows {
        let found: bool = stmt.query_row(params_from_iter(row.iter()), |r| r.get(0))?;
        if found {
            present += 1;
        }
    }
    Ok(present)
}

/// Delete matching rows inside one transaction
///
/// Rolls back and fails if more than `expected_max` rows would go, so a
/// row that was never verified in the other store cannot be removed.
pub(crate) fn delete_rows(
    store: &SqliteStore,
    table: &str,
    filter: &RowFilter,
    expected_max: u64,
) -> ArchiveResult<u64> {
    let mut conn = store.get_conn()?;
    let tx = conn.transaction()?;
    let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), filter.clause);
    let deleted = tx.execute(&sql, params_from_iter(filter.params.iter()))? as u64;

    if deleted > expected_max {
        tx.rollback()?;
        return Err(ArchiveError::ArchivalVerification {
            table: table.to_string(),
            candidates: deleted,
            verified: expected_max,
        });
    }

    tx.commit()?;
    Ok(deleted)
}

/// Every matching row, with the table's column names
pub(crate) fn read_rows(store: &SqliteStore, table: &str, filter: &RowFilter) -> ArchiveResult<Rows> {
    let conn = store.get_conn()?;
    let sql = format!(
        "SELECT * FROM {} WHERE {}",
        quote_ident(table),
        filter.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(filter.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(values);
    }
    Ok(Rows { columns, rows: out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreRole;

    const SCHEMA: &str = "CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick INTEGER NOT NULL, kind TEXT);";

    fn pair() -> (SqliteStore, SqliteStore) {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        let cold = SqliteStore::in_memory(StoreRole::Cold).unwrap();
        hot.get_conn().unwrap().execute_batch(SCHEMA).unwrap();
        cold.get_conn().unwrap().execute_batch(SCHEMA).unwrap();
        {
            let conn = hot.get_conn().unwrap();
            for i in 1..=10 {
                conn.execute(
                    "INSERT INTO event_log (id, tick, kind) VALUES (?1, ?2, 'overtake')",
                    rusqlite::params![i, i * 100],
                )
                .unwrap();
            }
        }
        (hot, cold)
    }

    fn below(tick: i64) -> RowFilter {
        RowFilter::new("\"tick\" < ?1", vec![Value::Integer(tick)])
    }

    #[test]
    fn test_copy_is_repeatable() {
        let (hot, cold) = pair();
        assert_eq!(copy_rows(&hot, &cold, "event_log", &below(500)).unwrap(), 4);
        assert_eq!(copy_rows(&hot, &cold, "event_log", &below(500)).unwrap(), 4);
        assert_eq!(cold.row_count("event_log").unwrap(), 4);
        assert_eq!(hot.row_count("event_log").unwrap(), 10);
    }

    #[test]
    fn test_count_rows_with_filter() {
        let (hot, _cold) = pair();
        assert_eq!(count_rows(&hot, "event_log", &below(500)).unwrap(), 4);
        assert_eq!(count_rows(&hot, "event_log", &RowFilter::all()).unwrap(), 10);
    }

    #[test]
    fn test_count_present_compares_whole_rows() {
        let (hot, cold) = pair();
        let rows = read_rows(&hot, "event_log", &below(500)).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(count_present(&cold, "event_log", &rows).unwrap(), 0);

        write_rows(&cold, "event_log", &rows).unwrap();
        assert_eq!(count_present(&cold, "event_log", &rows).unwrap(), 4);

        // same key, different payload
        cold.get_conn()
            .unwrap()
            .execute("UPDATE event_log SET kind = 'pit' WHERE id = 2", [])
            .unwrap();
        assert_eq!(count_present(&cold, "event_log", &rows).unwrap(), 3);
    }

    #[test]
    fn test_write_rows_reports_ignored_inserts() {
        let (hot, cold) = pair();
        cold.get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER drop_early BEFORE INSERT ON event_log WHEN NEW.tick < 300
                 BEGIN SELECT RAISE(IGNORE); END;",
            )
            .unwrap();
        let rows = read_rows(&hot, "event_log", &below(500)).unwrap();
        assert_eq!(write_rows(&cold, "event_log", &rows).unwrap(), 2);
        assert_eq!(cold.row_count("event_log").unwrap(), 2);
    }

    #[test]
    fn test_delete_rows_within_bound() {
        let (hot, _cold) = pair();
        assert_eq!(delete_rows(&hot, "event_log", &below(500), 4).unwrap(), 4);
        assert_eq!(hot.row_count("event_log").unwrap(), 6);
    }

    #[test]
    fn test_delete_rows_rolls_back_over_bound() {
        let (hot, _cold) = pair();
        let err = delete_rows(&hot, "event_log", &below(500), 3).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ArchivalVerification {
                candidates: 4,
                verified: 3,
                ..
            }
        ));
        assert_eq!(hot.row_count("event_log").unwrap(), 10);
    }
}
