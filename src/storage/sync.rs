// File: src/storage/sync.rs

//! Cold schema synchronization
//!
//! Mirrors table and index definitions of every archivable table from hot into
//! cold. Existing cold objects are compared, never altered: drift aborts the
//! run before any row moves.

use serde::Serialize;

use super::sqlite::schema::{self, normalize_sql, with_if_not_exists, SchemaObject};
use super::sqlite::SqliteStore;
use crate::classification::Classification;
use crate::error::{ArchiveError, ArchiveResult};

/// Outcome of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Objects created in cold by this pass
    pub created: Vec<String>,
    /// Objects that already existed with an identical definition
    pub already_present: usize,
}

/// Bring the cold schema in line with hot for every archivable table
///
/// Returns [`ArchiveError::SchemaMismatch`] without creating anything when a
/// same-named cold object differs from its hot definition.
pub fn synchronize(
    hot: &SqliteStore,
    cold: &SqliteStore,
    classification: &Classification,
) -> ArchiveResult<SyncReport> {
    let hot_objects = collect_hot_objects(hot, classification)?;

    let mut conn = cold.get_conn()?;
    let mut report = SyncReport::default();
    let mut missing: Vec<&SchemaObject> = Vec::new();

    for object in &hot_objects {
        match schema::find_object(&conn, &object.name)? {
            None => missing.push(object),
            Some((kind, sql)) => {
                check_matches(object, &kind, sql.as_deref())?;
                report.already_present += 1;
            }
        }
    }

    if missing.is_empty() {
        tracing::debug!(
            objects = report.already_present,
            "Cold schema already in sync"
        );
        return Ok(report);
    }

    let tx = conn.transaction()?;
    for object in &missing {
        tx.execute_batch(&with_if_not_exists(&object.sql))?;
    }
    tx.commit()?;

    for object in missing {
        tracing::info!(
            table = %object.table,
            object = %object.name,
            kind = object.kind.as_str(),
            "Created object in cold store"
        );
        report.created.push(object.name.clone());
    }

    Ok(report)
}

fn collect_hot_objects(
    hot: &SqliteStore,
    classification: &Classification,
) -> ArchiveResult<Vec<SchemaObject>> {
    let conn = hot.get_conn()?;
    let mut objects = Vec::new();
    for table in classification.archivable_tables() {
        if !schema::table_exists(&conn, table.name())? {
            continue;
        }
        objects.extend(schema::table_objects(&conn, table.name())?);
    }
    Ok(objects)
}

fn check_matches(hot: &SchemaObject, cold_kind: &str, cold_sql: Option<&str>) -> ArchiveResult<()> {
    if cold_kind != hot.kind.as_str() {
        return Err(ArchiveError::SchemaMismatch {
            table: hot.table.clone(),
            object: hot.name.clone(),
            detail: format!(
                "cold has a {} where hot has a {}",
                cold_kind,
                hot.kind.as_str()
            ),
        });
    }

    let cold_sql = cold_sql.unwrap_or_default();
    if normalize_sql(cold_sql) != normalize_sql(&hot.sql) {
        tracing::warn!(
            table = %hot.table,
            object = %hot.name,
            "Cold definition diverges from hot"
        );
        return Err(ArchiveError::SchemaMismatch {
            table: hot.table.clone(),
            object: hot.name.clone(),
            detail: format!("hot: {} / cold: {}", hot.sql, cold_sql),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreRole;

    const HOT_SCHEMA: &str = "
        CREATE TABLE drivers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE race_results (
            season INTEGER NOT NULL,
            round INTEGER NOT NULL,
            driver_id INTEGER NOT NULL REFERENCES drivers(id),
            position INTEGER,
            points REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (season, round, driver_id)
        );
        CREATE INDEX idx_race_results_season ON race_results(season);
        CREATE TRIGGER trg_points AFTER INSERT ON race_results BEGIN SELECT 1; END;
        CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick INTEGER NOT NULL, kind TEXT);
    ";

    fn stores() -> (SqliteStore, SqliteStore) {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        hot.get_conn().unwrap().execute_batch(HOT_SCHEMA).unwrap();
        let cold = SqliteStore::in_memory(StoreRole::Cold).unwrap();
        (hot, cold)
    }

    #[test]
    fn test_creates_archivable_tables_and_indexes_only() {
        let (hot, cold) = stores();
        let report = synchronize(&hot, &cold, &Classification::simulation()).unwrap();

        assert_eq!(report.already_present, 0);
        assert!(report.created.contains(&"race_results".to_string()));
        assert!(report.created.contains(&"idx_race_results_season".to_string()));
        assert!(report.created.contains(&"event_log".to_string()));

        let conn = cold.get_conn().unwrap();
        assert!(!schema::table_exists(&conn, "drivers").unwrap());
        assert!(schema::find_object(&conn, "trg_points").unwrap().is_none());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let first = synchronize(&hot, &cold, &classification).unwrap();
        let second = synchronize(&hot, &cold, &classification).unwrap();

        assert!(second.created.is_empty());
        assert_eq!(second.already_present, first.created.len());
    }

    #[test]
    fn test_new_hot_index_is_mirrored() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        synchronize(&hot, &cold, &classification).unwrap();

        hot.get_conn()
            .unwrap()
            .execute_batch("CREATE INDEX idx_event_log_tick ON event_log(tick);")
            .unwrap();
        let report = synchronize(&hot, &cold, &classification).unwrap();
        assert_eq!(report.created, vec!["idx_event_log_tick".to_string()]);
    }

    #[test]
    fn test_drift_is_schema_mismatch() {
        let (hot, cold) = stores();
        cold.get_conn()
            .unwrap()
            .execute_batch("CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick TEXT);")
            .unwrap();

        let err = synchronize(&hot, &cold, &Classification::simulation()).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ArchiveError::SchemaMismatch { ref table, .. } if table == "event_log"
        ));

        // Nothing was created before the drift was detected
        let conn = cold.get_conn().unwrap();
        assert!(!schema::table_exists(&conn, "race_results").unwrap());
    }

    #[test]
    fn test_layout_differences_are_not_drift() {
        let (hot, cold) = stores();
        cold.get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TABLE event_log (id   INTEGER PRIMARY KEY,
                     tick INTEGER NOT NULL,   kind TEXT);",
            )
            .unwrap();
        let report = synchronize(&hot, &cold, &Classification::simulation()).unwrap();
        assert_eq!(report.already_present, 1);
    }
}
