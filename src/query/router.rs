// File: src/query/router.rs

use rusqlite::types::Value;

use super::merge::{merge, sort_rows};
use super::plan::FederatedQueryPlan;
use super::rows::Rows;
use crate::classification::Classification;
use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::SqliteStore;

/// Routes read-only statements to hot, or to hot and cold with a merge
///
/// Reads never block on each other or on an archival run; rows caught in
/// flight between stores are resolved by the hot-wins merge.
pub struct QueryRouter<'a> {
    hot: &'a SqliteStore,
    cold: Option<&'a SqliteStore>,
    classification: &'a Classification,
}

impl<'a> QueryRouter<'a> {
    pub fn new(
        hot: &'a SqliteStore,
        cold: Option<&'a SqliteStore>,
        classification: &'a Classification,
    ) -> Self {
        Self {
            hot,
            cold,
            classification,
        }
    }

    pub fn plan(&self, sql: &str, params: &[Value], federate: bool) -> ArchiveResult<FederatedQueryPlan> {
        FederatedQueryPlan::build(sql, params, self.classification, federate)
    }

    /// Run `sql` against hot, or against both stores when `federate` is set,
    /// a cold store exists, and the statement reads an archivable table
    pub fn query(&self, sql: &str, params: &[Value], federate: bool) -> ArchiveResult<Rows> {
        let plan = self.plan(sql, params, federate)?;

        let cold = match self.cold {
            Some(cold) if plan.requires_cold => cold,
            _ => {
                tracing::debug!(
                    federate,
                    has_cold = self.cold.is_some(),
                    tables = ?plan.source_tables,
                    "Routing query to hot store"
                );
                return self.hot.query_rows(&plan.sql_text, &plan.params);
            }
        };

        for table in &plan.source_tables {
            if !cold.has_table(table)? {
                return Err(ArchiveError::Federation {
                    table: table.clone(),
                });
            }
        }

        let sql = plan.federated_sql();
        let hot_rows = self.hot.query_rows(sql, plan.federated_params())?;
        let cold_rows = cold.query_rows(sql, plan.federated_params())?;

        let key_columns = self.key_columns(&plan, &hot_rows);
        let mut rows = merge(hot_rows, cold_rows, &key_columns)?;

        if !plan.order_by.is_empty() {
            sort_rows(&mut rows, &plan.order_by, plan.hidden_columns)?;
        }
        if let Some(limit) = plan.limit {
            rows.rows = limit.apply(rows.rows);
        }
        if plan.hidden_columns > 0 {
            let width = rows.columns.len().saturating_sub(plan.hidden_columns);
            rows.columns.truncate(width);
            for row in &mut rows.rows {
                row.truncate(width);
            }
        }

        tracing::debug!(
            tables = ?plan.source_tables,
            rows = rows.len(),
            keyed = !key_columns.is_empty(),
            hidden = plan.hidden_columns,
            "Federated query complete"
        );
        Ok(rows)
    }

    /// Result positions of the key table's primary key, or empty when the
    /// result doesn't project all of it (the merge then keeps every row)
    fn key_columns(&self, plan: &FederatedQueryPlan, rows: &Rows) -> Vec<usize> {
        let Some(table) = plan.key_table(self.classification) else {
            return Vec::new();
        };
        table
            .primary_key()
            .iter()
            .map(|column| rows.column_index(column))
            .collect::<Option<Vec<usize>>>()
            .unwrap_or_default()
    }
}

/// Route one statement
pub fn query(
    hot: &SqliteStore,
    cold: Option<&SqliteStore>,
    classification: &Classification,
    sql: &str,
    params: &[Value],
    federate: bool,
) -> ArchiveResult<Rows> {
    QueryRouter::new(hot, cold, classification).query(sql, params, federate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{synchronize, StoreRole};

    fn stores() -> (SqliteStore, SqliteStore) {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        hot.get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TABLE drivers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 CREATE TABLE race_results (
                     season INTEGER NOT NULL, round INTEGER NOT NULL, driver_id INTEGER NOT NULL,
                     points REAL, PRIMARY KEY (season, round, driver_id));
                 INSERT INTO drivers VALUES (1, 'Ada'), (2, 'Brook');
                 INSERT INTO race_results VALUES (8, 1, 1, 25), (8, 1, 2, 18), (9, 1, 1, 18);",
            )
            .unwrap();
        let cold = SqliteStore::in_memory(StoreRole::Cold).unwrap();
        synchronize(&hot, &cold, &Classification::simulation()).unwrap();
        cold.get_conn()
            .unwrap()
            .execute_batch(
                "INSERT INTO race_results VALUES (7, 1, 1, 10), (7, 1, 2, 12), (8, 1, 1, 99);",
            )
            .unwrap();
        (hot, cold)
    }

    #[test]
    fn test_hot_only_without_federation() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router.query("SELECT * FROM race_results", &[], false).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_federated_merge_prefers_hot() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router
            .query(
                "SELECT season, round, driver_id, points FROM race_results ORDER BY season, driver_id",
                &[],
                true,
            )
            .unwrap();

        assert_eq!(rows.column_i64("season"), vec![7, 7, 8, 8, 9]);
        // (8, 1, 1) exists in both; hot's 25 points win over cold's 99
        assert_eq!(rows.rows[2][3], Value::Real(25.0));
    }

    #[test]
    fn test_federated_limit_applies_after_merge() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router
            .query(
                "SELECT * FROM race_results ORDER BY points DESC LIMIT 2",
                &[],
                true,
            )
            .unwrap();
        let points: Vec<&Value> = rows.column("points").unwrap();
        assert_eq!(points, vec![&Value::Real(25.0), &Value::Real(18.0)]);
    }

    #[test]
    fn test_always_hot_query_skips_cold() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router.query("SELECT name FROM drivers", &[], true).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_join_with_hot_only_table_is_federation_error() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let err = router
            .query(
                "SELECT r.*, d.name FROM race_results r JOIN drivers d ON d.id = r.driver_id",
                &[],
                true,
            )
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Federation { ref table } if table == "drivers"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_no_cold_store_matches_hot_only() {
        let (hot, _cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, None, &classification);
        let sql = "SELECT * FROM race_results WHERE season >= ?1 ORDER BY season";
        let params = [Value::Integer(8)];
        assert_eq!(
            router.query(sql, &params, true).unwrap(),
            router.query(sql, &params, false).unwrap()
        );
    }

    #[test]
    fn test_projection_without_key_keeps_cold_rows() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        // (8, 1, 1) is in both stores; without the key columns both rows stay
        let rows = router
            .query("SELECT driver_id FROM race_results WHERE driver_id = 1", &[], true)
            .unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_parameter_limit_applies_after_merge() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router
            .query(
                "SELECT season, driver_id FROM race_results WHERE season >= ?1 ORDER BY season LIMIT ?2",
                &[Value::Integer(7), Value::Integer(3)],
                true,
            )
            .unwrap();
        assert_eq!(rows.column_i64("season"), vec![7, 7, 8]);
    }

    #[test]
    fn test_order_by_expression_outside_result() {
        let (hot, cold) = stores();
        let classification = Classification::simulation();
        let router = QueryRouter::new(&hot, Some(&cold), &classification);
        let rows = router
            .query(
                "SELECT season, round, driver_id FROM race_results ORDER BY points * -1, season",
                &[],
                true,
            )
            .unwrap();
        assert_eq!(rows.columns, vec!["season", "round", "driver_id"]);
        // points: (8,1,1)=25 (8,1,2)=18 (9,1,1)=18 (7,1,2)=12 (7,1,1)=10
        assert_eq!(rows.column_i64("season"), vec![8, 8, 9, 7, 7]);
        assert_eq!(rows.column_i64("driver_id"), vec![1, 2, 1, 2, 1]);
    }
}
