// File: src/archival/counters.rs

//! Simulation counters read at archival time

use serde::Serialize;

use crate::classification::{quote_ident, Classification, Eligibility};
use crate::error::ArchiveResult;
use crate::storage::SqliteStore;

/// Current epoch (season) and sequence (tick) of the simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub epoch: i64,
    pub sequence: i64,
}

impl Counters {
    pub fn new(epoch: i64, sequence: i64) -> Self {
        Self { epoch, sequence }
    }
}

/// Where the archival run gets its counters from
///
/// The simulation normally supplies them; when it isn't running they can be
/// derived from the data already in the hot store.
pub trait CounterSource {
    fn counters(&self, hot: &SqliteStore, classification: &Classification) -> ArchiveResult<Counters>;
}

/// Counters handed over by the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCounters(pub Counters);

impl FixedCounters {
    pub fn new(epoch: i64, sequence: i64) -> Self {
        Self(Counters::new(epoch, sequence))
    }
}

impl CounterSource for FixedCounters {
    fn counters(&self, _hot: &SqliteStore, _classification: &Classification) -> ArchiveResult<Counters> {
        Ok(self.0)
    }
}

/// Host-supplied values where given, derived from hot data otherwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialCounters {
    pub epoch: Option<i64>,
    pub sequence: Option<i64>,
}

impl PartialCounters {
    pub fn new(epoch: Option<i64>, sequence: Option<i64>) -> Self {
        Self { epoch, sequence }
    }
}

impl CounterSource for PartialCounters {
    fn counters(&self, hot: &SqliteStore, classification: &Classification) -> ArchiveResult<Counters> {
        if let (Some(epoch), Some(sequence)) = (self.epoch, self.sequence) {
            return Ok(Counters::new(epoch, sequence));
        }
        let derived = DerivedCounters.counters(hot, classification)?;
        Ok(Counters::new(
            self.epoch.unwrap_or(derived.epoch),
            self.sequence.unwrap_or(derived.sequence),
        ))
    }
}

/// Highest epoch/sequence value found in the classified hot tables (0 if none)
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedCounters;

impl CounterSource for DerivedCounters {
    fn counters(&self, hot: &SqliteStore, classification: &Classification) -> ArchiveResult<Counters> {
        let mut counters = Counters::default();

        for table in classification.archivable_tables() {
            if !hot.has_table(table.name())? {
                continue;
            }
            let sql = format!(
                "SELECT MAX({}) FROM {}",
                quote_ident(table.eligibility_column()),
                quote_ident(table.name())
            );
            let max: Option<i64> = {
                let conn = hot.get_conn()?;
                conn.query_row(&sql, [], |row| row.get(0))?
            };
            let Some(max) = max else { continue };

            match table.eligibility() {
                Eligibility::Epoch => counters.epoch = counters.epoch.max(max),
                Eligibility::Sequence => counters.sequence = counters.sequence.max(max),
            }
        }

        tracing::debug!(
            epoch = counters.epoch,
            sequence = counters.sequence,
            "Derived counters from hot store"
        );
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreRole;

    #[test]
    fn test_fixed_counters() {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        let counters = FixedCounters::new(9, 1200)
            .counters(&hot, &Classification::simulation())
            .unwrap();
        assert_eq!(counters, Counters::new(9, 1200));
    }

    #[test]
    fn test_derived_counters_use_max_values() {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        hot.get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TABLE race_results (season INTEGER, round INTEGER, driver_id INTEGER,
                     PRIMARY KEY (season, round, driver_id));
                 CREATE TABLE transactions (id INTEGER PRIMARY KEY, season INTEGER);
                 CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick INTEGER);
                 INSERT INTO race_results VALUES (7, 1, 1), (8, 1, 1);
                 INSERT INTO transactions VALUES (1, 9);
                 INSERT INTO event_log VALUES (1, 40), (2, 512);",
            )
            .unwrap();

        let counters = DerivedCounters
            .counters(&hot, &Classification::simulation())
            .unwrap();
        assert_eq!(counters, Counters::new(9, 512));
    }

    #[test]
    fn test_partial_counters_fill_gaps_from_hot() {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        hot.get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TABLE race_results (season INTEGER, round INTEGER, driver_id INTEGER,
                     PRIMARY KEY (season, round, driver_id));
                 CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick INTEGER);
                 INSERT INTO race_results VALUES (4, 1, 1);
                 INSERT INTO event_log VALUES (1, 75);",
            )
            .unwrap();
        let classification = Classification::simulation();

        let only_epoch = PartialCounters::new(Some(12), None)
            .counters(&hot, &classification)
            .unwrap();
        assert_eq!(only_epoch, Counters::new(12, 75));

        let only_sequence = PartialCounters::new(None, Some(900))
            .counters(&hot, &classification)
            .unwrap();
        assert_eq!(only_sequence, Counters::new(4, 900));

        let neither = PartialCounters::default().counters(&hot, &classification).unwrap();
        assert_eq!(neither, Counters::new(4, 75));
    }

    #[test]
    fn test_derived_counters_default_to_zero() {
        let hot = SqliteStore::in_memory(StoreRole::Hot).unwrap();
        hot.get_conn()
            .unwrap()
            .execute_batch("CREATE TABLE event_log (id INTEGER PRIMARY KEY, tick INTEGER);")
            .unwrap();
        let counters = DerivedCounters
            .counters(&hot, &Classification::simulation())
            .unwrap();
        assert_eq!(counters, Counters::default());
    }
}
