//! Store inspection
//!
//! Read-only. Works from whatever handles already exist and never opens or
//! creates a cold store.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ArchivalPolicy;
use crate::error::ArchiveResult;
use crate::storage::SqliteStore;

/// Row counts of one table; `None` where the table is absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub hot: Option<u64>,
    pub cold: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hot_size_bytes: u64,
    pub cold_size_bytes: Option<u64>,
    pub per_table_row_counts: BTreeMap<String, TableCounts>,
    pub size_threshold_bytes: u64,
    pub archival_recommended: bool,
}

pub fn stats(
    hot: &SqliteStore,
    cold: Option<&SqliteStore>,
    policy: &ArchivalPolicy,
) -> ArchiveResult<StoreStats> {
    let hot_size_bytes = hot.size_bytes()?;
    let mut per_table: BTreeMap<String, TableCounts> = BTreeMap::new();

    for table in hot.table_names()? {
        let count = hot.row_count(&table)?;
        per_table.entry(table).or_default().hot = Some(count);
    }

    let cold_size_bytes = match cold {
        Some(cold) => {
            for table in cold.table_names()? {
                let count = cold.row_count(&table)?;
                per_table.entry(table).or_default().cold = Some(count);
            }
            Some(cold.size_bytes()?)
        }
        None => None,
    };

    let archival_recommended = hot_size_bytes >= policy.size_threshold_bytes;
    tracing::debug!(
        hot_size_bytes,
        cold_size_bytes = ?cold_size_bytes,
        tables = per_table.len(),
        archival_recommended,
        "Collected store stats"
    );

    Ok(StoreStats {
        hot_size_bytes,
        cold_size_bytes,
        per_table_row_counts: per_table,
        size_threshold_bytes: policy.size_threshold_bytes,
        archival_recommended,
    })
}
