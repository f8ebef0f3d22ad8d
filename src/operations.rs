//! Path-level entry points
//!
//! Each call opens the store pair at `store_path`, does one thing, and closes
//! it again. These back the CLI subcommands one-to-one.

use std::path::Path;

use rusqlite::types::Value;

use crate::archival::{ArchivePlan, CounterSource, DerivedCounters, RunReport};
use crate::config::Config;
use crate::error::ArchiveResult;
use crate::inspector::StoreStats;
use crate::query::Rows;
use crate::restore::RestoreSelector;
use crate::storage::{cold_path_for, TieredStore};

fn open(store_path: &Path, config: &Config) -> ArchiveResult<TieredStore> {
    TieredStore::open(store_path, config.classification.clone(), config.policy.clone())
}

/// Archive with counters derived from the hot data
pub fn archive(store_path: &Path, config: &Config) -> ArchiveResult<RunReport> {
    archive_with_counters(store_path, config, &DerivedCounters)
}

/// Archive with counters supplied by the caller
///
/// The report is appended to `config.report_log_path` when one is set.
pub fn archive_with_counters(
    store_path: &Path,
    config: &Config,
    counters: &dyn CounterSource,
) -> ArchiveResult<RunReport> {
    let mut store = open(store_path, config)?;
    let report = store.archive(counters)?;
    store.close();

    if let Some(log_path) = &config.report_log_path {
        report.append_to_log(log_path)?;
        tracing::debug!(path = %log_path.display(), "Appended run report");
    }
    Ok(report)
}

pub fn plan_archive(
    store_path: &Path,
    config: &Config,
    counters: &dyn CounterSource,
) -> ArchiveResult<ArchivePlan> {
    open(store_path, config)?.plan_archive(counters)
}

pub fn stats(store_path: &Path, config: &Config) -> ArchiveResult<StoreStats> {
    open(store_path, config)?.stats()
}

pub fn restore(
    store_path: &Path,
    config: &Config,
    table: &str,
    selector: &RestoreSelector,
) -> ArchiveResult<u64> {
    open(store_path, config)?.restore(table, selector)
}

pub fn federated_query(
    store_path: &Path,
    config: &Config,
    sql: &str,
    params: &[Value],
) -> ArchiveResult<Rows> {
    query(store_path, config, sql, params, true)
}

pub fn query(
    store_path: &Path,
    config: &Config,
    sql: &str,
    params: &[Value],
    federate: bool,
) -> ArchiveResult<Rows> {
    open(store_path, config)?.query(sql, params, federate)
}

/// Whether the cold companion of `store_path` exists (never creates it)
pub fn has_cold_store(store_path: &Path) -> bool {
    cold_path_for(store_path).exists()
}
