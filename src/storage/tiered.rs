// File: src/storage/tiered.rs

//! Hot/cold store pair
//!
//! One hot handle and at most one cold handle. The cold handle is opened at
//! construction if the cold file already exists; otherwise the first archival
//! run creates it. Inspection, restoration and queries never create it.

use std::path::Path;

use rusqlite::types::Value;

use super::sqlite::{SqliteConfig, SqliteStore, StoreRole};
use super::sync::synchronize;
use crate::archival::{self, ArchivePlan, CounterSource, RunReport, Selections};
use crate::classification::Classification;
use crate::config::ArchivalPolicy;
use crate::error::{ArchiveError, ArchiveResult};
use crate::inspector::{self, StoreStats};
use crate::query::{QueryRouter, Rows};
use crate::restore::{self, RestoreSelector};

pub struct TieredStore {
    hot: SqliteStore,
    cold: Option<SqliteStore>,
    cold_config: SqliteConfig,
    classification: Classification,
    policy: ArchivalPolicy,
}

impl TieredStore {
    /// Open an existing hot store at `path` with default connection settings
    pub fn open(
        path: impl AsRef<Path>,
        classification: Classification,
        policy: ArchivalPolicy,
    ) -> ArchiveResult<Self> {
        Self::with_config(SqliteConfig::new(path.as_ref()), classification, policy)
    }

    /// Open an existing hot store described by `hot_config`
    pub fn with_config(
        hot_config: SqliteConfig,
        classification: Classification,
        policy: ArchivalPolicy,
    ) -> ArchiveResult<Self> {
        policy.validate()?;

        let cold_config = hot_config.cold_companion();
        let hot = SqliteStore::open_existing(hot_config, StoreRole::Hot)?;
        let cold = if cold_config.path.exists() {
            Some(SqliteStore::open_existing(cold_config.clone(), StoreRole::Cold)?)
        } else {
            None
        };

        tracing::debug!(
            hot = %hot.path().display(),
            cold = %cold_config.path.display(),
            cold_present = cold.is_some(),
            "Opened tiered store"
        );

        Ok(Self {
            hot,
            cold,
            cold_config,
            classification,
            policy,
        })
    }

    pub fn hot(&self) -> &SqliteStore {
        &self.hot
    }

    pub fn cold(&self) -> Option<&SqliteStore> {
        self.cold.as_ref()
    }

    pub fn cold_path(&self) -> &Path {
        &self.cold_config.path
    }

    pub fn has_cold_store(&self) -> bool {
        self.cold.is_some()
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn policy(&self) -> &ArchivalPolicy {
        &self.policy
    }

    fn selections(&self, counters: &dyn CounterSource) -> ArchiveResult<Selections> {
        let counters = counters.counters(&self.hot, &self.classification)?;
        let present = self.hot.table_names()?;
        archival::evaluate(counters, &self.policy, &self.classification, &present)
    }

    /// Candidate counts for a run with these counters; writes nothing
    pub fn plan_archive(&self, counters: &dyn CounterSource) -> ArchiveResult<ArchivePlan> {
        let selections = self.selections(counters)?;
        archival::plan(&self.hot, &selections)
    }

    /// Evaluate, synchronize the cold schema, then move eligible rows
    ///
    /// Configuration and schema errors abort before any row moves. Per-table
    /// failures are recorded in the returned report.
    pub fn archive(&mut self, counters: &dyn CounterSource) -> ArchiveResult<RunReport> {
        let selections = self.selections(counters)?;

        if self.cold.is_none() {
            tracing::info!(path = %self.cold_config.path.display(), "Creating cold store");
            self.cold = Some(SqliteStore::open(self.cold_config.clone(), StoreRole::Cold)?);
        }
        let cold = self
            .cold
            .as_ref()
            .ok_or_else(|| ArchiveError::Internal("cold store not open".into()))?;

        synchronize(&self.hot, cold, &self.classification)?;

        let report = archival::run(&self.hot, cold, &selections, &self.policy);
        report.log_summary();
        Ok(report)
    }

    pub fn stats(&self) -> ArchiveResult<StoreStats> {
        inspector::stats(&self.hot, self.cold.as_ref(), &self.policy)
    }

    /// Copy an archived slice back into hot
    pub fn restore(&self, table: &str, selector: &RestoreSelector) -> ArchiveResult<u64> {
        match &self.cold {
            Some(cold) => restore::restore(&self.hot, cold, &self.classification, table, selector),
            None => Err(ArchiveError::NotFound {
                table: table.to_string(),
                selector: selector.to_string(),
            }),
        }
    }

    pub fn query(&self, sql: &str, params: &[Value], federate: bool) -> ArchiveResult<Rows> {
        QueryRouter::new(&self.hot, self.cold.as_ref(), &self.classification)
            .query(sql, params, federate)
    }

    pub fn federated_query(&self, sql: &str, params: &[Value]) -> ArchiveResult<Rows> {
        self.query(sql, params, true)
    }

    /// Drop both handles
    pub fn close(self) {
        tracing::debug!(hot = %self.hot.path().display(), "Closing tiered store");
    }
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("hot", &self.hot)
            .field("cold", &self.cold)
            .field("policy", &self.policy)
            .finish()
    }
}
