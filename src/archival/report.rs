// File: src/archival/report.rs

//! Run reports and dry-run plans
//!
//! Reports go to the operator log (tracing, optionally a JSON-lines file),
//! never into either store.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::counters::Counters;
use crate::error::{ArchiveError, ArchiveResult};

/// Row counts of one table in one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub candidate_count: u64,
    pub copied_count: u64,
    pub verified_count: u64,
    pub deleted_count: u64,
}

/// Structured error recorded in a run report
///
/// `table` is `None` for run-level steps such as compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableError {
    pub table: Option<String>,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_count: Option<u64>,
}

impl TableError {
    pub fn from_error(table: Option<&str>, err: &ArchiveError) -> Self {
        let (candidate_count, verified_count) = match err {
            ArchiveError::ArchivalVerification {
                candidates,
                verified,
                ..
            } => (Some(*candidates), Some(*verified)),
            _ => (None, None),
        };
        Self {
            table: table.map(String::from),
            code: err.error_code().to_string(),
            message: err.to_string(),
            candidate_count,
            verified_count,
        }
    }
}

/// Outcome of one archival invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub counters: Counters,
    pub per_table: BTreeMap<String, TableReport>,
    pub errors: Vec<TableError>,
    pub compacted: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, counters: Counters) -> Self {
        Self {
            started_at,
            counters,
            per_table: BTreeMap::new(),
            errors: Vec::new(),
            compacted: false,
            duration_ms: 0,
        }
    }

    /// No table or run-level step failed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_copied(&self) -> u64 {
        self.per_table.values().map(|t| t.copied_count).sum()
    }

    pub fn total_deleted(&self) -> u64 {
        self.per_table.values().map(|t| t.deleted_count).sum()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.per_table.get(&name.to_ascii_lowercase())
    }

    pub fn log_summary(&self) {
        if self.is_clean() {
            tracing::info!(
                epoch = self.counters.epoch,
                sequence = self.counters.sequence,
                tables = self.per_table.len(),
                copied = self.total_copied(),
                deleted = self.total_deleted(),
                compacted = self.compacted,
                duration_ms = self.duration_ms,
                "Archival run finished"
            );
        } else {
            tracing::warn!(
                epoch = self.counters.epoch,
                sequence = self.counters.sequence,
                tables = self.per_table.len(),
                copied = self.total_copied(),
                deleted = self.total_deleted(),
                errors = self.errors.len(),
                duration_ms = self.duration_ms,
                "Archival run finished with errors"
            );
        }
    }

    /// Append this report as one JSON line
    pub fn append_to_log(&self, path: &Path) -> ArchiveResult<()> {
        let line = serde_json::to_string(self)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Candidate counts an archival run would act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivePlan {
    pub counters: Counters,
    pub tables: BTreeMap<String, PlannedTable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTable {
    pub predicate: String,
    pub candidate_count: u64,
}

impl ArchivePlan {
    pub fn total_candidates(&self) -> u64 {
        self.tables.values().map(|t| t.candidate_count).sum()
    }
}
