// File: src/archival/engine.rs

//! Copy -> verify -> delete -> compact
//!
//! Tables are processed one at a time and in isolation: a failure on one is
//! recorded in the report and the run moves on. Hot rows are only removed
//! after every candidate row has been found, column for column, in cold.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;

use super::policy::{Selection, Selections};
use super::report::{ArchivePlan, PlannedTable, RunReport, TableError, TableReport};
use crate::config::ArchivalPolicy;
use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::transfer::{count_present, count_rows, delete_rows, read_rows, write_rows};
use crate::storage::SqliteStore;

/// Moves selected rows from a hot store into its cold companion
pub struct ArchivalEngine<'a> {
    hot: &'a SqliteStore,
    cold: &'a SqliteStore,
    policy: &'a ArchivalPolicy,
}

impl<'a> ArchivalEngine<'a> {
    pub fn new(hot: &'a SqliteStore, cold: &'a SqliteStore, policy: &'a ArchivalPolicy) -> Self {
        Self { hot, cold, policy }
    }

    /// Process every selection, then compact if anything was removed
    pub fn run(&self, selections: &Selections) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(Utc::now(), selections.counters());

        tracing::info!(
            epoch = selections.counters().epoch,
            sequence = selections.counters().sequence,
            tables = selections.len(),
            "Archival run started"
        );

        for selection in selections.iter() {
            let name = selection.table.name();
            let mut table_report = TableReport::default();

            if let Err(e) = self.process(selection, &mut table_report) {
                tracing::warn!(
                    table = %name,
                    error = %e,
                    candidates = table_report.candidate_count,
                    verified = table_report.verified_count,
                    "Table left in hot store"
                );
                report.errors.push(TableError::from_error(Some(name), &e));
            }

            report
                .per_table
                .insert(name.to_ascii_lowercase(), table_report);
        }

        if self.policy.compact_after_run && report.total_deleted() > 0 {
            match self.hot.compact() {
                Ok(()) => {
                    report.compacted = true;
                    tracing::info!(path = %self.hot.path().display(), "Compacted hot store");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Hot store compaction failed");
                    report.errors.push(TableError::from_error(None, &e));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    fn process(&self, selection: &Selection, out: &mut TableReport) -> ArchiveResult<()> {
        let name = selection.table.name();
        let predicate = &selection.predicate;

        if predicate.selects_nothing() {
            tracing::debug!(table = %name, predicate = %predicate, "Nothing eligible");
            return Ok(());
        }

        let filter = predicate.filter();
        let candidates = read_rows(self.hot, name, &filter)?;
        out.candidate_count = candidates.len() as u64;
        if out.candidate_count == 0 {
            tracing::debug!(table = %name, predicate = %predicate, "No candidate rows");
            return Ok(());
        }

        out.copied_count = write_rows(self.cold, name, &candidates)?;
        if out.copied_count < out.candidate_count {
            return Err(ArchiveError::ArchivalVerification {
                table: name.to_string(),
                candidates: out.candidate_count,
                verified: out.copied_count,
            });
        }

        // Only this run's candidates count; rows archived earlier don't
        out.verified_count = count_present(self.cold, name, &candidates)?;
        if out.verified_count < out.candidate_count {
            return Err(ArchiveError::ArchivalVerification {
                table: name.to_string(),
                candidates: out.candidate_count,
                verified: out.verified_count,
            });
        }

        // Predicate is re-evaluated here, not replayed from the copied rows
        out.deleted_count = delete_rows(self.hot, name, &filter, out.verified_count)?;

        tracing::info!(
            table = %name,
            predicate = %predicate,
            candidates = out.candidate_count,
            copied = out.copied_count,
            verified = out.verified_count,
            deleted = out.deleted_count,
            "Archived table"
        );
        Ok(())
    }
}

/// Run the engine once over `selections`
pub fn run(
    hot: &SqliteStore,
    cold: &SqliteStore,
    selections: &Selections,
    policy: &ArchivalPolicy,
) -> RunReport {
    ArchivalEngine::new(hot, cold, policy).run(selections)
}

/// Count what a run would move, without touching either store
pub fn plan(hot: &SqliteStore, selections: &Selections) -> ArchiveResult<ArchivePlan> {
    let mut tables = BTreeMap::new();
    for selection in selections.iter() {
        let candidate_count = if selection.predicate.selects_nothing() {
            0
        } else {
            count_rows(hot, selection.table.name(), &selection.predicate.filter())?
        };
        tables.insert(
            selection.table.name().to_ascii_lowercase(),
            PlannedTable {
                predicate: selection.predicate.to_string(),
                candidate_count,
            },
        );
    }
    Ok(ArchivePlan {
        counters: selections.counters(),
        tables,
    })
}
