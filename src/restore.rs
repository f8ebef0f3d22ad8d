//! Restoration: copy an archived slice from cold back into hot
//!
//! Additive only. Nothing is removed from cold, so a restored row exists in
//! both stores and federated reads resolve it to the hot copy.

use std::fmt;

use rusqlite::types::Value;
use serde::Serialize;

use crate::classification::{quote_ident, ArchivableTable, Classification, Eligibility};
use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::transfer::{copy_rows, count_rows};
use crate::storage::{RowFilter, SqliteStore};

/// Which archived rows to bring back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreSelector {
    /// One epoch of an epoch-classified table
    Epoch(i64),
    /// Inclusive epoch range
    EpochRange { from: i64, to: i64 },
    /// Inclusive sequence range of a sequence-classified table
    SequenceRange { from: i64, to: i64 },
    /// Every archived row of the table
    All,
}

impl RestoreSelector {
    fn filter(&self, table: &ArchivableTable) -> ArchiveResult<RowFilter> {
        let column = quote_ident(table.eligibility_column());
        let range = |from: i64, to: i64| {
            if from > to {
                return Err(ArchiveError::InvalidArgument(format!(
                    "empty range {}..={}",
                    from, to
                )));
            }
            Ok(RowFilter::new(
                format!("{} BETWEEN ?1 AND ?2", column),
                vec![Value::Integer(from), Value::Integer(to)],
            ))
        };

        match (self, table.eligibility()) {
            (RestoreSelector::All, _) => Ok(RowFilter::all()),
            (RestoreSelector::Epoch(epoch), Eligibility::Epoch) => Ok(RowFilter::new(
                format!("{} = ?1", column),
                vec![Value::Integer(*epoch)],
            )),
            (RestoreSelector::EpochRange { from, to }, Eligibility::Epoch)
            | (RestoreSelector::SequenceRange { from, to }, Eligibility::Sequence) => {
                range(*from, *to)
            }
            (selector, eligibility) => Err(ArchiveError::Configuration(format!(
                "selector '{}' does not apply to {}, which is archived by {:?}",
                selector,
                table.name(),
                eligibility
            ))),
        }
    }
}

impl fmt::Display for RestoreSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreSelector::Epoch(epoch) => write!(f, "epoch {}", epoch),
            RestoreSelector::EpochRange { from, to } => write!(f, "epochs {}..={}", from, to),
            RestoreSelector::SequenceRange { from, to } => {
                write!(f, "sequence {}..={}", from, to)
            }
            RestoreSelector::All => write!(f, "all rows"),
        }
    }
}

/// Copy the selected cold rows into hot, returning how many were restored
///
/// Fails with [`ArchiveError::NotFound`] when nothing in cold matches.
pub fn restore(
    hot: &SqliteStore,
    cold: &SqliteStore,
    classification: &Classification,
    table: &str,
    selector: &RestoreSelector,
) -> ArchiveResult<u64> {
    let archivable = classification.archivable(table)?;
    let name = archivable.name();
    let filter = selector.filter(&archivable)?;

    let not_found = || ArchiveError::NotFound {
        table: name.to_string(),
        selector: selector.to_string(),
    };

    if !cold.has_table(name)? {
        return Err(not_found());
    }
    if !hot.has_table(name)? {
        return Err(ArchiveError::SchemaMismatch {
            table: name.to_string(),
            object: name.to_string(),
            detail: "table exists in cold but not in hot".into(),
        });
    }

    let matched = count_rows(cold, name, &filter)?;
    if matched == 0 {
        tracing::info!(table = %name, selector = %selector, "Nothing archived matches selector");
        return Err(not_found());
    }

    let restored = copy_rows(cold, hot, name, &filter)?;
    tracing::info!(
        table = %name,
        selector = %selector,
        matched,
        restored,
        "Restored rows into hot store"
    );
    Ok(restored)
}
