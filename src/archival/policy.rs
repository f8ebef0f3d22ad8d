// File: src/archival/policy.rs

//! Policy evaluation: counters + policy + registry -> per-table selections

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::Value;
use serde::Serialize;

use super::counters::Counters;
use crate::classification::{quote_ident, ArchivableTable, Classification, Eligibility};
use crate::config::ArchivalPolicy;
use crate::error::ArchiveResult;
use crate::storage::RowFilter;

/// `column < upper_bound`, or nothing at all when the window covers every value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Predicate {
    column: String,
    upper_bound: Option<i64>,
}

impl Predicate {
    /// Rows strictly older than the `window` most recent values up to `current`
    ///
    /// With `current = 9` and `window = 3`, values 7, 8 and 9 stay hot and the
    /// bound is 7. A window that reaches back to the start selects nothing.
    pub fn for_window(column: &str, current: i64, window: i64) -> Self {
        let upper_bound = if current <= window {
            None
        } else {
            Some((current - window).saturating_add(1))
        };
        Self {
            column: column.to_string(),
            upper_bound,
        }
    }

    pub fn below(column: &str, bound: i64) -> Self {
        Self {
            column: column.to_string(),
            upper_bound: Some(bound),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn upper_bound(&self) -> Option<i64> {
        self.upper_bound
    }

    pub fn selects_nothing(&self) -> bool {
        self.upper_bound.is_none()
    }

    pub fn matches(&self, value: i64) -> bool {
        self.upper_bound.map(|bound| value < bound).unwrap_or(false)
    }

    /// SQL form, re-evaluated by every statement that uses it
    pub fn filter(&self) -> RowFilter {
        match self.upper_bound {
            Some(bound) => RowFilter::new(
                format!("{} < ?1", quote_ident(&self.column)),
                vec![Value::Integer(bound)],
            ),
            None => RowFilter::new("0", Vec::new()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper_bound {
            Some(bound) => write!(f, "{} < {}", self.column, bound),
            None => write!(f, "{} (nothing eligible)", self.column),
        }
    }
}

/// One archivable table and the rows it should give up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub table: ArchivableTable,
    pub predicate: Predicate,
}

/// Output of [`evaluate`]: the only input the archival engine accepts
///
/// Always-hot tables cannot appear here because [`ArchivableTable`] cannot be
/// built for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selections {
    counters: Counters,
    tables: BTreeMap<String, Selection>,
}

impl Selections {
    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn get(&self, table: &str) -> Option<&Selection> {
        self.tables.get(&table.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Compute the row selection of every archivable table present in hot
///
/// `present_tables` are the user tables found in the hot store. Any of them
/// without a classification entry is a configuration error, raised before
/// anything is written.
pub fn evaluate(
    counters: Counters,
    policy: &ArchivalPolicy,
    classification: &Classification,
    present_tables: &[String],
) -> ArchiveResult<Selections> {
    policy.validate()?;

    for table in present_tables {
        classification.lookup(table)?;
    }

    let mut tables = BTreeMap::new();
    for table in classification.archivable_tables() {
        let present = present_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table.name()));
        if !present {
            continue;
        }

        let predicate = match table.eligibility() {
            Eligibility::Epoch => Predicate::for_window(
                table.eligibility_column(),
                counters.epoch,
                policy.hot_epoch_window,
            ),
            Eligibility::Sequence => Predicate::for_window(
                table.eligibility_column(),
                counters.sequence,
                policy.hot_sequence_window,
            ),
        };

        tracing::debug!(table = %table.name(), predicate = %predicate, "Evaluated selection");
        tables.insert(
            table.name().to_ascii_lowercase(),
            Selection { table, predicate },
        );
    }

    Ok(Selections { counters, tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    fn present(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn policy(epoch_window: i64, sequence_window: i64) -> ArchivalPolicy {
        ArchivalPolicy {
            hot_epoch_window: epoch_window,
            hot_sequence_window: sequence_window,
            ..Default::default()
        }
    }

    #[test]
    fn test_window_keeps_most_recent_epochs() {
        let p = Predicate::for_window("season", 9, 3);
        assert_eq!(p.upper_bound(), Some(7));
        assert!((1..=6).all(|s| p.matches(s)));
        assert!((7..=9).all(|s| !p.matches(s)));
        assert_eq!(p.to_string(), "season < 7");
    }

    #[test]
    fn test_window_covering_everything_selects_nothing() {
        for current in [0, 1, 3] {
            let p = Predicate::for_window("season", current, 3);
            assert!(p.selects_nothing());
            assert!(!p.matches(i64::MIN));
            assert_eq!(p.filter().clause(), "0");
        }
    }

    #[test]
    fn test_zero_window_archives_current() {
        let p = Predicate::for_window("tick", 100, 0);
        assert!(p.matches(100));
        assert!(!p.matches(101));
    }

    #[test]
    fn test_filter_binds_bound() {
        let f = Predicate::below("tick", 500).filter();
        assert_eq!(f.clause(), "\"tick\" < ?1");
        assert_eq!(f.params(), &[Value::Integer(500)]);
    }

    #[test]
    fn test_evaluate_skips_always_hot_and_absent_tables() {
        let selections = evaluate(
            Counters::new(9, 20_000),
            &policy(3, 10_000),
            &Classification::simulation(),
            &present(&["drivers", "career_stats", "race_results", "event_log"]),
        )
        .unwrap();

        assert_eq!(selections.len(), 2);
        assert!(selections.get("drivers").is_none());
        assert!(selections.get("lap_times").is_none());
        assert_eq!(
            selections.get("race_results").unwrap().predicate,
            Predicate::below("season", 7)
        );
        assert_eq!(
            selections.get("event_log").unwrap().predicate,
            Predicate::below("tick", 10_001)
        );
        assert_eq!(selections.counters(), Counters::new(9, 20_000));
    }

    #[test]
    fn test_evaluate_unclassified_table_is_configuration_error() {
        let err = evaluate(
            Counters::new(9, 0),
            &ArchivalPolicy::default(),
            &Classification::simulation(),
            &present(&["race_results", "weather_samples"]),
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Configuration(ref m) if m.contains("weather_samples")));
    }

    #[test]
    fn test_evaluate_rejects_invalid_policy() {
        let err = evaluate(
            Counters::new(9, 0),
            &policy(-1, 0),
            &Classification::simulation(),
            &[],
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
