//! Table classification registry
//!
//! Every table that can appear in either store is mapped to exactly one
//! [`RetentionClass`]. The registry is validated on construction, and the only
//! way to hand a table to the archival or restoration code is through an
//! [`ArchivableTable`], which cannot be built for an always-hot table.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ArchiveError, ArchiveResult};

/// Retention class of a logical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "kebab-case")]
pub enum RetentionClass {
    /// Never archived (entities, aggregates, career statistics)
    AlwaysHot,
    /// Archived once `column` (a season number) falls out of the hot window
    ArchiveByEpoch { column: String },
    /// Archived once `column` (a tick counter) falls out of the hot window
    ArchiveBySequence { column: String },
}

impl RetentionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionClass::AlwaysHot => "always-hot",
            RetentionClass::ArchiveByEpoch { .. } => "archive-by-epoch",
            RetentionClass::ArchiveBySequence { .. } => "archive-by-sequence",
        }
    }

    pub fn is_archivable(&self) -> bool {
        !matches!(self, RetentionClass::AlwaysHot)
    }
}

/// Which counter an archivable table is aged by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Eligibility {
    Epoch,
    Sequence,
}

/// One row of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationEntry {
    pub table_name: String,
    pub retention: RetentionClass,
    pub primary_key: Vec<String>,
}

impl ClassificationEntry {
    pub fn always_hot(table: &str, primary_key: &[&str]) -> Self {
        Self::build(table, RetentionClass::AlwaysHot, primary_key)
    }

    pub fn by_epoch(table: &str, epoch_column: &str, primary_key: &[&str]) -> Self {
        Self::build(
            table,
            RetentionClass::ArchiveByEpoch {
                column: epoch_column.to_string(),
            },
            primary_key,
        )
    }

    pub fn by_sequence(table: &str, sequence_column: &str, primary_key: &[&str]) -> Self {
        Self::build(
            table,
            RetentionClass::ArchiveBySequence {
                column: sequence_column.to_string(),
            },
            primary_key,
        )
    }

    fn build(table: &str, retention: RetentionClass, primary_key: &[&str]) -> Self {
        Self {
            table_name: table.to_string(),
            retention,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn epoch_column(&self) -> Option<&str> {
        match &self.retention {
            RetentionClass::ArchiveByEpoch { column } => Some(column),
            _ => None,
        }
    }

    pub fn sequence_column(&self) -> Option<&str> {
        match &self.retention {
            RetentionClass::ArchiveBySequence { column } => Some(column),
            _ => None,
        }
    }

    fn validate(&self) -> ArchiveResult<()> {
        if !is_identifier(&self.table_name) {
            return Err(ArchiveError::Configuration(format!(
                "invalid table name '{}'",
                self.table_name
            )));
        }
        if self.primary_key.is_empty() {
            return Err(ArchiveError::Configuration(format!(
                "table '{}' has no primary key columns",
                self.table_name
            )));
        }
        if let Some(bad) = self.primary_key.iter().find(|c| !is_identifier(c)) {
            return Err(ArchiveError::Configuration(format!(
                "table '{}' has invalid primary key column '{}'",
                self.table_name, bad
            )));
        }
        let column = self.epoch_column().or(self.sequence_column());
        if let Some(column) = column {
            if !is_identifier(column) {
                return Err(ArchiveError::Configuration(format!(
                    "table '{}' has invalid eligibility column '{}'",
                    self.table_name, column
                )));
            }
        }
        Ok(())
    }
}

/// A classification entry known not to be always-hot
///
/// Only [`Classification`] can construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivableTable {
    entry: ClassificationEntry,
    eligibility: Eligibility,
    column: String,
}

impl ArchivableTable {
    fn from_entry(entry: &ClassificationEntry) -> Option<Self> {
        let (eligibility, column) = match &entry.retention {
            RetentionClass::AlwaysHot => return None,
            RetentionClass::ArchiveByEpoch { column } => (Eligibility::Epoch, column.clone()),
            RetentionClass::ArchiveBySequence { column } => (Eligibility::Sequence, column.clone()),
        };
        Some(Self {
            entry: entry.clone(),
            eligibility,
            column,
        })
    }

    pub fn name(&self) -> &str {
        &self.entry.table_name
    }

    pub fn primary_key(&self) -> &[String] {
        &self.entry.primary_key
    }

    pub fn eligibility(&self) -> Eligibility {
        self.eligibility
    }

    /// Column compared against the policy window
    pub fn eligibility_column(&self) -> &str {
        &self.column
    }

    pub fn entry(&self) -> &ClassificationEntry {
        &self.entry
    }
}

/// Registry of every known table, keyed case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    entries: BTreeMap<String, ClassificationEntry>,
}

impl Classification {
    /// Build and validate a registry
    ///
    /// Fails on duplicate tables, empty primary keys, or names that are not
    /// plain SQL identifiers.
    pub fn new(entries: impl IntoIterator<Item = ClassificationEntry>) -> ArchiveResult<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let key = entry.table_name.to_ascii_lowercase();
            if map.contains_key(&key) {
                return Err(ArchiveError::Configuration(format!(
                    "table '{}' is classified more than once",
                    entry.table_name
                )));
            }
            map.insert(key, entry);
        }
        Ok(Self { entries: map })
    }

    /// Built-in registry for the racing simulation schema
    pub fn simulation() -> Self {
        let entries = simulation_entries()
            .into_iter()
            .map(|e| (e.table_name.to_ascii_lowercase(), e))
            .collect();
        Self { entries }
    }

    pub fn get(&self, table: &str) -> Option<&ClassificationEntry> {
        self.entries.get(&table.to_ascii_lowercase())
    }

    /// Look up a table, failing for unregistered names
    pub fn lookup(&self, table: &str) -> ArchiveResult<&ClassificationEntry> {
        self.get(table).ok_or_else(|| {
            ArchiveError::Configuration(format!("table '{}' has no classification entry", table))
        })
    }

    /// Resolve a table for archival or restoration
    pub fn archivable(&self, table: &str) -> ArchiveResult<ArchivableTable> {
        let entry = self.lookup(table)?;
        ArchivableTable::from_entry(entry).ok_or_else(|| {
            ArchiveError::Configuration(format!(
                "table '{}' is always-hot and cannot be archived or restored",
                entry.table_name
            ))
        })
    }

    /// Every table that may live in the cold store
    pub fn archivable_tables(&self) -> impl Iterator<Item = ArchivableTable> + '_ {
        self.entries.values().filter_map(ArchivableTable::from_entry)
    }

    pub fn is_always_hot(&self, table: &str) -> bool {
        self.get(table)
            .map(|e| !e.retention.is_archivable())
            .unwrap_or(false)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ClassificationEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn simulation_entries() -> Vec<ClassificationEntry> {
    vec![
        // Entities and aggregates
        ClassificationEntry::always_hot("game_state", &["key"]),
        ClassificationEntry::always_hot("teams", &["id"]),
        ClassificationEntry::always_hot("drivers", &["id"]),
        ClassificationEntry::always_hot("circuits", &["id"]),
        ClassificationEntry::always_hot("career_stats", &["driver_id"]),
        ClassificationEntry::always_hot("season_standings", &["season", "driver_id"]),
        ClassificationEntry::always_hot("team_finances", &["team_id", "season"]),
        // Per-season detail
        ClassificationEntry::by_epoch("race_results", "season", &["season", "round", "driver_id"]),
        ClassificationEntry::by_epoch(
            "qualifying_results",
            "season",
            &["season", "round", "driver_id"],
        ),
        ClassificationEntry::by_epoch(
            "lap_times",
            "season",
            &["season", "round", "driver_id", "lap"],
        ),
        ClassificationEntry::by_epoch("transactions", "season", &["id"]),
        // Tick-stamped logs
        ClassificationEntry::by_sequence("event_log", "tick", &["id"]),
        ClassificationEntry::by_sequence("commentary_log", "tick", &["id"]),
    ]
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier for interpolation into SQL
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_registry_is_valid() {
        let rebuilt = Classification::new(simulation_entries()).unwrap();
        assert_eq!(rebuilt, Classification::simulation());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let c = Classification::simulation();
        assert!(c.get("RACE_RESULTS").is_some());
        assert_eq!(c.lookup("Race_Results").unwrap().table_name, "race_results");
    }

    #[test]
    fn test_unregistered_table_is_configuration_error() {
        let c = Classification::simulation();
        let err = c.lookup("weather").unwrap_err();
        assert!(matches!(err, ArchiveError::Configuration(_)));
    }

    #[test]
    fn test_always_hot_is_not_archivable() {
        let c = Classification::simulation();
        assert!(c.is_always_hot("career_stats"));
        assert!(c.archivable("career_stats").is_err());
        assert!(c.archivable_tables().all(|t| !c.is_always_hot(t.name())));
    }

    #[test]
    fn test_archivable_table_accessors() {
        let c = Classification::simulation();
        let t = c.archivable("race_results").unwrap();
        assert_eq!(t.eligibility(), Eligibility::Epoch);
        assert_eq!(t.eligibility_column(), "season");
        assert_eq!(t.primary_key(), ["season", "round", "driver_id"]);

        let log = c.archivable("event_log").unwrap();
        assert_eq!(log.eligibility(), Eligibility::Sequence);
        assert_eq!(log.eligibility_column(), "tick");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let result = Classification::new(vec![
            ClassificationEntry::always_hot("drivers", &["id"]),
            ClassificationEntry::by_epoch("DRIVERS", "season", &["id"]),
        ]);
        assert!(matches!(result, Err(ArchiveError::Configuration(_))));
    }

    #[test]
    fn test_empty_primary_key_rejected() {
        let result = Classification::new(vec![ClassificationEntry::by_epoch(
            "race_results",
            "season",
            &[],
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_identifier_rejected() {
        let result = Classification::new(vec![ClassificationEntry::always_hot(
            "drivers; DROP TABLE x",
            &["id"],
        )]);
        assert!(result.is_err());
        assert!(is_identifier("lap_times"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("season"), "\"season\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
