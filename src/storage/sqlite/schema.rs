// File: src/storage/sqlite/schema.rs

//! Schema introspection over `sqlite_master`

use rusqlite::{params, Connection, OptionalExtension};

/// Kind of schema object mirrored into the cold store
///
/// Triggers and views are never mirrored: triggers on detail tables usually
/// feed always-hot aggregates that don't exist in cold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Index,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Index => "index",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(ObjectKind::Table),
            "index" => Some(ObjectKind::Index),
            _ => None,
        }
    }
}

/// A table or index definition as stored by SQLite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub name: String,
    pub table: String,
    pub sql: String,
}

/// Table first, then its explicit indexes (auto-indexes have no SQL and are skipped)
pub fn table_objects(conn: &Connection, table: &str) -> rusqlite::Result<Vec<SchemaObject>> {
    let mut stmt = conn.prepare(
        "SELECT type, name, tbl_name, sql FROM sqlite_master
         WHERE lower(tbl_name) = lower(?1) AND type IN ('table', 'index') AND sql IS NOT NULL
         ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, name",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        let kind: String = row.get(0)?;
        Ok((kind, row.get(1)?, row.get(2)?, row.get(3)?))
    })?;

    let mut objects = Vec::new();
    for row in rows {
        let (kind, name, table, sql): (String, String, String, String) = row?;
        if let Some(kind) = ObjectKind::parse(&kind) {
            objects.push(SchemaObject {
                kind,
                name,
                table,
                sql,
            });
        }
    }
    Ok(objects)
}

/// Look up any schema object by name: `(type, sql)`
pub fn find_object(conn: &Connection, name: &str) -> rusqlite::Result<Option<(String, Option<String>)>> {
    conn.query_row(
        "SELECT type, sql FROM sqlite_master WHERE lower(name) = lower(?1)",
        params![name],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1))",
        params![table],
        |row| row.get(0),
    )
}

/// Every user table, excluding SQLite internals
pub fn user_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// Canonical form used to compare definitions across stores
pub fn normalize_sql(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_ascii_lowercase();
    lowered
        .replacen("if not exists ", "", 1)
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
}

/// Rewrite a stored CREATE statement so re-running it is a no-op
pub fn with_if_not_exists(sql: &str) -> String {
    let trimmed = sql.trim_start();
    let upper = trimmed.to_ascii_uppercase();
    for prefix in ["CREATE TABLE", "CREATE UNIQUE INDEX", "CREATE INDEX"] {
        if let Some(rest) = upper.strip_prefix(prefix) {
            if rest.trim_start().starts_with("IF NOT EXISTS") {
                return trimmed.to_string();
            }
            return format!("{} IF NOT EXISTS{}", prefix, &trimmed[prefix.len()..]);
        }
    }
    trimmed.to_string()
}
