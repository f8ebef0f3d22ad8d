// File: src/storage/sqlite/store.rs

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};

use super::config::{SqliteConfig, StoreRole};
use super::schema;
use crate::classification::quote_ident;
use crate::error::{ArchiveError, ArchiveResult, StorageError};
use crate::query::Rows;

/// Handle to one embedded database file (hot or cold)
pub struct SqliteStore {
    /// Database connection (protected by mutex so reads can share the handle)
    conn: Mutex<Connection>,

    config: SqliteConfig,

    role: StoreRole,
}

impl SqliteStore {
    /// Open a store, creating the database file if it doesn't exist
    ///
    /// The journal mode is only chosen for a file created here; an existing
    /// file keeps the mode its owner gave it.
    pub fn open(config: SqliteConfig, role: StoreRole) -> ArchiveResult<Self> {
        let created = !config.path.exists();
        let conn = Connection::open(&config.path).map_err(|e| {
            ArchiveError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open {} store at {}: {}",
                role.as_str(),
                config.path.display(),
                e
            )))
        })?;
        Self::from_connection(conn, config, role, created)
    }

    /// Open an existing store (fails if the file doesn't exist)
    pub fn open_existing(config: SqliteConfig, role: StoreRole) -> ArchiveResult<Self> {
        if !config.path.exists() {
            return Err(ArchiveError::Storage(StorageError::NotFound(format!(
                "{} store {}",
                role.as_str(),
                config.path.display()
            ))));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&config.path, flags).map_err(|e| {
            ArchiveError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open {} store at {}: {}",
                role.as_str(),
                config.path.display(),
                e
            )))
        })?;
        Self::from_connection(conn, config, role, false)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(role: StoreRole) -> ArchiveResult<Self> {
        let config = SqliteConfig {
            path: PathBuf::from(":memory:"),
            wal_mode: false,
            foreign_keys: role == StoreRole::Hot,
            ..Default::default()
        };
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config, role, true)
    }

    fn from_connection(
        conn: Connection,
        config: SqliteConfig,
        role: StoreRole,
        created: bool,
    ) -> ArchiveResult<Self> {
        Self::configure_connection(&conn, &config, created)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            role,
        })
    }

    /// Configure SQLite connection pragmas
    ///
    /// `journal_mode` persists in the file, so it is only set on files this
    /// store created. The remaining pragmas are per connection.
    fn configure_connection(conn: &Connection, config: &SqliteConfig, created: bool) -> ArchiveResult<()> {
        if config.wal_mode && created {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
        conn.pragma_update(
            None,
            "foreign_keys",
            if config.foreign_keys { "ON" } else { "OFF" },
        )?;
        Ok(())
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get locked connection for internal operations
    pub(crate) fn get_conn(&self) -> ArchiveResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            ArchiveError::Storage(StorageError::ConnectionFailed("lock poisoned".into()))
        })
    }

    /// User tables, in name order
    pub fn table_names(&self) -> ArchiveResult<Vec<String>> {
        let conn = self.get_conn()?;
        Ok(schema::user_tables(&conn)?)
    }

    pub fn has_table(&self, table: &str) -> ArchiveResult<bool> {
        let conn = self.get_conn()?;
        Ok(schema::table_exists(&conn, table)?)
    }

    pub fn row_count(&self, table: &str) -> ArchiveResult<u64> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Logical database size (page_count * page_size)
    pub fn size_bytes(&self) -> ArchiveResult<u64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count * page_size) as u64)
    }

    /// Current journal mode of the file, lowercase (`delete`, `wal`, ...)
    pub fn journal_mode(&self) -> ArchiveResult<String> {
        let conn = self.get_conn()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode.to_ascii_lowercase())
    }

    /// Compact the database (VACUUM), truncating the WAL if there is one
    pub fn compact(&self) -> ArchiveResult<()> {
        let wal = self.journal_mode()? == "wal";
        let conn = self.get_conn()?;
        conn.execute("VACUUM", [])?;
        if wal {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        Ok(())
    }

    /// Run a read-only statement and collect every row
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> ArchiveResult<Rows> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(ArchiveError::InvalidArgument(
                "only read-only statements can be queried".into(),
            ));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            out.push(values);
        }

        Ok(Rows {
            columns,
            rows: out,
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("role", &self.role)
            .field("path", &self.config.path)
            .finish()
    }
}
