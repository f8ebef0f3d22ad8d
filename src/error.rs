//! Archive error types

use thiserror::Error;

/// Main error type for archival, federation, and restoration
#[derive(Debug, Error)]
pub enum ArchiveError {
    // ========== Fatal (detected before any write) ==========
    /// Missing classification or malformed policy
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cold schema diverges from hot
    #[error("schema mismatch on {table} ({object}): {detail}")]
    SchemaMismatch {
        table: String,
        object: String,
        detail: String,
    },

    // ========== Per-table / recoverable ==========
    /// Copy verification failed; hot rows were left in place
    #[error("verification failed for {table}: {verified} of {candidates} candidate rows present in cold")]
    ArchivalVerification {
        table: String,
        candidates: u64,
        verified: u64,
    },

    /// Federated read references a table the cold store does not have
    #[error("federated query references {table}, which is absent from the cold store")]
    Federation { table: String },

    /// Restoration selector matched nothing in cold
    #[error("no archived rows in {table} match {selector}")]
    NotFound { table: String, selector: String },

    // ========== Validation ==========
    /// Invalid argument (bad SQL, bad selector, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Storage ==========
    /// Underlying store failure
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Store file or object not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Archive result type alias
pub type ArchiveResult<T> = Result<T, ArchiveError>;

impl ArchiveError {
    /// Stable error code for reports and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            ArchiveError::Configuration(_) => "CONFIGURATION_ERROR",
            ArchiveError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            ArchiveError::ArchivalVerification { .. } => "ARCHIVAL_VERIFICATION_FAILED",
            ArchiveError::Federation { .. } => "FEDERATION_ERROR",
            ArchiveError::NotFound { .. } => "NOT_FOUND",
            ArchiveError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ArchiveError::Storage(_) => "STORAGE_ERROR",
            ArchiveError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the caller can retry (or fall back to a hot-only read)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ArchiveError::ArchivalVerification { .. }
                | ArchiveError::Federation { .. }
                | ArchiveError::NotFound { .. }
                | ArchiveError::Storage(StorageError::ConnectionFailed(_))
        )
    }

    /// Errors that abort a whole run and need operator intervention
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::Configuration(_) | ArchiveError::SchemaMismatch { .. }
        )
    }

    /// Table the error is about, when there is one
    pub fn table(&self) -> Option<&str> {
        match self {
            ArchiveError::SchemaMismatch { table, .. }
            | ArchiveError::ArchivalVerification { table, .. }
            | ArchiveError::Federation { table }
            | ArchiveError::NotFound { table, .. } => Some(table),
            _ => None,
        }
    }
}

// Conversions from external errors

impl From<rusqlite::Error> for ArchiveError {
    fn from(e: rusqlite::Error) -> Self {
        ArchiveError::Storage(StorageError::Sqlite(e))
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        ArchiveError::Storage(StorageError::Io(e))
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(e: serde_json::Error) -> Self {
        ArchiveError::Internal(format!("json: {}", e))
    }
}

impl From<StorageError> for ArchiveError {
    fn from(e: StorageError) -> Self {
        ArchiveError::Storage(e)
    }
}
