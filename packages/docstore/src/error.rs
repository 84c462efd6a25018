//! Error types for docstore

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// (scope, kind) has no registered template
    UnknownKind,
    /// Backend unreachable or connect timeout exceeded
    Connection,
    /// Engine-level failure (SQLite, PostgreSQL, file store)
    Database,
    /// Insert hit an existing `_id`
    DuplicateKey,
    /// Serialization/deserialization errors
    Serialization,
    /// Configuration errors
    Config,
    /// I/O errors
    IO,
    /// Bulk import failures
    Import,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownKind => "unknown_kind",
            ErrorKind::Connection => "connection",
            ErrorKind::Database => "database",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
            ErrorKind::IO => "io",
            ErrorKind::Import => "import",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Tag the error with the operation and identifier that produced it.
    ///
    /// ```rust
    /// use docstore::StorageError;
    ///
    /// let err = StorageError::database("disk full").during("update", "42");
    /// assert_eq!(err.to_string(), "[database] update 42: disk full");
    /// ```
    pub fn during(mut self, operation: &str, target: impl fmt::Display) -> Self {
        self.message = format!("{} {}: {}", operation, target, self.message);
        self
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.kind == ErrorKind::DuplicateKey
    }

    // Convenience constructors
    pub fn unknown_kind(scope: impl fmt::Display, kind: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UnknownKind,
            format!("No template registered for {} in scope {}", kind, scope),
        )
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn duplicate_key(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DuplicateKey,
            format!("Document already exists: {}", id),
        )
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Import, message)
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                return StorageError::new(ErrorKind::DuplicateKey, format!("SQLite error: {}", err))
                    .with_source(err);
            }
        }
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

// PostgreSQL error conversions
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => ErrorKind::Connection,
            sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::DuplicateKey,
            _ => ErrorKind::Database,
        };
        StorageError::new(kind, format!("PostgreSQL error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

// YAML error conversions
impl From<serde_yaml::Error> for StorageError {
    fn from(err: serde_yaml::Error) -> Self {
        StorageError::config(format!("YAML error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::IO, format!("I/O error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
