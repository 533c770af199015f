//! SQLite storage bootstrap, schema migrations and the storage error surface.
//!
//! # Responsibility
//! - Open and configure SQLite connections for CardLedger core.
//! - Apply schema migrations in deterministic order.
//! - Define the error type every persistence path propagates.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - Errors raised here travel through the context and interceptor unchanged.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The save cycle observed a cancellation request before committing.
    Cancelled,
    /// An UPDATE issued for a tracked entity matched no stored row.
    NotFound {
        table: &'static str,
        id: Uuid,
    },
    /// A persisted row could not be decoded into its entity.
    InvalidData(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Cancelled => write!(f, "save operation was cancelled"),
            Self::NotFound { table, id } => write!(f, "{table} row not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. }
            | Self::Cancelled
            | Self::NotFound { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
