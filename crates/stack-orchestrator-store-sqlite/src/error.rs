// stack-orchestrator-store-sqlite/src/error.rs
// ============================================================================
// Module: Errors
// Description: SQLite store error type and its mappings onto the core
//              `StoreError`/`LockError` interfaces.
// Purpose: Keeps `rusqlite`/`serde_json` error details out of the core
//          crate while still surfacing enough detail for diagnostics.
// Dependencies: rusqlite, serde_json, stack-orchestrator-core, thiserror
// ============================================================================

use thiserror::Error;

use stack_orchestrator_core::interfaces::LockError;
use stack_orchestrator_core::interfaces::StoreError;

/// Errors raised by the `SQLite`-backed store and lock manager.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// A `SQLite` operation failed.
    #[error("sqlite error: {0}")]
    Db(String),
    /// A row's JSON payload could not be parsed.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The on-disk schema version is newer or incompatible with this build.
    #[error("schema version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version recorded in the database.
        found: i64,
        /// Version this build expects.
        expected: i64,
    },
    /// An event was appended out of sequence.
    #[error("non-contiguous event sequence: expected {expected}, got {got}")]
    NonContiguousSequence {
        /// The sequence number that should have been appended next.
        expected: u64,
        /// The sequence number actually supplied.
        got: u64,
    },
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for SqliteStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Corrupt(message) => Self::Invalid(message),
            SqliteStoreError::VersionMismatch { found, expected } => {
                Self::VersionMismatch(format!("found {found}, expected {expected}"))
            }
            SqliteStoreError::NonContiguousSequence { expected, got } => {
                Self::Integrity(format!("expected seq {expected}, got {got}"))
            }
        }
    }
}

impl From<SqliteStoreError> for LockError {
    fn from(err: SqliteStoreError) -> Self {
        Self::Store(err.to_string())
    }
}
