// stack-orchestrator-store-sqlite/src/config.rs
// ============================================================================
// Module: Config
// Description: Connection configuration and pragma selection for the SQLite
//              run state store.
// Purpose: Mirrors the durability knobs a production SQLite-backed store
//          needs without the write-batching machinery this crate's simpler
//          single-writer data model does not require.
// Dependencies: std
// ============================================================================

use std::path::PathBuf;

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended; allows concurrent readers).
    #[default]
    Wal,
    /// Delete journal mode (legacy, single-file).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` synchronous mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest, default).
    #[default]
    Full,
    /// Normal synchronous mode (balanced; safe under WAL).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite`-backed [`crate::store::SqliteRunStore`] and
/// [`crate::lock::SqliteLockManager`].
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory); both stores open
///   the same file and share the `runs`/`events`/`summaries`/`locks` tables.
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds, bounding how long a connection waits
    /// on another connection's write lock before returning `SQLITE_BUSY`.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with the recommended WAL/full defaults.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Full,
        }
    }
}

/// Default busy timeout for `SQLite` connections: 5 seconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Current schema version. Bump and add a migration branch in
/// [`crate::store::open`] when the table layout changes.
pub const SCHEMA_VERSION: i64 = 1;
