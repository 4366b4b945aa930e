// stack-orchestrator-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run Store
// Description: `RunStore` implementation backed by a single `SQLite`
//              connection guarded by a mutex.
// Purpose: Durable persistence for runs, the hash-chained event log, and
//          summary snapshots (spec §4.6).
// Dependencies: rusqlite, serde_json, stack-orchestrator-core
// ============================================================================

//! ## Overview
//! One `SQLite` file holds four tables: `runs`, `events`, `summaries`, and
//! `locks` (the latter owned by [`crate::lock`]). Every row keeps its struct
//! serialized as canonical-adjacent JSON in a `TEXT` column alongside the
//! scalar columns needed for lookups and ordering; this crate does not
//! attempt to normalize the data model into relational columns; the stored
//! JSON is the source of truth and the scalar columns exist only to index
//! it.
//!
//! Unlike a high-throughput multi-tenant store, an orchestrator run has at
//! most one writer (the Supervisor driving the run). A single
//! `Mutex<Connection>` is therefore sufficient; there is no writer queue or
//! batching here.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;

use stack_orchestrator_core::core::Run;
use stack_orchestrator_core::core::RunEvent;
use stack_orchestrator_core::core::RunId;
use stack_orchestrator_core::core::RunSummary;
use stack_orchestrator_core::interfaces::RunStore;
use stack_orchestrator_core::interfaces::StoreError;

use crate::config::SCHEMA_VERSION;
use crate::config::SqliteStoreConfig;
use crate::error::SqliteStoreError;

/// Durable `SQLite`-backed implementation of [`RunStore`] and
/// [`stack_orchestrator_core::interfaces::LockManager`] (the latter
/// implemented in [`crate::lock`]).
#[derive(Clone)]
pub struct SqliteStore {
    /// The single shared connection, guarded against concurrent writers.
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if absent) the `SQLite` database at `config.path`,
    /// applies durability pragmas, and ensures the schema is current.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened, pragmas
    /// cannot be applied, or the schema is at an incompatible version.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags)?;
        apply_pragmas(&connection, config)?;
        init_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory database, used by tests that do not need
    /// on-disk durability.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when schema initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()?;
        init_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

/// Applies `journal_mode`, `synchronous`, and `busy_timeout` pragmas.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Creates the schema if absent and checks `store_meta.version` otherwise.
fn init_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);

         CREATE TABLE IF NOT EXISTS runs (
             run_id TEXT PRIMARY KEY,
             stack_root TEXT NOT NULL,
             created_at TEXT NOT NULL,
             run_json TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS runs_by_stack_root ON runs (stack_root, created_at);

         CREATE TABLE IF NOT EXISTS events (
             run_id TEXT NOT NULL,
             seq INTEGER NOT NULL,
             event_json TEXT NOT NULL,
             PRIMARY KEY (run_id, seq)
         );

         CREATE TABLE IF NOT EXISTS summaries (
             run_id TEXT PRIMARY KEY,
             summary_json TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS locks (
             stack_root TEXT PRIMARY KEY,
             lock_json TEXT NOT NULL
         );",
    )?;

    let version: Option<i64> =
        connection.query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0)).optional()?;
    match version {
        None => {
            connection.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
        }
        Some(found) if found == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(SqliteStoreError::VersionMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
    }
    Ok(())
}

/// Extracts the `stack_root` field from a run's sealed plan JSON, used to
/// index `runs` by stack root for [`RunStore::latest_run`].
fn extract_stack_root(sealed_plan_json: &str) -> Result<String, SqliteStoreError> {
    let value: serde_json::Value = serde_json::from_str(sealed_plan_json)?;
    value
        .get("stack_root")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| SqliteStoreError::Corrupt("sealed plan JSON missing stack_root".to_string()))
}

impl RunStore for SqliteStore {
    fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let stack_root = extract_stack_root(&run.sealed_plan_json).map_err(StoreError::from)?;
        let run_json = serde_json::to_string(run).map_err(SqliteStoreError::from).map_err(StoreError::from)?;
        let created_at = run.run_id.as_str().to_string();
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        guard
            .execute(
                "INSERT INTO runs (run_id, stack_root, created_at, run_json) VALUES (?1, ?2, ?3, ?4)",
                params![run.run_id.as_str(), stack_root, created_at, run_json],
            )
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let row: Option<String> = guard
            .query_row("SELECT run_json FROM runs WHERE run_id = ?1", params![run_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        row.map(|json| serde_json::from_str(&json).map_err(SqliteStoreError::from).map_err(StoreError::from))
            .transpose()
    }

    fn latest_run(&self, stack_root: &Path) -> Result<Option<Run>, StoreError> {
        let stack_root = path_to_string(stack_root);
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT run_json FROM runs WHERE stack_root = ?1 ORDER BY created_at DESC LIMIT 1",
                params![stack_root],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        row.map(|json| serde_json::from_str(&json).map_err(SqliteStoreError::from).map_err(StoreError::from))
            .transpose()
    }

    fn append_event(&self, event: &RunEvent) -> Result<(), StoreError> {
        let event_json =
            serde_json::to_string(event).map_err(SqliteStoreError::from).map_err(StoreError::from)?;
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let next_seq: i64 = guard
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM events WHERE run_id = ?1",
                params![event.run_id.as_str()],
                |row| row.get(0),
            )
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        if i64::try_from(event.seq).unwrap_or(i64::MAX) != next_seq {
            return Err(StoreError::from(SqliteStoreError::NonContiguousSequence {
                expected: u64::try_from(next_seq).unwrap_or(0),
                got: event.seq,
            }));
        }
        guard
            .execute(
                "INSERT INTO events (run_id, seq, event_json) VALUES (?1, ?2, ?3)",
                params![event.run_id.as_str(), next_seq, event_json],
            )
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn load_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>, StoreError> {
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let mut statement = guard
            .prepare("SELECT event_json FROM events WHERE run_id = ?1 ORDER BY seq ASC")
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        let rows = statement
            .query_map(params![run_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        let mut events = Vec::new();
        for row in rows {
            let json = row.map_err(SqliteStoreError::from).map_err(StoreError::from)?;
            let event: RunEvent =
                serde_json::from_str(&json).map_err(SqliteStoreError::from).map_err(StoreError::from)?;
            events.push(event);
        }
        Ok(events)
    }

    fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
        let summary_json =
            serde_json::to_string(summary).map_err(SqliteStoreError::from).map_err(StoreError::from)?;
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        guard
            .execute(
                "INSERT INTO summaries (run_id, summary_json) VALUES (?1, ?2)
                 ON CONFLICT(run_id) DO UPDATE SET summary_json = excluded.summary_json",
                params![summary.run_id.as_str(), summary_json],
            )
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn load_summary(&self, run_id: &RunId) -> Result<Option<RunSummary>, StoreError> {
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let row: Option<String> = guard
            .query_row(
                "SELECT summary_json FROM summaries WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)
            .map_err(StoreError::from)?;
        row.map(|json| serde_json::from_str(&json).map_err(SqliteStoreError::from).map_err(StoreError::from))
            .transpose()
    }
}

/// Converts a poisoned mutex into a [`StoreError`]; a poisoned connection
/// mutex means a prior writer panicked mid-transaction, which this crate
/// treats as an I/O-layer failure rather than attempting recovery.
fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Io("store connection mutex poisoned".to_string())
}

/// Lossily converts a path to the `TEXT` form stored in `stack_root` columns.
fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
