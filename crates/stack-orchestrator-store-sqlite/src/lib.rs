// stack-orchestrator-store-sqlite/src/lib.rs
// ============================================================================
// Crate: stack-orchestrator-store-sqlite
// Description: `SQLite`-backed `RunStore` and `LockManager` implementations.
// Purpose: Durable run/event/summary persistence and cross-process mutual
//          exclusion for a single stack root (spec §4.6, §4.9).
// Dependencies: rusqlite, serde_json, stack-orchestrator-core, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStore`] implements both
//! [`stack_orchestrator_core::interfaces::RunStore`] and
//! [`stack_orchestrator_core::interfaces::LockManager`] over one `SQLite`
//! connection. This mirrors the durability posture of a production
//! `SQLite`-backed store (WAL journaling, a busy timeout, a schema version
//! row) without the write-batching and read-pool machinery a higher-
//! throughput multi-tenant store needs; an orchestrator run has exactly one
//! writer, so a single mutex-guarded connection is sufficient.

pub mod config;
pub mod error;
pub mod lock;
pub mod store;

pub use config::SqliteStoreConfig;
pub use config::SqliteStoreMode;
pub use config::SqliteSyncMode;
pub use error::SqliteStoreError;
pub use store::SqliteStore;
