// stack-orchestrator-store-sqlite/src/lock.rs
// ============================================================================
// Module: SQLite Lock Manager
// Description: `LockManager` implementation sharing the run store's
//              connection.
// Purpose: At-most-one-run-per-stack-root enforcement with TTL-based
//          staleness and takeover (spec §4.9).
// Dependencies: rusqlite, stack-orchestrator-core
// ============================================================================

use std::path::Path;

use rusqlite::OptionalExtension;
use rusqlite::params;

use stack_orchestrator_core::core::Lock;
use stack_orchestrator_core::core::LockOwner;
use stack_orchestrator_core::core::Timestamp;
use stack_orchestrator_core::interfaces::LockError;
use stack_orchestrator_core::interfaces::LockManager;

use crate::error::SqliteStoreError;
use crate::store::SqliteStore;

impl LockManager for SqliteStore {
    fn acquire(
        &self,
        stack_root: &Path,
        owner: &LockOwner,
        ttl_seconds: u64,
        takeover: bool,
        now: Timestamp,
    ) -> Result<Lock, LockError> {
        let stack_root_key = stack_root.to_string_lossy().into_owned();
        let guard = self.connection.lock().map_err(lock_poisoned)?;

        let existing: Option<String> = guard
            .query_row("SELECT lock_json FROM locks WHERE stack_root = ?1", params![stack_root_key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;

        if let Some(json) = existing {
            let current: Lock = serde_json::from_str(&json).map_err(SqliteStoreError::from)?;
            if current.owner != *owner && !(takeover && current.is_stale(now)) {
                return Err(LockError::Held {
                    owner: current.owner,
                    acquired_at: current.acquired_at,
                });
            }
        }

        let lock = Lock {
            stack_root: stack_root.to_path_buf(),
            owner: owner.clone(),
            ttl_seconds,
            acquired_at: now,
            heartbeat_at: now,
        };
        let lock_json = serde_json::to_string(&lock).map_err(SqliteStoreError::from)?;
        guard
            .execute(
                "INSERT INTO locks (stack_root, lock_json) VALUES (?1, ?2)
                 ON CONFLICT(stack_root) DO UPDATE SET lock_json = excluded.lock_json",
                params![stack_root_key, lock_json],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(lock)
    }

    fn heartbeat(&self, stack_root: &Path, owner: &LockOwner, now: Timestamp) -> Result<(), LockError> {
        let stack_root_key = stack_root.to_string_lossy().into_owned();
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let existing: Option<String> = guard
            .query_row("SELECT lock_json FROM locks WHERE stack_root = ?1", params![stack_root_key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(json) = existing else {
            return Err(LockError::Store(format!("no lock held for {}", stack_root.display())));
        };
        let mut current: Lock = serde_json::from_str(&json).map_err(SqliteStoreError::from)?;
        if current.owner != *owner {
            return Err(LockError::Held {
                owner: current.owner,
                acquired_at: current.acquired_at,
            });
        }
        current.heartbeat_at = now;
        let lock_json = serde_json::to_string(&current).map_err(SqliteStoreError::from)?;
        guard
            .execute(
                "UPDATE locks SET lock_json = ?2 WHERE stack_root = ?1",
                params![stack_root_key, lock_json],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn release(&self, stack_root: &Path, owner: &LockOwner) -> Result<(), LockError> {
        let stack_root_key = stack_root.to_string_lossy().into_owned();
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let existing: Option<String> = guard
            .query_row("SELECT lock_json FROM locks WHERE stack_root = ?1", params![stack_root_key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;
        if let Some(json) = existing {
            let current: Lock = serde_json::from_str(&json).map_err(SqliteStoreError::from)?;
            if current.owner != *owner {
                return Err(LockError::Held {
                    owner: current.owner,
                    acquired_at: current.acquired_at,
                });
            }
        }
        guard
            .execute("DELETE FROM locks WHERE stack_root = ?1", params![stack_root_key])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn current(&self, stack_root: &Path) -> Result<Option<Lock>, LockError> {
        let stack_root_key = stack_root.to_string_lossy().into_owned();
        let guard = self.connection.lock().map_err(lock_poisoned)?;
        let row: Option<String> = guard
            .query_row("SELECT lock_json FROM locks WHERE stack_root = ?1", params![stack_root_key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;
        row.map(|json| serde_json::from_str(&json).map_err(SqliteStoreError::from).map_err(LockError::from))
            .transpose()
    }
}

/// Converts a poisoned mutex into a [`LockError`].
fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> LockError {
    LockError::Store("store connection mutex poisoned".to_string())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    use time::OffsetDateTime;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(seconds))
    }

    #[test]
    fn acquire_then_release_round_trips() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let root = Path::new("/stacks/demo");
        let owner = LockOwner::new("runner-a");
        let lock = store.acquire(root, &owner, 1_800, false, ts(0)).expect("acquire");
        assert_eq!(lock.owner, owner);
        store.release(root, &owner).expect("release");
        assert!(store.current(root).expect("current").is_none());
    }

    #[test]
    fn second_owner_is_rejected_while_lock_is_live() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let root = Path::new("/stacks/demo");
        let first = LockOwner::new("runner-a");
        let second = LockOwner::new("runner-b");
        store.acquire(root, &first, 1_800, false, ts(0)).expect("first acquires");
        let err = store.acquire(root, &second, 1_800, false, ts(10)).expect_err("held");
        assert!(matches!(err, LockError::Held { .. }));
    }

    #[test]
    fn stale_lock_can_be_taken_over() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let root = Path::new("/stacks/demo");
        let first = LockOwner::new("runner-a");
        let second = LockOwner::new("runner-b");
        store.acquire(root, &first, 60, false, ts(0)).expect("first acquires");
        let lock = store.acquire(root, &second, 60, true, ts(1_000)).expect("takeover succeeds");
        assert_eq!(lock.owner, second);
    }

    #[test]
    fn heartbeat_updates_heartbeat_at() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let root = Path::new("/stacks/demo");
        let owner = LockOwner::new("runner-a");
        store.acquire(root, &owner, 1_800, false, ts(0)).expect("acquire");
        store.heartbeat(root, &owner, ts(600)).expect("heartbeat");
        let current = store.current(root).expect("current").expect("present");
        assert_eq!(current.heartbeat_at, ts(600));
    }
}
