// stack-orchestrator-core/src/interfaces/mod.rs
// ============================================================================
// Module: Interfaces
// Description: Backend-agnostic interfaces for rendering, execution, and
//              durable storage.
// Purpose: Define the contract surfaces used by the orchestrator runtime,
//          kept free of any concrete Helm/Kubernetes/SQLite dependency.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the orchestrator integrates with external systems
//! without embedding backend-specific details in `core` or `runtime`.
//! Implementations must be deterministic and fail closed on missing or
//! invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ErrorClass;
use crate::core::Lock;
use crate::core::LockOwner;
use crate::core::Run;
use crate::core::RunEvent;
use crate::core::RunId;
use crate::core::RunSummary;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Chart Renderer
// ============================================================================

/// Chart rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer reported an error.
    #[error("chart render error: {0}")]
    Render(String),
}

/// Renders a chart against its resolved values, used by the Dependency
/// Inferencer (spec §4.3). Kept behind a trait so `core` never shells out to
/// `helm template` directly.
pub trait ChartRenderer {
    /// Renders the chart at `chart_ref` with the given values files and set
    /// overrides, returning the concatenated manifest YAML documents.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when rendering fails.
    fn render(
        &self,
        chart_ref: &str,
        values_files: &[std::path::PathBuf],
        set_overrides: &std::collections::BTreeMap<String, String>,
    ) -> Result<Vec<String>, RenderError>;
}

/// A [`ChartRenderer`] that never renders anything, used when dependency
/// inference is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChartRenderer;

impl ChartRenderer for NullChartRenderer {
    fn render(
        &self,
        _chart_ref: &str,
        _values_files: &[std::path::PathBuf],
        _set_overrides: &std::collections::BTreeMap<String, String>,
    ) -> Result<Vec<String>, RenderError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Content Sources (Effective Input Hasher backends)
// ============================================================================

/// Errors raised while gathering raw content for the Effective Input Hasher
/// (spec §4.5).
#[derive(Debug, Error)]
pub enum ContentSourceError {
    /// The chart tree could not be digested.
    #[error("chart digest error: {0}")]
    Chart(String),
    /// A values file could not be read.
    #[error("values file read error: {0}")]
    ValuesFile(String),
}

/// Supplies the content hash of a resolved chart tree.
pub trait ChartDigestSource {
    /// Returns a content digest for the chart tree referenced by
    /// `chart_ref`/`resolved_version`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentSourceError::Chart`] when the chart cannot be
    /// located or read.
    fn chart_digest(
        &self,
        chart_ref: &str,
        resolved_version: Option<&str>,
    ) -> Result<crate::core::HashDigest, ContentSourceError>;
}

/// Supplies raw bytes for a values file path, relative to the stack root.
pub trait ValuesContentSource {
    /// Reads the bytes of the values file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentSourceError::ValuesFile`] when the file cannot be
    /// read.
    fn read(&self, path: &std::path::Path) -> Result<Vec<u8>, ContentSourceError>;
}

// ============================================================================
// SECTION: Executor Adapter
// ============================================================================

/// Executor adapter errors, carrying the classification used for retry
/// decisions (spec §4.8).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NodeError {
    /// Error classification.
    pub class: ErrorClass,
    /// Raw error message, as returned by the underlying Helm invocation.
    pub message: String,
}

impl NodeError {
    /// Builds a node error from an already-classified message. Classification
    /// itself is a free function kept in the executor crate so it can be
    /// exhaustively tested against the preserved substring table.
    #[must_use]
    pub const fn new(class: ErrorClass, message: String) -> Self {
        Self { class, message }
    }
}

/// Outcome of a single Helm invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether the release reached the desired state.
    pub succeeded: bool,
    /// Human-readable detail, logged onto the run event.
    pub detail: String,
}

/// Translates a [`crate::core::ResolvedRelease`] into a single Helm
/// invocation: upgrade-install for apply, uninstall for delete (spec §4.8).
/// Implementations include a real Helm-backed adapter and a fake for tests.
pub trait ExecutorAdapter: Send + Sync {
    /// Applies (upgrade-installs) a node.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the invocation fails; callers classify and
    /// retry based on `NodeError::class`.
    fn apply(
        &self,
        node: &crate::core::ResolvedRelease,
        cancel: &crate::runtime::cancellation::CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError>;

    /// Deletes (uninstalls) a node.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the invocation fails.
    fn delete(
        &self,
        node: &crate::core::ResolvedRelease,
        cancel: &crate::runtime::cancellation::CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError>;
}

// ============================================================================
// SECTION: Run / Event / Summary Store
// ============================================================================

/// Durable store errors (spec §4.6).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("run state store io error: {0}")]
    Io(String),
    /// Event chain failed to verify.
    #[error("run state store integrity error: {0}")]
    Integrity(String),
    /// Store schema version is incompatible.
    #[error("run state store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("run state store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("run state store error: {0}")]
    Store(String),
}

/// Durable, single-writer-per-stack-root store for runs, events, and
/// summaries (spec §4.6).
pub trait RunStore: Send + Sync {
    /// Persists a newly created run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Loads a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;

    /// Loads the most recently created run for a stack root.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn latest_run(&self, stack_root: &std::path::Path) -> Result<Option<Run>, StoreError>;

    /// Appends an event. The caller is responsible for computing
    /// `prev_hash`/`self_hash` before calling this method; the store only
    /// enforces that `seq` is contiguous.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or `seq` is non-
    /// contiguous.
    fn append_event(&self, event: &RunEvent) -> Result<(), StoreError>;

    /// Loads all events for a run, in `seq` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>, StoreError>;

    /// Writes (or overwrites) the current summary snapshot for a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError>;

    /// Loads the most recent summary snapshot for a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_summary(&self, run_id: &RunId) -> Result<Option<RunSummary>, StoreError>;
}

// ============================================================================
// SECTION: Lock Manager
// ============================================================================

/// Lock manager errors (spec §4.9, §7).
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds a live (non-stale) lock.
    #[error("lock held by {owner} since {acquired_at}")]
    Held {
        /// Current lock owner.
        owner: LockOwner,
        /// When the current holder acquired the lock.
        acquired_at: Timestamp,
    },
    /// The lock store reported an error.
    #[error("lock store error: {0}")]
    Store(String),
}

/// Enforces at-most-one concurrent orchestrator run per stack root (spec
/// §4.9).
pub trait LockManager: Send + Sync {
    /// Attempts to acquire the lock for `stack_root`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when a live lock exists and `takeover` is
    /// false or the lock is not stale. Returns [`LockError::Store`] on
    /// backing-store failure.
    fn acquire(
        &self,
        stack_root: &std::path::Path,
        owner: &LockOwner,
        ttl_seconds: u64,
        takeover: bool,
        now: Timestamp,
    ) -> Result<Lock, LockError>;

    /// Updates `heartbeat_at` for a held lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] on backing-store failure.
    fn heartbeat(
        &self,
        stack_root: &std::path::Path,
        owner: &LockOwner,
        now: Timestamp,
    ) -> Result<(), LockError>;

    /// Releases a held lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] on backing-store failure.
    fn release(&self, stack_root: &std::path::Path, owner: &LockOwner) -> Result<(), LockError>;

    /// Reads the current lock row, if any, without attempting to acquire it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] on backing-store failure.
    fn current(&self, stack_root: &std::path::Path) -> Result<Option<Lock>, LockError>;
}
