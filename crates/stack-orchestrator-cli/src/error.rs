// stack-orchestrator-cli/src/error.rs
// ============================================================================
// Module: Orchestrator Error
// Description: Top-level error type aggregating every component's error via
//              `#[from]`.
// Purpose: Implements the error taxonomy of spec §7, propagated unchanged
//          from the supervisor and every other component up to the CLI
//          driver, which turns the final variant into an exit code and a
//          one-line failure header.
// Dependencies: stack-orchestrator-config, stack-orchestrator-core,
//               stack-orchestrator-executor, stack-orchestrator-scheduler,
//               stack-orchestrator-store-sqlite, thiserror
// ============================================================================

use thiserror::Error;

use stack_orchestrator_config::ConfigError;
use stack_orchestrator_core::core::HashError;
use stack_orchestrator_core::core::RunId;
use stack_orchestrator_core::interfaces::LockError;
use stack_orchestrator_core::interfaces::StoreError;
use stack_orchestrator_core::runtime::CompileError;
use stack_orchestrator_core::runtime::DagError;
use stack_orchestrator_core::runtime::DriftEntry;
use stack_orchestrator_core::runtime::EffectiveInputError;
use stack_orchestrator_core::runtime::InferError;
use stack_orchestrator_core::runtime::ResumeError;
use stack_orchestrator_core::runtime::SealError;
use stack_orchestrator_core::runtime::SelectError;
use stack_orchestrator_scheduler::SchedulerError;
use stack_orchestrator_store_sqlite::SqliteStoreError;

/// Aggregate error type for every command (spec §7 taxonomy).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Discovery or compile failure; fatal, no run is created.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Canonicalization of a plan or event failed while hashing.
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
    /// Structural plan fault: a dependency cycle.
    #[error("cycle error: {0:?}")]
    Cycle(#[from] DagError),
    /// Structural plan fault surfaced by the compiler.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    /// The selector matched no releases or referenced unknown names.
    #[error("selection error: {0}")]
    Selection(#[from] SelectError),
    /// Dependency inference failed while rendering a chart.
    #[error("inference error: {0}")]
    Infer(#[from] InferError),
    /// Effective input hashing failed to gather chart or values content.
    #[error("effective input error: {0}")]
    EffectiveInput(#[from] EffectiveInputError),
    /// Another run holds the lock (fatal unless `takeover` applies).
    #[error("{0}")]
    Lock(#[from] LockError),
    /// The durable store reported an error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The `SQLite` backend reported an error before it could be mapped onto
    /// [`StoreError`]/[`LockError`].
    #[error("sqlite error: {0}")]
    SqliteStore(#[from] SqliteStoreError),
    /// The scheduler reported a fatal error (distinct from a per-node
    /// `NODE_FAILED` event, which is recorded in the run log instead).
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// Event chain integrity failed, or stored hashes drifted from the
    /// recomputed ones, while loading a prior run for resume.
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),
    /// Drift was detected and `allowDrift` was not set.
    #[error("drift detected against run {run_id}: {entries:?}")]
    Drift {
        /// The prior run drift was computed against.
        run_id: RunId,
        /// The detected differences.
        entries: Vec<DriftEntry>,
    },
    /// Sealing or unsealing a run bundle failed.
    #[error("seal error: {0}")]
    Seal(#[from] SealError),
    /// No prior run exists to resume.
    #[error("no prior run found for stack root")]
    NoPriorRun,
    /// At least one node failed during the run.
    #[error("run {run_id} finished with failures")]
    RunFailed {
        /// The run that finished with failures.
        run_id: RunId,
    },
    /// A bundle file could not be read or written.
    #[error("bundle io error: {0}")]
    BundleIo(String),
}
