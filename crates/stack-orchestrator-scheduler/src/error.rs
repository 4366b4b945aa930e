// stack-orchestrator-scheduler/src/error.rs
// ============================================================================
// Module: Scheduler Error
// Description: Top-level error type for a scheduler run.
// Purpose: Aggregates the store and lock errors a run can surface on top of
//          the node-level errors already carried on run events (spec §7).
// Dependencies: stack-orchestrator-core
// ============================================================================

use thiserror::Error;

use stack_orchestrator_core::interfaces::StoreError;

/// Errors raised by [`crate::Supervisor::run`] itself, as opposed to
/// per-node [`stack_orchestrator_core::interfaces::NodeError`]s, which are
/// always captured as `NODE_FAILED` events rather than propagated (spec §7
/// "Per-node errors are events in the run log, never panics").
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The run store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The supervisor's own mutex was poisoned by a panicking worker
    /// thread.
    #[error("supervisor state mutex poisoned")]
    StatePoisoned,
}
