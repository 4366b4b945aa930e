// stack-orchestrator-scheduler/src/lib.rs
// ============================================================================
// Crate: stack-orchestrator-scheduler
// Description: DAG runner with ready-queue, concurrency gates, progressive
//              worker pool, retry/backoff, and fail-fast/continue modes.
// Purpose: Implements spec §4.7 and the concurrency model of spec §5, over
//          the backend-agnostic traits defined in stack-orchestrator-core.
// Dependencies: stack-orchestrator-core
// ============================================================================

//! ## Overview
//! [`state::SupervisorState`] holds the pure scheduling arithmetic (ready
//! queue, in-degree, gates, ramp); [`Supervisor`] wraps it in a
//! `Mutex`/`Condvar` pair and drives a pool of worker threads against a
//! [`stack_orchestrator_core::interfaces::ExecutorAdapter`], persisting
//! every transition through a
//! [`stack_orchestrator_core::interfaces::RunStore`] (spec §5: "workers
//! communicate with the supervisor through a protected critical section
//! rather than through channels, so gate decisions are transactional").
//!
//! Cancellation does not need its own handle type: callers share a
//! [`Supervisor`] across threads behind an `Arc` and call
//! [`Supervisor::cancel`] from any clone, the same way they would signal any
//! other `Arc`-shared, interior-mutable component.

pub mod backoff;
pub mod config;
pub mod error;
pub mod gates;
pub mod ramp;
pub mod state;
pub mod supervisor;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use supervisor::Supervisor;
