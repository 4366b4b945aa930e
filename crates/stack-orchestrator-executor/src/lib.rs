// stack-orchestrator-executor/src/lib.rs
// ============================================================================
// Crate: stack-orchestrator-executor
// Description: `ExecutorAdapter` implementations: a real Helm-backed adapter
//              and a scripted fake for tests.
// Purpose: Implements spec §4.8 (Executor Adapter) and its error
//          classification table.
// Dependencies: stack-orchestrator-core
// ============================================================================

//! ## Overview
//! [`helm::HelmExecutorAdapter`] is the production adapter; it shells out to
//! a `helm` binary and classifies failures via [`classify::classify`].
//! [`fake::FakeExecutorAdapter`] scripts outcomes per node id for scheduler
//! and CLI tests that must not depend on a real Helm/Kubernetes stack.

pub mod classify;
pub mod fake;
pub mod helm;

pub use classify::classify;
pub use fake::FakeExecutorAdapter;
pub use fake::RecordedCall;
pub use fake::ScriptedResult;
pub use helm::HelmExecutorAdapter;
