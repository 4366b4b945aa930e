// stack-orchestrator-core/src/lib.rs
// ============================================================================
// Crate: stack-orchestrator-core
// Description: Backend-agnostic data model, interfaces, and runtime logic for
//              the stack orchestrator: compiling, selecting, hashing,
//              inferring, resuming, and sealing a dependency-ordered plan of
//              Helm releases.
// Purpose: No concrete Helm, Kubernetes, or storage backend lives here; this
//          crate defines the contracts those backends implement.
// ============================================================================

//! Core data model and runtime logic for the stack orchestrator.
//!
//! This crate has no knowledge of Helm binaries, Kubernetes clusters, or
//! SQLite files. It defines:
//!
//! - [`core`]: the inert, canonically-hashable data model (`Universe`,
//!   `Plan`, `ResolvedRelease`, `Run`, `RunEvent`, `Lock`, ...).
//! - [`interfaces`]: the trait seams other crates implement
//!   (`ChartRenderer`, `ExecutorAdapter`, `RunStore`, `LockManager`).
//! - [`runtime`]: the compiler, selector, effective-input hasher,
//!   dependency inferencer, resume/drift engine, and seal/bundle logic that
//!   operate purely over the data model and interfaces above.

pub mod core;
pub mod interfaces;
pub mod runtime;
