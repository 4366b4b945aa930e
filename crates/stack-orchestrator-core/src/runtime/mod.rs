// stack-orchestrator-core/src/runtime/mod.rs
// ============================================================================
// Module: Runtime
// Description: Compiler, selector, hasher, inferencer, resume/drift, and
//              seal/bundle logic operating over the core data model.
// Purpose: The orchestrator's actual behavior, built on inert `core` types.
// ============================================================================

pub mod cancellation;
pub mod compiler;
pub mod dag;
pub mod hasher;
pub mod inferencer;
pub mod resume;
pub mod seal;
pub mod selector;

pub use cancellation::CancellationToken;
pub use compiler::CompileError;
pub use compiler::compile;
pub use dag::DagError;
pub use dag::topological_layers;
pub use dag::would_create_cycle;
pub use hasher::EffectiveInputError;
pub use hasher::HashContext;
pub use inferencer::InferError;
pub use inferencer::InferenceOptions;
pub use inferencer::infer;
pub use resume::DriftEntry;
pub use resume::ResumeDecision;
pub use resume::ResumeError;
pub use resume::resume;
pub use seal::JsonlEventLog;
pub use seal::JsonlEventLogError;
pub use seal::SealError;
pub use seal::seal;
pub use seal::unpack_plan;
pub use seal::verify as verify_bundle;
pub use selector::SelectError;
pub use selector::SelectorExpression;
pub use selector::select;
