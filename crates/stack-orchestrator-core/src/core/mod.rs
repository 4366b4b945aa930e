// stack-orchestrator-core/src/core/mod.rs
// ============================================================================
// Module: Core
// Description: Data model, identifiers, hashing, and time primitives.
// Purpose: Inert building blocks shared by every runtime component.
// ============================================================================

pub mod chain;
pub mod hashing;
pub mod identifiers;
pub mod model;
pub mod time;

pub use chain::ChainError;
pub use chain::compute_self_hash;
pub use chain::verify_chain;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::ClusterName;
pub use identifiers::LockOwner;
pub use identifiers::Namespace;
pub use identifiers::NodeId;
pub use identifiers::ParallelismGroup;
pub use identifiers::ProfileName;
pub use identifiers::ReleaseName;
pub use identifiers::RunId;
pub use identifiers::StackName;
pub use model::ApplyOptions;
pub use model::Attestation;
pub use model::BinaryIdentity;
pub use model::Command;
pub use model::DeleteOptions;
pub use model::Edge;
pub use model::EffectiveInput;
pub use model::ErrorClass;
pub use model::EventError;
pub use model::FailMode;
pub use model::GitIdentity;
pub use model::InferredNeed;
pub use model::InferredReason;
pub use model::InputManifestEntry;
pub use model::Lock;
pub use model::NodeLifecycle;
pub use model::NodeStatus;
pub use model::Plan;
pub use model::RawRelease;
pub use model::ReleaseDefaults;
pub use model::ResolvedRelease;
pub use model::Run;
pub use model::RunEvent;
pub use model::RunEventKind;
pub use model::RunStatus;
pub use model::RunSummary;
pub use model::RunTotals;
pub use model::RunnerConfig;
pub use model::SealedBundle;
pub use model::SelectorSnapshot;
pub use model::Universe;
pub use model::ValuesFileDigest;
pub use model::VerifyOptions;
pub use model::BUNDLE_API_VERSION;
pub use model::DEFAULT_LOCK_TTL_SECONDS;
pub use time::Clock;
pub use time::FixedClock;
pub use time::SystemClock;
pub use time::Timestamp;
