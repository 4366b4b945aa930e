// stack-orchestrator-core/src/core/model.rs
// ============================================================================
// Module: Data Model
// Description: Universe, Plan, ResolvedRelease, EffectiveInput, Run, RunEvent,
//              RunSummary, Lock, and SealedBundle entities.
// Purpose: Plain, serializable, canonically-hashable types with no owning
//          references between nodes.
// Dependencies: crate::core::identifiers, crate::core::hashing, crate::core::time
// ============================================================================

//! ## Overview
//! These types are intentionally inert: construction, validation, and
//! mutation live in `runtime::*`. The DAG is represented as a flat node list
//! plus an edge list (see [`Edge`]), never as nodes holding references to
//! each other, so the whole plan stays trivially `Clone` and
//! canonically-hashable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ClusterName;
use crate::core::identifiers::LockOwner;
use crate::core::identifiers::Namespace;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::ParallelismGroup;
use crate::core::identifiers::ProfileName;
use crate::core::identifiers::ReleaseName;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StackName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Git Identity
// ============================================================================

/// Resolved `{commit, dirty}` pair for a git-controlled tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    /// Commit hash, or `"unknown"` when it could not be resolved.
    pub commit: String,
    /// Whether the working tree has uncommitted changes.
    pub dirty: bool,
}

impl GitIdentity {
    /// The identity used when git state cannot be resolved at all.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            commit: "unknown".to_string(),
            dirty: true,
        }
    }
}

/// Identity of the orchestrator binary itself, stamped onto every plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryIdentity {
    /// Orchestrator crate version.
    pub version: String,
    /// Orchestrator binary's own git commit, when known.
    pub commit: String,
}

// ============================================================================
// SECTION: Universe
// ============================================================================

/// Default values layered under stack and profile scopes during compilation
/// (spec §4.2 Algorithm steps 1–2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDefaults {
    /// Values files appended for every release in scope.
    pub values_files: Vec<PathBuf>,
    /// Set overrides merged key-wise (scope wins on conflict).
    pub set_overrides: BTreeMap<String, String>,
    /// Tags concatenated and de-duplicated.
    pub tags: Vec<String>,
    /// Apply options, applied when a release does not override them.
    pub apply_options: Option<ApplyOptions>,
    /// Delete options, applied when a release does not override them.
    pub delete_options: Option<DeleteOptions>,
    /// Verify options, applied when a release does not override them.
    pub verify_options: Option<VerifyOptions>,
}

/// Immutable set of parsed stack and release definitions rooted at a
/// directory, produced by Universe Discovery (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    /// Absolute path to the stack root directory.
    pub root: PathBuf,
    /// Name of the stack, taken from the stack definition file.
    pub stack_name: StackName,
    /// Clusters declared by the stack definition.
    pub clusters: Vec<ClusterName>,
    /// Profile names available for this stack.
    pub profiles: Vec<ProfileName>,
    /// Default profile name, if one is declared.
    pub default_profile: Option<ProfileName>,
    /// Stack-level defaults, overlaid first.
    pub stack_defaults: ReleaseDefaults,
    /// Profile-scoped defaults, overlaid over stack defaults when that
    /// profile is selected.
    pub profile_defaults: BTreeMap<ProfileName, ReleaseDefaults>,
    /// Raw, unmerged release declarations discovered on disk.
    pub releases: Vec<RawRelease>,
}

/// A release declaration as discovered, before profile/stack defaults are
/// merged in by the Compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRelease {
    /// Release name, unique within its cluster scope.
    pub name: ReleaseName,
    /// Cluster the release targets.
    pub cluster: ClusterName,
    /// Namespace the release targets.
    pub namespace: Namespace,
    /// Chart reference (repo alias + chart name, or local path).
    pub chart: String,
    /// Requested chart version, if pinned.
    pub chart_version: Option<String>,
    /// Absolute paths to values files, in declaration order.
    pub values_files: Vec<PathBuf>,
    /// `--set` style key/value overrides.
    pub set_overrides: BTreeMap<String, String>,
    /// Free-form tags used by the Selector.
    pub tags: Vec<String>,
    /// Declared dependency names (other releases in the same cluster).
    pub needs: Vec<ReleaseName>,
    /// Apply options, if overridden at the release level.
    pub apply_options: Option<ApplyOptions>,
    /// Delete options, if overridden at the release level.
    pub delete_options: Option<DeleteOptions>,
    /// Verify options, if overridden at the release level.
    pub verify_options: Option<VerifyOptions>,
    /// Parallelism group, if assigned.
    pub parallelism_group: Option<ParallelismGroup>,
    /// The file this release was declared in, for diagnostics and the
    /// Selector's `fromPaths`/`gitRange` filters.
    pub source_path: PathBuf,
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options controlling a Helm apply (upgrade-install) invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Roll back automatically on failure.
    pub atomic: bool,
    /// Wait for resources to reach a ready state before returning.
    pub wait: bool,
    /// Apply timeout in seconds. Spec default: 300 (5 minutes).
    pub timeout_seconds: u64,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            wait: true,
            timeout_seconds: 300,
        }
    }
}

/// Options controlling a Helm uninstall invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Wait for resources to be torn down before returning.
    pub wait: bool,
    /// Delete timeout in seconds. Spec default: 300 (5 minutes).
    pub timeout_seconds: u64,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout_seconds: 300,
        }
    }
}

/// Options controlling post-apply verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Whether verification runs at all.
    pub enabled: bool,
    /// Verification timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 60,
        }
    }
}

// ============================================================================
// SECTION: Resolved Release (Node)
// ============================================================================

/// Reason an inferred dependency edge was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredReason {
    /// A rendered workload references another release's primary `Service`.
    ServiceReference,
    /// A rendered workload mounts a `ConfigMap` or `Secret` another release
    /// owns.
    ConfigReference,
    /// The edge was considered but dropped because it would form a cycle.
    CycleAvoided,
}

/// A single inferred dependency, with the reason it was added (or why it was
/// dropped, when `dropped` is set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredNeed {
    /// The release this node was inferred to depend on.
    pub on: ReleaseName,
    /// Why the edge was proposed.
    pub reason: InferredReason,
    /// Set when the edge was proposed but not added (see
    /// [`InferredReason::CycleAvoided`]).
    pub dropped: bool,
}

/// A single release fully expanded into a plan node (spec §3
/// `ResolvedRelease`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRelease {
    /// Globally deterministic id: `cluster/namespace/name`.
    pub id: NodeId,
    /// Release name.
    pub name: ReleaseName,
    /// Target cluster.
    pub cluster: ClusterName,
    /// Target namespace.
    pub namespace: Namespace,
    /// Chart reference.
    pub chart: String,
    /// Requested chart version.
    pub chart_version: Option<String>,
    /// Chart version actually resolved (pinned once resolved).
    pub resolved_chart_version: Option<String>,
    /// Ordered, de-duplicated values file paths.
    pub values_files: Vec<PathBuf>,
    /// Merged `--set` overrides, stack defaults and profile defaults
    /// shadowed by more specific scopes.
    pub set_overrides: BTreeMap<String, String>,
    /// Merged, de-duplicated tags.
    pub tags: Vec<String>,
    /// Declared dependency names.
    pub needs: Vec<ReleaseName>,
    /// Inferred dependencies, with provenance.
    pub inferred_needs: Vec<InferredNeed>,
    /// Resolved apply options.
    pub apply_options: ApplyOptions,
    /// Resolved delete options.
    pub delete_options: DeleteOptions,
    /// Resolved verify options.
    pub verify_options: VerifyOptions,
    /// Parallelism group, if assigned.
    pub parallelism_group: Option<ParallelismGroup>,
    /// Effective input and its hash, computed post-selection.
    pub effective_input: Option<EffectiveInput>,
}

impl ResolvedRelease {
    /// Returns all dependency names this node requires before it may run:
    /// declared needs plus non-dropped inferred needs.
    #[must_use]
    pub fn all_needs(&self) -> Vec<ReleaseName> {
        let mut needs = self.needs.clone();
        for inferred in &self.inferred_needs {
            if !inferred.dropped {
                needs.push(inferred.on.clone());
            }
        }
        needs
    }
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// A directed edge between two nodes, stored by id rather than by owning
/// reference so the plan remains a flat, clonable value (design notes:
/// "Cyclic references").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Id of the dependency (must run first).
    pub from_id: NodeId,
    /// Id of the dependent (runs after `from_id`).
    pub to_id: NodeId,
}

/// Runner configuration resolved for a plan: concurrency defaults and gate
/// limits (spec §4.7 / §5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Global worker count ceiling.
    pub concurrency: u32,
    /// Whether progressive/adaptive concurrency ramp-up is enabled.
    pub progressive: bool,
    /// Per-namespace in-flight ceiling, if configured.
    pub max_parallel_per_namespace: Option<u32>,
    /// Per-primary-kind in-flight ceiling, by kind name.
    pub max_parallel_kind: BTreeMap<String, u32>,
    /// Per-parallelism-group in-flight ceiling.
    pub parallelism_group_limit: Option<u32>,
    /// Maximum retry attempts per node.
    pub max_attempts: u32,
    /// Fail mode: stop on first failure, or continue unaffected branches.
    pub fail_mode: FailMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            progressive: false,
            max_parallel_per_namespace: None,
            max_parallel_kind: BTreeMap::new(),
            parallelism_group_limit: None,
            max_attempts: 1,
            fail_mode: FailMode::FailFast,
        }
    }
}

/// Scheduler fail-mode (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailMode {
    /// Stop dispatching new nodes on the first failure.
    FailFast,
    /// Keep scheduling unaffected branches.
    Continue,
}

/// A resolved, topologically valid set of releases (spec §3 `Plan`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan nodes, in a stable, deterministic order (lexicographic by id).
    pub nodes: Vec<ResolvedRelease>,
    /// Dependency edges over declared ∪ inferred needs.
    pub edges: Vec<Edge>,
    /// Root directory the plan was compiled from.
    pub stack_root: PathBuf,
    /// Stack name.
    pub stack_name: StackName,
    /// Active profile, if any.
    pub profile: Option<ProfileName>,
    /// Resolved runner configuration.
    pub runner: RunnerConfig,
    /// Execution groups: a valid topological layering, each entry a list of
    /// node ids that may run concurrently once their predecessors are done.
    pub execution_groups: Vec<Vec<NodeId>>,
}

impl Plan {
    /// Builds the `id -> index` map used for O(1) node lookup.
    #[must_use]
    pub fn index_of(&self) -> BTreeMap<NodeId, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id.clone(), idx))
            .collect()
    }

    /// Looks a node up by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ResolvedRelease> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Builds a `name -> id` map, scoped by cluster, for resolving `needs`.
    #[must_use]
    pub fn name_index(&self) -> BTreeMap<(ClusterName, ReleaseName), NodeId> {
        self.nodes
            .iter()
            .map(|node| ((node.cluster.clone(), node.name.clone()), node.id.clone()))
            .collect()
    }
}

// ============================================================================
// SECTION: Effective Input
// ============================================================================

/// Content digest for a single values file, keyed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuesFileDigest {
    /// Path relative to the stack root.
    pub path: String,
    /// Content digest, present unless `includeValuesContents` is disabled.
    pub digest: Option<HashDigest>,
}

/// The content-addressed inputs that determine a node's deployment outcome
/// (spec §3 `EffectiveInput`, §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveInput {
    /// Stack root git identity at hash time.
    pub stack_git: GitIdentity,
    /// Orchestrator binary identity at hash time.
    pub binary: BinaryIdentity,
    /// Node id this input belongs to.
    pub node_id: NodeId,
    /// Content hash of the resolved chart tree.
    pub chart_digest: HashDigest,
    /// Chart reference as declared.
    pub chart_ref: String,
    /// Chart version as requested.
    pub requested_version: Option<String>,
    /// Chart version as resolved.
    pub resolved_version: Option<String>,
    /// Per-values-file digests, in canonical order.
    pub values: Vec<ValuesFileDigest>,
    /// Digest of the sorted set-override map.
    pub set_overrides_digest: HashDigest,
    /// Digest of `{cluster, kube_context, namespace}`.
    pub cluster_target_digest: HashDigest,
    /// Digest of canonicalized apply options.
    pub apply_options_digest: HashDigest,
    /// Digest of canonicalized delete options.
    pub delete_options_digest: HashDigest,
    /// Digest of canonicalized verify options.
    pub verify_options_digest: HashDigest,
    /// The final combined hash: the node's effective input hash.
    pub hash: HashDigest,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// Top-level command a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Apply (upgrade-install) the selected releases.
    Apply,
    /// Delete (uninstall) the selected releases, in reverse dependency
    /// order.
    Delete,
}

/// A snapshot of the selector expression used to build a run's plan, stored
/// for resume/audit purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSnapshot {
    /// Selected cluster names, empty meaning "all".
    pub clusters: Vec<ClusterName>,
    /// Selected tags.
    pub tags: Vec<String>,
    /// Selected source paths.
    pub from_paths: Vec<String>,
    /// Selected release names.
    pub release_names: Vec<ReleaseName>,
    /// Git range expression, if any.
    pub git_range: Option<String>,
    /// Whether predecessor closure was requested.
    pub include_deps: bool,
    /// Whether successor closure was requested.
    pub include_dependents: bool,
}

/// One execution of a plan (spec §3 `Run`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier: `YYYY-MM-DDTHH-MM-SS.NNNNNNNNNZ`.
    pub run_id: RunId,
    /// Command this run executes.
    pub command: Command,
    /// Profile used, if any.
    pub profile: Option<ProfileName>,
    /// Selector snapshot used to build this run's plan.
    pub selector: SelectorSnapshot,
    /// Configured concurrency.
    pub concurrency: u32,
    /// Configured fail mode.
    pub fail_mode: FailMode,
    /// Canonical plan JSON, sealed at run creation time.
    pub sealed_plan_json: String,
    /// Hash of the canonical plan JSON.
    pub plan_hash: HashDigest,
    /// The prior run this run resumes, if any.
    pub resumes: Option<RunId>,
}

// ============================================================================
// SECTION: Run Event
// ============================================================================

/// Discriminant for a [`RunEvent`] (spec §6 Event record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEventKind {
    /// The run has started.
    RunStarted,
    /// A node has begun executing an attempt.
    NodeRunning,
    /// A node attempt succeeded.
    NodeSucceeded,
    /// A node attempt failed.
    NodeFailed,
    /// A retry has been scheduled for a node.
    NodeRetryScheduled,
    /// A node was blocked because a predecessor failed or was blocked.
    NodeBlocked,
    /// The run has reached a terminal state.
    RunCompleted,
}

/// Error classification attached to a failed node event (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Throttling signature (e.g. "429", "too many requests").
    RateLimit,
    /// Context-deadline signature.
    Timeout,
    /// Connection-reset / EOF / I/O timeout signature.
    Transport,
    /// HTTP 5xx signature.
    Server5xx,
    /// Service-unavailable signature.
    Unavailable,
    /// None of the above.
    Other,
}

impl ErrorClass {
    /// Whether this class is retryable (all but [`ErrorClass::Other`]).
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Structured error attached to a [`RunEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Error classification.
    pub class: ErrorClass,
    /// Raw error message, as returned by the executor adapter.
    pub message: String,
}

/// A single append-only event in a run's hash-chained log (spec §3
/// `RunEvent`, §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Monotonic sequence number within the run, starting at 0.
    pub seq: u64,
    /// Event timestamp.
    pub ts: Timestamp,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: RunEventKind,
    /// Node this event concerns, when applicable.
    pub node_id: Option<NodeId>,
    /// Attempt counter, 1-based, when applicable.
    pub attempt: Option<u32>,
    /// Free-form human-readable message.
    pub message: String,
    /// Structured error, present on `NODE_FAILED` events.
    pub error: Option<EventError>,
    /// Hash of the previous event's body (or of the empty string for the
    /// first event).
    pub prev_hash: HashDigest,
    /// Hash of this event's own canonical body, chained to `prev_hash`.
    pub self_hash: HashDigest,
}

/// The canonicalizable portion of a [`RunEvent`]: everything except
/// `self_hash`, which commits to this body.
#[derive(Debug, Clone, Serialize)]
pub struct RunEventBody<'a> {
    /// See [`RunEvent::run_id`].
    pub run_id: &'a RunId,
    /// See [`RunEvent::seq`].
    pub seq: u64,
    /// See [`RunEvent::ts`].
    pub ts: &'a Timestamp,
    /// See [`RunEvent::kind`].
    #[serde(rename = "type")]
    pub kind: RunEventKind,
    /// See [`RunEvent::node_id`].
    pub node_id: &'a Option<NodeId>,
    /// See [`RunEvent::attempt`].
    pub attempt: Option<u32>,
    /// See [`RunEvent::message`].
    pub message: &'a str,
    /// See [`RunEvent::error`].
    pub error: &'a Option<EventError>,
    /// See [`RunEvent::prev_hash`].
    pub prev_hash: &'a HashDigest,
}

impl RunEvent {
    /// Returns the canonicalizable body this event's `self_hash` commits to.
    #[must_use]
    pub fn body(&self) -> RunEventBody<'_> {
        RunEventBody {
            run_id: &self.run_id,
            seq: self.seq,
            ts: &self.ts,
            kind: self.kind,
            node_id: &self.node_id,
            attempt: self.attempt,
            message: &self.message,
            error: &self.error,
            prev_hash: &self.prev_hash,
        }
    }
}

// ============================================================================
// SECTION: Run Summary
// ============================================================================

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is still in progress.
    Running,
    /// All nodes reached a terminal, non-failing state.
    Succeeded,
    /// At least one node failed and was not recovered.
    Failed,
    /// The run was cooperatively cancelled.
    Cancelled,
}

/// Per-node status recorded in a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node id.
    pub node_id: NodeId,
    /// Current lifecycle status.
    pub status: NodeLifecycle,
    /// Attempts made so far.
    pub attempt: u32,
    /// Last recorded error, if any.
    pub error: Option<EventError>,
}

/// Node lifecycle state machine (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLifecycle {
    /// Not yet dequeued.
    Planned,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed and exhausted retries (or non-retryable).
    Failed,
    /// Blocked because a predecessor failed or was blocked.
    Blocked,
}

/// Aggregate counts across all nodes in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Total nodes planned.
    pub planned: u32,
    /// Nodes that succeeded.
    pub succeeded: u32,
    /// Nodes that failed.
    pub failed: u32,
    /// Nodes that are blocked.
    pub blocked: u32,
    /// Nodes currently running.
    pub running: u32,
}

/// A point-in-time snapshot of run progress (spec §3 `RunSummary`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run this summary belongs to.
    pub run_id: RunId,
    /// Overall status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: Timestamp,
    /// When this snapshot was taken.
    pub updated_at: Timestamp,
    /// Aggregate totals.
    pub totals: RunTotals,
    /// Per-node status, in deterministic node order.
    pub nodes: Vec<NodeStatus>,
}

// ============================================================================
// SECTION: Lock
// ============================================================================

/// A durable mutex preventing concurrent orchestrator runs on the same stack
/// root (spec §3 `Lock`, §4.9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Stack root this lock guards.
    pub stack_root: PathBuf,
    /// Lock owner label.
    pub owner: LockOwner,
    /// Time-to-live in seconds before the lock is considered stale.
    pub ttl_seconds: u64,
    /// When the lock was acquired.
    pub acquired_at: Timestamp,
    /// When the lock was last heartbeated.
    pub heartbeat_at: Timestamp,
}

/// Default lock TTL: 30 minutes (spec §9, preserved verbatim).
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 30 * 60;

impl Lock {
    /// Whether the lock is stale as of `now`, i.e. `now - heartbeat_at >
    /// ttl`.
    #[must_use]
    pub fn is_stale(&self, now: Timestamp) -> bool {
        let elapsed = now.as_offset() - self.heartbeat_at.as_offset();
        elapsed.whole_seconds() > i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX)
    }

    /// Heartbeat cadence: `ttl / 3` (spec §9, preserved verbatim).
    #[must_use]
    pub const fn heartbeat_interval_seconds(&self) -> u64 {
        self.ttl_seconds / 3
    }
}

// ============================================================================
// SECTION: Sealed Bundle
// ============================================================================

/// Manifest entry for a single file packed into a sealed bundle's inputs
/// tarball.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputManifestEntry {
    /// Path relative to the stack root.
    pub path: String,
    /// Content digest.
    pub digest: HashDigest,
    /// File size in bytes.
    pub size: u64,
}

/// Attestation written alongside a sealed bundle (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Bundle format version.
    pub api_version: String,
    /// Hash of the canonical plan JSON.
    pub plan_hash: HashDigest,
    /// Hash over the concatenation of member digests in lexicographic
    /// member name order.
    pub bundle_digest: HashDigest,
    /// Stack root git identity at seal time.
    pub stack_git: GitIdentity,
    /// Orchestrator binary identity at seal time.
    pub binary: BinaryIdentity,
}

/// A reproducible artifact containing a plan, its inputs, and an
/// attestation, suitable for CI (spec §3 `SealedBundle`, §4.11).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBundle {
    /// Canonical plan JSON bytes.
    pub plan_json: Vec<u8>,
    /// Attestation for this bundle.
    pub attestation: Attestation,
    /// Manifest of files packed into the inputs tarball.
    pub inputs_manifest: Vec<InputManifestEntry>,
    /// Optional detached signature over the attestation.
    pub signature: Option<Vec<u8>>,
}

/// Bundle schema version written into [`Attestation::api_version`].
pub const BUNDLE_API_VERSION: &str = "stack-orchestrator/v1";
