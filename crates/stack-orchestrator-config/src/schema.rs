// stack-orchestrator-config/src/schema.rs
// ============================================================================
// Module: YAML Schema
// Description: Serde types mirroring the stack-definition YAML format (spec
//              §6 "Stack definition files").
// Purpose: Deserialization surface only; Discovery resolves these into
//          `stack_orchestrator_core::core` types.
// Dependencies: serde, serde_yaml
// ============================================================================

//! ## Overview
//! These types are the literal shape of `stack.yaml` and standalone release
//! files on disk. They carry relative paths and loosely-typed option blocks;
//! [`crate::discovery`] resolves paths to absolute and maps option blocks
//! onto `stack_orchestrator_core::core` option structs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Schema version stamped on every stack definition file (spec §6 addition:
/// `apiVersion: stack-orchestrator/v1`).
pub const SUPPORTED_API_VERSION: &str = "stack-orchestrator/v1";

/// Top-level stack definition file (`stack.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct StackFile {
    /// Schema version; must equal [`SUPPORTED_API_VERSION`].
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Stack name.
    #[serde(rename = "stackName")]
    pub stack_name: String,
    /// Declared clusters.
    pub clusters: Vec<ClusterEntry>,
    /// Default profile name, if any.
    #[serde(rename = "defaultProfile", default)]
    pub default_profile: Option<String>,
    /// Profile-scoped overlays, keyed by profile name.
    #[serde(default)]
    pub profiles: BTreeMap<String, ReleaseDefaultsYaml>,
    /// Stack-level defaults, overlaid first.
    #[serde(default)]
    pub defaults: ReleaseDefaultsYaml,
    /// Inline and file-referenced release declarations.
    #[serde(default)]
    pub releases: Vec<ReleaseEntry>,
}

/// A declared cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterEntry {
    /// Cluster name.
    pub name: String,
    /// Kube context used when targeting this cluster, for the Effective
    /// Input Hasher's cluster target digest (spec §4.5 field 7).
    #[serde(rename = "kubeContext", default)]
    pub kube_context: Option<String>,
}

/// Scope-level overlay defaults (spec §4.2 Algorithm steps 1-2).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseDefaultsYaml {
    /// Values files appended for every release in scope.
    #[serde(rename = "valuesFiles", default)]
    pub values_files: Vec<PathBuf>,
    /// `--set` style overrides.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    /// Tags applied to every release in scope.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Apply options, applied when a release does not override them.
    #[serde(rename = "applyOptions", default)]
    pub apply_options: Option<ApplyOptionsYaml>,
    /// Delete options, applied when a release does not override them.
    #[serde(rename = "deleteOptions", default)]
    pub delete_options: Option<DeleteOptionsYaml>,
    /// Verify options, applied when a release does not override them.
    #[serde(rename = "verifyOptions", default)]
    pub verify_options: Option<VerifyOptionsYaml>,
}

/// Either an inline release declaration, or a reference to a standalone
/// release file (spec §4.1 "embedded or referenced release files").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReleaseEntry {
    /// A path to a standalone release file, relative to the stack root.
    FileRef {
        /// Path to the release file.
        file: PathBuf,
    },
    /// A release declared inline in the stack file.
    Inline(ReleaseYaml),
}

/// A single release declaration, as written on disk (spec §6 "release
/// entry").
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseYaml {
    /// Release name, unique within its cluster scope.
    pub name: String,
    /// Cluster this release targets; must match a declared cluster.
    pub cluster: String,
    /// Namespace this release targets.
    pub namespace: String,
    /// Chart reference.
    pub chart: String,
    /// Requested chart version, if pinned.
    #[serde(rename = "chartVersion", default)]
    pub chart_version: Option<String>,
    /// Values files, relative to the stack root (or to the release file's
    /// own directory when declared via a `file:` reference).
    #[serde(rename = "valuesFiles", default)]
    pub values_files: Vec<PathBuf>,
    /// `--set` style overrides.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared dependency names.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Apply options, if overridden at the release level.
    #[serde(rename = "applyOptions", default)]
    pub apply_options: Option<ApplyOptionsYaml>,
    /// Delete options, if overridden at the release level.
    #[serde(rename = "deleteOptions", default)]
    pub delete_options: Option<DeleteOptionsYaml>,
    /// Verify options, if overridden at the release level.
    #[serde(rename = "verifyOptions", default)]
    pub verify_options: Option<VerifyOptionsYaml>,
    /// Parallelism group, if assigned.
    #[serde(rename = "parallelismGroup", default)]
    pub parallelism_group: Option<String>,
}

/// A standalone release file, either a single release or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReleaseFile {
    /// A single release declaration.
    One(ReleaseYaml),
    /// Multiple release declarations in one file.
    Many(Vec<ReleaseYaml>),
}

impl ReleaseFile {
    /// Flattens this file into a list of release declarations.
    #[must_use]
    pub fn into_releases(self) -> Vec<ReleaseYaml> {
        match self {
            Self::One(release) => vec![release],
            Self::Many(releases) => releases,
        }
    }
}

/// Apply options as written on disk (spec §3 `ApplyOptions`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApplyOptionsYaml {
    /// Roll back automatically on failure.
    #[serde(default = "default_true")]
    pub atomic: bool,
    /// Wait for resources to reach a ready state before returning.
    #[serde(default = "default_true")]
    pub wait: bool,
    /// Apply timeout in seconds.
    #[serde(rename = "timeoutSeconds", default = "default_apply_timeout")]
    pub timeout_seconds: u64,
}

/// Delete options as written on disk (spec §3 `DeleteOptions`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeleteOptionsYaml {
    /// Wait for resources to be torn down before returning.
    #[serde(default = "default_true")]
    pub wait: bool,
    /// Delete timeout in seconds.
    #[serde(rename = "timeoutSeconds", default = "default_apply_timeout")]
    pub timeout_seconds: u64,
}

/// Verify options as written on disk (spec §3 `VerifyOptions`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VerifyOptionsYaml {
    /// Whether verification runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Verification timeout in seconds.
    #[serde(rename = "timeoutSeconds", default = "default_verify_timeout")]
    pub timeout_seconds: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_apply_timeout() -> u64 {
    300
}

const fn default_verify_timeout() -> u64 {
    60
}
