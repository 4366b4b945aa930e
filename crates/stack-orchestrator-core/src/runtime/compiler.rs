// stack-orchestrator-core/src/runtime/compiler.rs
// ============================================================================
// Module: Compiler
// Description: Merges profile overlays, resolves inheritance, and produces a
//              validated, topologically laid-out Plan.
// Purpose: Implements spec §4.2.
// Dependencies: crate::core, crate::runtime::dag
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::Edge;
use crate::core::NodeId;
use crate::core::Plan;
use crate::core::ProfileName;
use crate::core::ReleaseDefaults;
use crate::core::ResolvedRelease;
use crate::core::RunnerConfig;
use crate::core::Universe;
use crate::runtime::dag;
use crate::runtime::dag::DagError;

/// Errors raised while compiling a [`Universe`] into a [`Plan`] (spec §4.2
/// Failures).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The declared `needs` graph contains a cycle.
    #[error("cycle in declared needs: {0}")]
    Cycle(DagError),
    /// A `needs` entry names a release that does not exist in the same
    /// cluster scope.
    #[error("release {release} needs unknown release {unknown} in cluster {cluster}")]
    UnknownNeed {
        /// The release declaring the unresolved need.
        release: String,
        /// The cluster scope searched.
        cluster: String,
        /// The unresolved need name.
        unknown: String,
    },
    /// Two release declarations resolved to the same node id.
    #[error("duplicate release id: {0}")]
    DuplicateId(String),
    /// The requested profile does not exist on the universe.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    /// A release declared an empty chart reference.
    #[error("release {0} has an empty chart reference")]
    EmptyChart(String),
    /// A release declared an empty namespace.
    #[error("release {0} has an empty namespace")]
    EmptyNamespace(String),
}

/// Compiles a [`Universe`] and optional profile selection into a validated
/// [`Plan`] (spec §4.2).
///
/// # Errors
///
/// Returns [`CompileError`] on any of the failure conditions in spec §4.2.
pub fn compile(universe: &Universe, profile: Option<&ProfileName>) -> Result<Plan, CompileError> {
    let profile_defaults = match profile {
        Some(name) => {
            let defaults = universe
                .profile_defaults
                .get(name)
                .ok_or_else(|| CompileError::UnknownProfile(name.as_str().to_string()))?;
            Some(defaults.clone())
        }
        None => None,
    };

    let mut nodes = Vec::with_capacity(universe.releases.len());
    let mut seen_ids = std::collections::BTreeSet::new();

    for raw in &universe.releases {
        let merged = merge_defaults(&universe.stack_defaults, profile_defaults.as_ref(), raw);
        let node = resolve_release(raw, merged)?;
        if !seen_ids.insert(node.id.clone()) {
            return Err(CompileError::DuplicateId(node.id.as_str().to_string()));
        }
        nodes.push(node);
    }

    nodes.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    ensure_needs_resolve(&nodes)?;

    let edges = build_edges(&nodes);
    let node_ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
    let execution_groups =
        dag::topological_layers(&node_ids, &edges).map_err(CompileError::Cycle)?;

    Ok(Plan {
        nodes,
        edges,
        stack_root: universe.root.clone(),
        stack_name: universe.stack_name.clone(),
        profile: profile.cloned(),
        runner: RunnerConfig::default(),
        execution_groups,
    })
}

/// Merges stack defaults, profile defaults, and a raw release declaration
/// per the precedence in spec §4.2 step 3: scalars replace, lists
/// concatenate and de-duplicate preserving first occurrence, maps merge
/// key-wise with the more specific scope winning.
fn merge_defaults(
    stack_defaults: &ReleaseDefaults,
    profile_defaults: Option<&ReleaseDefaults>,
    raw: &crate::core::RawRelease,
) -> MergedRelease {
    let mut values_files = Vec::new();
    let mut tags = Vec::new();
    let mut set_overrides = BTreeMap::new();

    for scope in [Some(stack_defaults), profile_defaults] {
        if let Some(defaults) = scope {
            append_dedup(&mut values_files, &defaults.values_files);
            append_dedup(&mut tags, &defaults.tags);
            for (key, value) in &defaults.set_overrides {
                set_overrides.insert(key.clone(), value.clone());
            }
        }
    }
    append_dedup(&mut values_files, &raw.values_files);
    append_dedup(&mut tags, &raw.tags);
    for (key, value) in &raw.set_overrides {
        set_overrides.insert(key.clone(), value.clone());
    }

    let apply_options = raw
        .apply_options
        .or_else(|| profile_defaults.and_then(|d| d.apply_options))
        .or(stack_defaults.apply_options)
        .unwrap_or_default();
    let delete_options = raw
        .delete_options
        .or_else(|| profile_defaults.and_then(|d| d.delete_options))
        .or(stack_defaults.delete_options)
        .unwrap_or_default();
    let verify_options = raw
        .verify_options
        .or_else(|| profile_defaults.and_then(|d| d.verify_options))
        .or(stack_defaults.verify_options)
        .unwrap_or_default();

    MergedRelease {
        values_files,
        set_overrides,
        tags,
        apply_options,
        delete_options,
        verify_options,
    }
}

/// Intermediate merge result, folded into a [`ResolvedRelease`] by
/// [`resolve_release`].
struct MergedRelease {
    values_files: Vec<std::path::PathBuf>,
    set_overrides: BTreeMap<String, String>,
    tags: Vec<String>,
    apply_options: crate::core::ApplyOptions,
    delete_options: crate::core::DeleteOptions,
    verify_options: crate::core::VerifyOptions,
}

fn append_dedup<T: Clone + PartialEq>(target: &mut Vec<T>, extra: &[T]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn resolve_release(
    raw: &crate::core::RawRelease,
    merged: MergedRelease,
) -> Result<ResolvedRelease, CompileError> {
    if raw.chart.trim().is_empty() {
        return Err(CompileError::EmptyChart(raw.name.as_str().to_string()));
    }
    if raw.namespace.as_str().trim().is_empty() {
        return Err(CompileError::EmptyNamespace(raw.name.as_str().to_string()));
    }

    let id = NodeId::from_parts(&raw.cluster, &raw.namespace, &raw.name);

    Ok(ResolvedRelease {
        id,
        name: raw.name.clone(),
        cluster: raw.cluster.clone(),
        namespace: raw.namespace.clone(),
        chart: raw.chart.clone(),
        chart_version: raw.chart_version.clone(),
        resolved_chart_version: raw.chart_version.clone(),
        values_files: merged.values_files,
        set_overrides: merged.set_overrides,
        tags: merged.tags,
        needs: raw.needs.clone(),
        inferred_needs: Vec::new(),
        apply_options: merged.apply_options,
        delete_options: merged.delete_options,
        verify_options: merged.verify_options,
        parallelism_group: raw.parallelism_group.clone(),
        effective_input: None,
    })
}

/// Validates that every declared `needs` name resolves to another node in
/// the same cluster scope (spec §4.2 Algorithm step 4).
fn ensure_needs_resolve(nodes: &[ResolvedRelease]) -> Result<(), CompileError> {
    let names: std::collections::BTreeSet<(&str, &str)> = nodes
        .iter()
        .map(|n| (n.cluster.as_str(), n.name.as_str()))
        .collect();
    for node in nodes {
        for need in &node.needs {
            if !names.contains(&(node.cluster.as_str(), need.as_str())) {
                return Err(CompileError::UnknownNeed {
                    release: node.name.as_str().to_string(),
                    cluster: node.cluster.as_str().to_string(),
                    unknown: need.as_str().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Builds the declared-needs edge list over resolved nodes.
fn build_edges(nodes: &[ResolvedRelease]) -> Vec<Edge> {
    let name_to_id: BTreeMap<(&str, &str), NodeId> = nodes
        .iter()
        .map(|n| ((n.cluster.as_str(), n.name.as_str()), n.id.clone()))
        .collect();

    let mut edges = Vec::new();
    for node in nodes {
        for need in &node.needs {
            if let Some(from_id) = name_to_id.get(&(node.cluster.as_str(), need.as_str())) {
                edges.push(Edge {
                    from_id: from_id.clone(),
                    to_id: node.id.clone(),
                });
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;
    use crate::core::ClusterName;
    use crate::core::Namespace;
    use crate::core::RawRelease;
    use crate::core::ReleaseName;
    use crate::core::StackName;

    fn raw(name: &str, needs: &[&str]) -> RawRelease {
        RawRelease {
            name: ReleaseName::new(name),
            cluster: ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "repo/chart".to_string(),
            chart_version: Some("1.0.0".to_string()),
            values_files: Vec::new(),
            set_overrides: BTreeMap::new(),
            tags: Vec::new(),
            needs: needs.iter().map(|n| ReleaseName::new(*n)).collect(),
            apply_options: None,
            delete_options: None,
            verify_options: None,
            parallelism_group: None,
            source_path: std::path::PathBuf::from("stack.yaml"),
        }
    }

    fn universe(releases: Vec<RawRelease>) -> Universe {
        Universe {
            root: std::path::PathBuf::from("/stack"),
            stack_name: StackName::new("demo"),
            clusters: vec![ClusterName::new("prod")],
            profiles: Vec::new(),
            default_profile: None,
            stack_defaults: ReleaseDefaults::default(),
            profile_defaults: BTreeMap::new(),
            releases,
        }
    }

    #[test]
    fn compiles_linear_chain_deterministically() {
        let u = universe(vec![
            raw("a", &[]),
            raw("b", &["a"]),
            raw("c", &["b"]),
            raw("d", &["c"]),
        ]);
        let plan_one = compile(&u, None).expect("compiles");
        let plan_two = compile(&u, None).expect("compiles");
        let json_one = serde_json::to_string(&plan_one).expect("serialize");
        let json_two = serde_json::to_string(&plan_two).expect("serialize");
        assert_eq!(json_one, json_two);
        assert_eq!(plan_one.execution_groups.len(), 4);
    }

    #[test]
    fn unknown_need_is_rejected() {
        let u = universe(vec![raw("a", &["ghost"])]);
        let err = compile(&u, None).expect_err("unknown need");
        assert!(matches!(err, CompileError::UnknownNeed { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut a = raw("a", &["b"]);
        let b = raw("b", &["a"]);
        a.needs.push(ReleaseName::new("b"));
        let u = universe(vec![a, b]);
        let err = compile(&u, None).expect_err("cyclic");
        assert!(matches!(err, CompileError::Cycle(_)));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let u = universe(vec![raw("a", &[]), raw("a", &[])]);
        let err = compile(&u, None).expect_err("duplicate");
        assert!(matches!(err, CompileError::DuplicateId(_)));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let u = universe(vec![raw("a", &[])]);
        let err = compile(&u, Some(&ProfileName::new("missing"))).expect_err("unknown profile");
        assert!(matches!(err, CompileError::UnknownProfile(_)));
    }
}
