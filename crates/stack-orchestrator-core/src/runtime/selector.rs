// stack-orchestrator-core/src/runtime/selector.rs
// ============================================================================
// Module: Selector
// Description: Produces a sub-plan from a plan and a selector expression.
// Purpose: Implements spec §4.4.
// Dependencies: crate::core, crate::runtime::dag
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::ClusterName;
use crate::core::Edge;
use crate::core::NodeId;
use crate::core::Plan;
use crate::core::ReleaseName;
use crate::runtime::dag;

/// A conjunctive filter over plan nodes (spec §4.4 Expression).
#[derive(Debug, Clone, Default)]
pub struct SelectorExpression {
    /// Restrict to these clusters; empty means all clusters.
    pub clusters: Vec<ClusterName>,
    /// Restrict to nodes carrying any of these tags; empty means all.
    pub tags: Vec<String>,
    /// Restrict to nodes whose source path starts with any of these paths.
    pub from_paths: Vec<String>,
    /// Restrict to these release names; empty means all.
    pub release_names: Vec<ReleaseName>,
    /// Restrict to nodes touched by this set of changed file paths (the
    /// resolved git-range diff).
    pub git_range_paths: Option<BTreeSet<String>>,
    /// Transitively close the selection over predecessors.
    pub include_deps: bool,
    /// Transitively close the selection over successors.
    pub include_dependents: bool,
    /// Apply `include_deps`/`include_dependents` only to the subset matched
    /// by `git_range_paths`.
    pub git_include_deps: bool,
    /// See `git_include_deps`.
    pub git_include_dependents: bool,
    /// Drop edges to unselected predecessors instead of failing.
    pub allow_missing_deps: bool,
}

/// Errors raised while selecting a sub-plan (spec §4.4 Failures).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// The expression matched no releases.
    #[error("selector matched no releases")]
    Empty,
    /// A `releaseNames` entry did not match any node.
    #[error("unknown release: {0}")]
    UnknownRelease(String),
    /// A short release name matched nodes in more than one cluster.
    #[error("release name {0} is ambiguous across clusters: {1:?}")]
    AmbiguousRelease(String, Vec<String>),
    /// A selected node depends on a node that was not selected, and
    /// `allow_missing_deps` is false.
    #[error("node {node} needs unselected node {unsatisfied}")]
    UnsatisfiedNeed {
        /// The node with the unsatisfied dependency.
        node: String,
        /// The unselected dependency.
        unsatisfied: String,
    },
    /// Re-topologizing the sub-plan found a cycle; the plan compiler already
    /// guarantees acyclicity, so this indicates a logic error upstream.
    #[error("selected sub-plan is not acyclic: {0}")]
    Retopology(#[from] dag::DagError),
}

/// Produces a sub-plan by applying `expr` to `plan` (spec §4.4).
///
/// # Errors
///
/// Returns [`SelectError`] per the conditions in spec §4.4 Failures.
pub fn select(plan: &Plan, expr: &SelectorExpression) -> Result<Plan, SelectError> {
    validate_release_names(plan, expr)?;

    let mut selected: BTreeSet<NodeId> = plan
        .nodes
        .iter()
        .filter(|node| matches_base_filters(node, expr))
        .map(|node| node.id.clone())
        .collect();

    if selected.is_empty() {
        return Err(SelectError::Empty);
    }

    let predecessors = dag::predecessors_of(&plan.edges);
    let successors = dag::successors_of(&plan.edges);

    if expr.git_range_paths.is_some() && (expr.git_include_deps || expr.git_include_dependents) {
        let git_matched: BTreeSet<NodeId> = plan
            .nodes
            .iter()
            .filter(|node| matches_git_range(node, expr))
            .map(|node| node.id.clone())
            .collect();
        if expr.git_include_deps {
            close_over(&mut selected, &git_matched, &predecessors);
        }
        if expr.git_include_dependents {
            close_over(&mut selected, &git_matched, &successors);
        }
    }

    if expr.include_deps {
        let seed = selected.clone();
        close_over(&mut selected, &seed, &predecessors);
    }
    if expr.include_dependents {
        let seed = selected.clone();
        close_over(&mut selected, &seed, &successors);
    }

    let mut edges: Vec<Edge> = plan
        .edges
        .iter()
        .filter(|edge| selected.contains(&edge.from_id) && selected.contains(&edge.to_id))
        .cloned()
        .collect();

    if !expr.allow_missing_deps {
        for node in plan.nodes.iter().filter(|n| selected.contains(&n.id)) {
            for predecessor in predecessors.get(&node.id).into_iter().flatten() {
                if !selected.contains(predecessor) {
                    return Err(SelectError::UnsatisfiedNeed {
                        node: node.id.as_str().to_string(),
                        unsatisfied: predecessor.as_str().to_string(),
                    });
                }
            }
        }
    } else {
        edges.retain(|edge| selected.contains(&edge.from_id));
    }

    let mut nodes: Vec<_> = plan
        .nodes
        .iter()
        .filter(|n| selected.contains(&n.id))
        .cloned()
        .collect();
    nodes.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let node_ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
    let execution_groups = dag::topological_layers(&node_ids, &edges)?;

    Ok(Plan {
        nodes,
        edges,
        stack_root: plan.stack_root.clone(),
        stack_name: plan.stack_name.clone(),
        profile: plan.profile.clone(),
        runner: plan.runner.clone(),
        execution_groups,
    })
}

fn validate_release_names(plan: &Plan, expr: &SelectorExpression) -> Result<(), SelectError> {
    for name in &expr.release_names {
        let matches: Vec<&str> = plan
            .nodes
            .iter()
            .filter(|n| &n.name == name)
            .map(|n| n.cluster.as_str())
            .collect();
        match matches.len() {
            0 => return Err(SelectError::UnknownRelease(name.as_str().to_string())),
            1 => {}
            _ => {
                return Err(SelectError::AmbiguousRelease(
                    name.as_str().to_string(),
                    matches.into_iter().map(str::to_string).collect(),
                ));
            }
        }
    }
    Ok(())
}

fn matches_base_filters(node: &crate::core::ResolvedRelease, expr: &SelectorExpression) -> bool {
    if !expr.clusters.is_empty() && !expr.clusters.contains(&node.cluster) {
        return false;
    }
    if !expr.tags.is_empty() && !expr.tags.iter().any(|t| node.tags.contains(t)) {
        return false;
    }
    if !expr.release_names.is_empty() && !expr.release_names.contains(&node.name) {
        return false;
    }
    if !expr.from_paths.is_empty() {
        let matches_values_file = expr
            .from_paths
            .iter()
            .any(|prefix| node.values_files.iter().any(|p| path_has_prefix(p, prefix)));
        let matches_node_id = expr
            .from_paths
            .iter()
            .any(|prefix| node.id.as_str().starts_with(prefix.as_str()));
        if !matches_values_file && !matches_node_id {
            return false;
        }
    }
    if expr.git_range_paths.is_some() && !matches_git_range(node, expr) {
        return false;
    }
    true
}

fn matches_git_range(node: &crate::core::ResolvedRelease, expr: &SelectorExpression) -> bool {
    let Some(changed) = &expr.git_range_paths else {
        return false;
    };
    node.values_files
        .iter()
        .any(|path| changed.contains(&path.to_string_lossy().to_string()))
}

fn path_has_prefix(path: &std::path::Path, prefix: &str) -> bool {
    path.to_string_lossy().starts_with(prefix)
}

fn close_over(
    selected: &mut BTreeSet<NodeId>,
    seed: &BTreeSet<NodeId>,
    adjacency: &std::collections::BTreeMap<NodeId, Vec<NodeId>>,
) {
    let mut stack: Vec<NodeId> = seed.iter().cloned().collect();
    while let Some(id) = stack.pop() {
        if let Some(neighbors) = adjacency.get(&id) {
            for neighbor in neighbors {
                if selected.insert(neighbor.clone()) {
                    stack.push(neighbor.clone());
                }
            }
        }
    }
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
    use crate::core::Namespace;
    use crate::core::RawRelease;
    use crate::core::ReleaseDefaults;
    use crate::core::StackName;
    use crate::core::Universe;
    use crate::runtime::compiler;

    fn raw(name: &str, needs: &[&str], tags: &[&str]) -> RawRelease {
        RawRelease {
            name: ReleaseName::new(name),
            cluster: ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "repo/chart".to_string(),
            chart_version: None,
            values_files: Vec::new(),
            set_overrides: std::collections::BTreeMap::new(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            needs: needs.iter().map(|n| ReleaseName::new(*n)).collect(),
            apply_options: None,
            delete_options: None,
            verify_options: None,
            parallelism_group: None,
            source_path: std::path::PathBuf::from("stack.yaml"),
        }
    }

    fn plan() -> Plan {
        let universe = Universe {
            root: std::path::PathBuf::from("/stack"),
            stack_name: StackName::new("demo"),
            clusters: vec![ClusterName::new("prod")],
            profiles: Vec::new(),
            default_profile: None,
            stack_defaults: ReleaseDefaults::default(),
            profile_defaults: std::collections::BTreeMap::new(),
            releases: vec![
                raw("a", &[], &["core"]),
                raw("b", &["a"], &[]),
                raw("c", &["b"], &["edge"]),
            ],
        };
        compiler::compile(&universe, None).expect("compiles")
    }

    fn plan_with_values_files() -> Plan {
        let mut a = raw("a", &[], &["core"]);
        a.values_files = vec![std::path::PathBuf::from("releases/a/values.yaml")];
        let mut b = raw("b", &["a"], &[]);
        b.values_files = vec![std::path::PathBuf::from("releases/b/values.yaml")];
        let mut c = raw("c", &["b"], &["edge"]);
        c.values_files = vec![std::path::PathBuf::from("releases/c/values.yaml")];
        let universe = Universe {
            root: std::path::PathBuf::from("/stack"),
            stack_name: StackName::new("demo"),
            clusters: vec![ClusterName::new("prod")],
            profiles: Vec::new(),
            default_profile: None,
            stack_defaults: ReleaseDefaults::default(),
            profile_defaults: std::collections::BTreeMap::new(),
            releases: vec![a, b, c],
        };
        compiler::compile(&universe, None).expect("compiles")
    }

    #[test]
    fn include_deps_pulls_in_predecessors() {
        let p = plan();
        let expr = SelectorExpression {
            release_names: vec![ReleaseName::new("c")],
            include_deps: true,
            ..Default::default()
        };
        let sub = select(&p, &expr).expect("selects");
        let names: Vec<&str> = sub.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn unsatisfied_need_without_allow_missing_fails() {
        let p = plan();
        let expr = SelectorExpression {
            release_names: vec![ReleaseName::new("c")],
            ..Default::default()
        };
        let err = select(&p, &expr).expect_err("unsatisfied");
        assert!(matches!(err, SelectError::UnsatisfiedNeed { .. }));
    }

    #[test]
    fn allow_missing_deps_drops_edge_instead_of_failing() {
        let p = plan();
        let expr = SelectorExpression {
            release_names: vec![ReleaseName::new("c")],
            allow_missing_deps: true,
            ..Default::default()
        };
        let sub = select(&p, &expr).expect("selects");
        assert_eq!(sub.nodes.len(), 1);
        assert!(sub.edges.is_empty());
    }

    #[test]
    fn tag_filter_matches_subset() {
        let p = plan();
        let expr = SelectorExpression {
            tags: vec!["core".to_string()],
            ..Default::default()
        };
        let sub = select(&p, &expr).expect("selects");
        assert_eq!(sub.nodes.len(), 1);
        assert_eq!(sub.nodes[0].name.as_str(), "a");
    }

    #[test]
    fn unknown_release_name_is_rejected() {
        let p = plan();
        let expr = SelectorExpression {
            release_names: vec![ReleaseName::new("ghost")],
            ..Default::default()
        };
        let err = select(&p, &expr).expect_err("unknown");
        assert!(matches!(err, SelectError::UnknownRelease(_)));
    }

    #[test]
    fn git_range_alone_narrows_selection() {
        let p = plan_with_values_files();
        let mut changed = BTreeSet::new();
        changed.insert("releases/b/values.yaml".to_string());
        let expr = SelectorExpression {
            git_range_paths: Some(changed),
            allow_missing_deps: true,
            ..Default::default()
        };
        let sub = select(&p, &expr).expect("selects");
        let names: Vec<&str> = sub.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }
}
