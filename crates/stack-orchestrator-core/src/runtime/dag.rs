// stack-orchestrator-core/src/runtime/dag.rs
// ============================================================================
// Module: DAG
// Description: Cycle detection and topological layering over a flat node-id
//              list and edge-tuple list.
// Purpose: Shared graph algorithm used by the Compiler, Selector, and
//          Scheduler, with no owning pointers between nodes (spec §9
//          "Cyclic references").
// Dependencies: crate::core::identifiers
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use thiserror::Error;

use crate::core::Edge;
use crate::core::NodeId;

/// Errors raised while analyzing a DAG.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    /// The edge set contains a cycle; the member ids are reported in cycle
    /// order.
    #[error("cycle detected among nodes: {}", .0.iter().map(NodeId::as_str).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<NodeId>),
}

/// Builds an adjacency map `from_id -> [to_id]` from an edge list.
#[must_use]
pub fn successors_of(edges: &[Edge]) -> BTreeMap<NodeId, Vec<NodeId>> {
    let mut map: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for edge in edges {
        map.entry(edge.from_id.clone())
            .or_default()
            .push(edge.to_id.clone());
    }
    map
}

/// Builds an adjacency map `to_id -> [from_id]` from an edge list.
#[must_use]
pub fn predecessors_of(edges: &[Edge]) -> BTreeMap<NodeId, Vec<NodeId>> {
    let mut map: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for edge in edges {
        map.entry(edge.to_id.clone())
            .or_default()
            .push(edge.from_id.clone());
    }
    map
}

/// Returns the edge list with every `{from_id, to_id}` pair reversed, used
/// for the delete command's teardown ordering (spec §4.7 "Delete
/// ordering").
#[must_use]
pub fn reversed(edges: &[Edge]) -> Vec<Edge> {
    edges
        .iter()
        .map(|edge| Edge {
            from_id: edge.to_id.clone(),
            to_id: edge.from_id.clone(),
        })
        .collect()
}

/// Computes a topological layering (execution groups) over `nodes` and
/// `edges` via Kahn's algorithm, assigning each node to the layer index
/// equal to the longest path from a root to it.
///
/// # Errors
///
/// Returns [`DagError::Cycle`] when the edge set is not acyclic. The
/// remaining (unreachable, still in-degree > 0) nodes are reported as the
/// cycle membership.
pub fn topological_layers(nodes: &[NodeId], edges: &[Edge]) -> Result<Vec<Vec<NodeId>>, DagError> {
    let all: BTreeSet<NodeId> = nodes.iter().cloned().collect();
    let succ = successors_of(edges);
    let mut in_degree: BTreeMap<NodeId, usize> = all.iter().cloned().map(|id| (id, 0)).collect();
    for edge in edges {
        if let Some(count) = in_degree.get_mut(&edge.to_id) {
            *count += 1;
        }
    }

    let mut frontier: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut frontier_sorted: Vec<NodeId> = frontier.drain(..).collect();
    frontier_sorted.sort();

    let mut layers = Vec::new();
    let mut remaining = in_degree.clone();
    let mut current = frontier_sorted;
    let mut visited = 0usize;

    while !current.is_empty() {
        current.sort();
        visited += current.len();
        let mut next: BTreeSet<NodeId> = BTreeSet::new();
        for id in &current {
            for succ_id in succ.get(id).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(succ_id) {
                    *count -= 1;
                    if *count == 0 {
                        next.insert(succ_id.clone());
                    }
                }
            }
        }
        layers.push(current);
        current = next.into_iter().collect();
    }

    if visited != all.len() {
        let stuck: Vec<NodeId> = remaining
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        return Err(DagError::Cycle(stuck));
    }

    Ok(layers)
}

/// Returns `true` iff adding `candidate` (`from_id -> to_id`) to `edges`
/// would introduce a cycle, without mutating `edges`. Used by the
/// Dependency Inferencer to drop edges that would close a loop (spec §4.3).
#[must_use]
pub fn would_create_cycle(edges: &[Edge], candidate: &Edge) -> bool {
    // A new edge from_id -> to_id creates a cycle iff to_id can already reach
    // from_id.
    let succ = successors_of(edges);
    let mut stack = vec![candidate.to_id.clone()];
    let mut seen = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if id == candidate.from_id {
            return true;
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = succ.get(&id) {
            stack.extend(next.iter().cloned());
        }
    }
    false
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

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from_id: id(from),
            to_id: id(to),
        }
    }

    #[test]
    fn linear_chain_layers_in_order() {
        let nodes = [id("a"), id("b"), id("c"), id("d")];
        let edges = [edge("a", "b"), edge("b", "c"), edge("c", "d")];
        let layers = topological_layers(&nodes, &edges).expect("acyclic");
        assert_eq!(
            layers,
            vec![vec![id("a")], vec![id("b")], vec![id("c")], vec![id("d")]]
        );
    }

    #[test]
    fn fan_out_fan_in_groups_concurrent_nodes() {
        let nodes = [id("a"), id("b"), id("c"), id("d"), id("e")];
        let edges = [
            edge("a", "b"),
            edge("a", "c"),
            edge("a", "d"),
            edge("b", "e"),
            edge("c", "e"),
            edge("d", "e"),
        ];
        let layers = topological_layers(&nodes, &edges).expect("acyclic");
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[1], vec![id("b"), id("c"), id("d")]);
        assert_eq!(layers[2], vec![id("e")]);
    }

    #[test]
    fn cycle_is_detected() {
        let nodes = [id("a"), id("b")];
        let edges = [edge("a", "b"), edge("b", "a")];
        let err = topological_layers(&nodes, &edges).expect_err("cyclic");
        match err {
            DagError::Cycle(members) => {
                assert_eq!(members.len(), 2);
            }
        }
    }

    #[test]
    fn would_create_cycle_detects_back_edge() {
        let edges = [edge("a", "b"), edge("b", "c")];
        assert!(would_create_cycle(&edges, &edge("c", "a")));
        assert!(!would_create_cycle(&edges, &edge("a", "c")));
    }

    #[test]
    fn reversed_swaps_direction() {
        let edges = [edge("a", "b")];
        assert_eq!(reversed(&edges), vec![edge("b", "a")]);
    }
}
