// stack-orchestrator-core/src/runtime/inferencer.rs
// ============================================================================
// Module: Dependency Inferencer
// Description: Optionally renders each release's chart client-side and adds
//              edges for discovered cross-release references.
// Purpose: Implements spec §4.3.
// Dependencies: crate::core, crate::interfaces, crate::runtime::dag
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::Edge;
use crate::core::InferredNeed;
use crate::core::InferredReason;
use crate::core::Plan;
use crate::core::ReleaseName;
use crate::interfaces::ChartRenderer;
use crate::interfaces::RenderError;
use crate::runtime::dag;

/// Errors raised while inferring dependency edges.
#[derive(Debug, Error)]
pub enum InferError {
    /// Rendering a chart failed.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// Re-topologizing after inference found a cycle despite cycle-avoidant
    /// insertion; indicates a logic error upstream.
    #[error("inferred edge set is not acyclic: {0}")]
    Retopology(#[from] dag::DagError),
}

/// Whether the inferencer also adds edges for `ConfigMap`/`Secret`
/// references, per spec §4.3 "when 'include config refs' is enabled".
#[derive(Debug, Clone, Copy)]
pub struct InferenceOptions {
    /// Render and scan charts at all.
    pub enabled: bool,
    /// Include `ConfigMap`/`Secret` mount references as edges.
    pub include_config_refs: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            include_config_refs: false,
        }
    }
}

/// Per-release manifest surface used to discover cross-release references.
struct RenderedSurface {
    service_names: BTreeSet<String>,
    config_names: BTreeSet<String>,
    references: BTreeSet<String>,
}

/// Renders every node's chart and adds inferred `needs` edges for
/// discovered cross-release references (spec §4.3).
///
/// # Errors
///
/// Returns [`InferError`] when rendering a chart fails.
pub fn infer(
    plan: &Plan,
    renderer: &dyn ChartRenderer,
    options: InferenceOptions,
) -> Result<Plan, InferError> {
    if !options.enabled {
        return Ok(plan.clone());
    }

    let mut surfaces: BTreeMap<ReleaseName, RenderedSurface> = BTreeMap::new();
    for node in &plan.nodes {
        let manifests = renderer.render(&node.chart, &node.values_files, &node.set_overrides)?;
        surfaces.insert(node.name.clone(), scan_manifests(&manifests));
    }

    let mut edges = plan.edges.clone();
    let mut nodes = plan.nodes.clone();

    for node in &mut nodes {
        let Some(surface) = surfaces.get(&node.name) else {
            continue;
        };
        let mut proposed: Vec<(ReleaseName, InferredReason)> = Vec::new();

        for (other_name, other_surface) in &surfaces {
            if other_name == &node.name {
                continue;
            }
            let references_service = other_surface
                .service_names
                .iter()
                .any(|svc| surface.references.contains(svc));
            if references_service {
                proposed.push((other_name.clone(), InferredReason::ServiceReference));
                continue;
            }
            if options.include_config_refs {
                let references_config = other_surface
                    .config_names
                    .iter()
                    .any(|cfg| surface.references.contains(cfg));
                if references_config {
                    proposed.push((other_name.clone(), InferredReason::ConfigReference));
                }
            }
        }

        for (on, reason) in proposed {
            let Some(from_id) = plan
                .nodes
                .iter()
                .find(|n| n.cluster == node.cluster && n.name == on)
                .map(|n| n.id.clone())
            else {
                continue;
            };
            let candidate = Edge {
                from_id: from_id.clone(),
                to_id: node.id.clone(),
            };
            if dag::would_create_cycle(&edges, &candidate) {
                node.inferred_needs.push(InferredNeed {
                    on,
                    reason: InferredReason::CycleAvoided,
                    dropped: true,
                });
                continue;
            }
            edges.push(candidate);
            node.inferred_needs.push(InferredNeed {
                on,
                reason,
                dropped: false,
            });
        }
    }

    let node_ids: Vec<_> = nodes.iter().map(|n| n.id.clone()).collect();
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

/// Scans rendered manifest YAML documents for `Service`/`ConfigMap`/`Secret`
/// names they define, and for references to other objects' names appearing
/// anywhere in the document body (env values, volume mounts, selectors).
///
/// This is a deliberately lightweight, textual heuristic: the orchestrator
/// does not carry a full Kubernetes object model, since the Kubernetes
/// client itself is out of scope and specified only at interface.
fn scan_manifests(manifests: &[String]) -> RenderedSurface {
    let mut service_names = BTreeSet::new();
    let mut config_names = BTreeSet::new();
    let mut references = BTreeSet::new();

    for doc_text in manifests {
        let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(doc_text) else {
            continue;
        };
        let kind = doc.get("kind").and_then(serde_yaml::Value::as_str);
        let name = doc
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(serde_yaml::Value::as_str);

        match (kind, name) {
            (Some("Service"), Some(name)) => {
                service_names.insert(name.to_string());
            }
            (Some("ConfigMap" | "Secret"), Some(name)) => {
                config_names.insert(name.to_string());
            }
            _ => {}
        }

        collect_string_tokens(&doc, &mut references);
    }

    RenderedSurface {
        service_names,
        config_names,
        references,
    }
}

fn collect_string_tokens(value: &serde_yaml::Value, out: &mut BTreeSet<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            out.insert(s.clone());
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                collect_string_tokens(item, out);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map {
                collect_string_tokens(v, out);
            }
        }
        _ => {}
    }
}
