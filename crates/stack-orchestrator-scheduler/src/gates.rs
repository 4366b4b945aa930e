// stack-orchestrator-scheduler/src/gates.rs
// ============================================================================
// Module: Concurrency Gates
// Description: Admission checks a dequeued node must clear before it may run
//              (spec §4.7 "Concurrency gates").
// Purpose: Pure counters, kept free of the supervisor's mutex/condvar
//          plumbing so gate arithmetic is directly unit-testable.
// Dependencies: stack-orchestrator-core
// ============================================================================

use std::collections::BTreeMap;

use stack_orchestrator_core::core::Namespace;
use stack_orchestrator_core::core::ParallelismGroup;
use stack_orchestrator_core::core::ResolvedRelease;
use stack_orchestrator_core::core::RunnerConfig;
use stack_orchestrator_core::interfaces::ChartRenderer;

/// Per-node gate identity, resolved once before a node enters the ready
/// queue.
#[derive(Debug, Clone)]
pub struct GateKey {
    /// Target namespace.
    pub namespace: Namespace,
    /// Primary kind, when inferable (see [`infer_primary_kind`]).
    pub kind: Option<String>,
    /// Parallelism group, when assigned.
    pub group: Option<ParallelismGroup>,
}

impl GateKey {
    /// Builds a gate key from a plan node and its inferred kind.
    #[must_use]
    pub fn new(node: &ResolvedRelease, kind: Option<String>) -> Self {
        Self {
            namespace: node.namespace.clone(),
            kind,
            group: node.parallelism_group.clone(),
        }
    }
}

/// Tracks in-flight counts for each configured gate. All mutation happens
/// while the supervisor holds its state mutex; this type has no internal
/// synchronization of its own.
#[derive(Debug, Default)]
pub struct GateCounters {
    running_total: u32,
    per_namespace: BTreeMap<Namespace, u32>,
    per_kind: BTreeMap<String, u32>,
    per_group: BTreeMap<ParallelismGroup, u32>,
}

impl GateCounters {
    /// Builds an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `key` may be admitted right now: global in-flight
    /// count below `target_workers`, and every configured per-namespace /
    /// per-kind / per-group ceiling in `limits` still has headroom.
    #[must_use]
    pub fn admits(&self, key: &GateKey, limits: &RunnerConfig, target_workers: u32) -> bool {
        if self.running_total >= target_workers {
            return false;
        }
        if let Some(max) = limits.max_parallel_per_namespace {
            if self.count_in(&self.per_namespace, &key.namespace) >= max {
                return false;
            }
        }
        if let Some(kind) = &key.kind {
            if let Some(max) = limits.max_parallel_kind.get(kind) {
                if self.count_in(&self.per_kind, kind) >= *max {
                    return false;
                }
            }
        }
        if let Some(group) = &key.group {
            if let Some(max) = limits.parallelism_group_limit {
                if self.count_in(&self.per_group, group) >= max {
                    return false;
                }
            }
        }
        true
    }

    fn count_in<K: Ord>(&self, map: &BTreeMap<K, u32>, key: &K) -> u32 {
        map.get(key).copied().unwrap_or(0)
    }

    /// Records that a node matching `key` has started running.
    pub fn record_start(&mut self, key: &GateKey) {
        self.running_total += 1;
        *self.per_namespace.entry(key.namespace.clone()).or_insert(0) += 1;
        if let Some(kind) = &key.kind {
            *self.per_kind.entry(kind.clone()).or_insert(0) += 1;
        }
        if let Some(group) = &key.group {
            *self.per_group.entry(group.clone()).or_insert(0) += 1;
        }
    }

    /// Records that a node matching `key` has finished (successfully,
    /// unsuccessfully, or been cancelled).
    pub fn record_finish(&mut self, key: &GateKey) {
        self.running_total = self.running_total.saturating_sub(1);
        decrement(&mut self.per_namespace, &key.namespace);
        if let Some(kind) = &key.kind {
            decrement(&mut self.per_kind, kind);
        }
        if let Some(group) = &key.group {
            decrement(&mut self.per_group, group);
        }
    }
}

/// Decrements `key`'s count in `map`, removing the entry once it reaches
/// zero so the map doesn't grow unbounded across a long run.
fn decrement<K: Ord + Clone>(map: &mut BTreeMap<K, u32>, key: &K) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            map.remove(key);
        }
    }
}

/// Infers a node's primary kind from the first resource of its rendered
/// chart (spec §4.7: "kind inferred from the first resource of the rendered
/// chart when available"). Returns `None` when no renderer is supplied,
/// rendering fails, or no document carries a `kind` field.
#[must_use]
pub fn infer_primary_kind(renderer: Option<&dyn ChartRenderer>, node: &ResolvedRelease) -> Option<String> {
    let manifests = renderer?
        .render(&node.chart, &node.values_files, &node.set_overrides)
        .ok()?;
    manifests.iter().find_map(|doc_text| {
        let doc: serde_yaml::Value = serde_yaml::from_str(doc_text).ok()?;
        doc.get("kind")?.as_str().map(ToString::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(namespace: &str, kind: Option<&str>, group: Option<&str>) -> GateKey {
        GateKey {
            namespace: Namespace::new(namespace),
            kind: kind.map(ToString::to_string),
            group: group.map(ParallelismGroup::new),
        }
    }

    fn limits(max_namespace: Option<u32>, max_kind: Option<(&str, u32)>, max_group: Option<u32>) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.max_parallel_per_namespace = max_namespace;
        if let Some((kind, max)) = max_kind {
            config.max_parallel_kind.insert(kind.to_string(), max);
        }
        config.parallelism_group_limit = max_group;
        config
    }

    #[test]
    fn global_gate_blocks_at_target_workers() {
        let mut gates = GateCounters::new();
        let limits = limits(None, None, None);
        let a = key("default", None, None);
        assert!(gates.admits(&a, &limits, 1));
        gates.record_start(&a);
        assert!(!gates.admits(&a, &limits, 1));
        gates.record_finish(&a);
        assert!(gates.admits(&a, &limits, 1));
    }

    #[test]
    fn namespace_gate_is_independent_of_other_namespaces() {
        let mut gates = GateCounters::new();
        let limits = limits(Some(1), None, None);
        let a = key("ns-a", None, None);
        let b = key("ns-b", None, None);
        gates.record_start(&a);
        assert!(!gates.admits(&a, &limits, 10));
        assert!(gates.admits(&b, &limits, 10));
    }

    #[test]
    fn kind_gate_only_applies_to_configured_kinds() {
        let mut gates = GateCounters::new();
        let limits = limits(None, Some(("Deployment", 1)), None);
        let deployment = key("default", Some("Deployment"), None);
        let service = key("default", Some("Service"), None);
        gates.record_start(&deployment);
        assert!(!gates.admits(&deployment, &limits, 10));
        assert!(gates.admits(&service, &limits, 10));
    }

    #[test]
    fn group_gate_blocks_once_limit_reached() {
        let mut gates = GateCounters::new();
        let limits = limits(None, None, Some(2));
        let a = key("default", None, Some("db-migrations"));
        gates.record_start(&a);
        assert!(gates.admits(&a, &limits, 10));
        gates.record_start(&a);
        assert!(!gates.admits(&a, &limits, 10));
        gates.record_finish(&a);
        assert!(gates.admits(&a, &limits, 10));
    }

    struct FixtureRenderer {
        manifest: &'static str,
    }

    impl ChartRenderer for FixtureRenderer {
        fn render(
            &self,
            _chart_ref: &str,
            _values_files: &[std::path::PathBuf],
            _set_overrides: &std::collections::BTreeMap<String, String>,
        ) -> Result<Vec<String>, stack_orchestrator_core::interfaces::RenderError> {
            Ok(vec![self.manifest.to_string()])
        }
    }

    fn sample_node() -> ResolvedRelease {
        ResolvedRelease {
            id: stack_orchestrator_core::core::NodeId::new("prod/default/app"),
            name: stack_orchestrator_core::core::ReleaseName::new("app"),
            cluster: stack_orchestrator_core::core::ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "charts/app".to_string(),
            chart_version: None,
            resolved_chart_version: None,
            values_files: Vec::new(),
            set_overrides: BTreeMap::new(),
            tags: Vec::new(),
            needs: Vec::new(),
            inferred_needs: Vec::new(),
            apply_options: stack_orchestrator_core::core::ApplyOptions::default(),
            delete_options: stack_orchestrator_core::core::DeleteOptions::default(),
            verify_options: stack_orchestrator_core::core::VerifyOptions::default(),
            parallelism_group: None,
            effective_input: None,
        }
    }

    #[test]
    fn infer_primary_kind_reads_the_first_documents_kind_field() {
        let renderer = FixtureRenderer {
            manifest: "kind: Deployment\nmetadata:\n  name: app\n",
        };
        let node = sample_node();
        assert_eq!(infer_primary_kind(Some(&renderer), &node), Some("Deployment".to_string()));
    }

    #[test]
    fn infer_primary_kind_is_none_without_a_renderer() {
        let node = sample_node();
        assert_eq!(infer_primary_kind(None, &node), None);
    }
}
