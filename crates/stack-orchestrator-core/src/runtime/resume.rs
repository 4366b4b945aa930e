// stack-orchestrator-core/src/runtime/resume.rs
// ============================================================================
// Module: Resume & Drift Engine
// Description: Loads a prior run, verifies chain integrity, computes drift,
//              filters to failed-only, and seeds a new run with prior
//              attempt counts.
// Purpose: Implements spec §4.10.
// Dependencies: crate::core, crate::runtime::hasher
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::ChainError;
use crate::core::HashAlgorithm;
use crate::core::NodeId;
use crate::core::NodeLifecycle;
use crate::core::Plan;
use crate::core::Run;
use crate::core::RunEvent;
use crate::core::RunEventKind;
use crate::core::verify_chain;
use crate::interfaces::ChartDigestSource;
use crate::interfaces::ValuesContentSource;
use crate::runtime::hasher;
use crate::runtime::hasher::HashContext;

/// A single detected difference between a stored and recomputed effective
/// input hash (spec §4.10 "Drift check").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEntry {
    /// The node whose inputs drifted.
    pub node_id: NodeId,
    /// Human-readable description of the difference (spec §4.10: "chart,
    /// values files added/removed/changed, set, cluster, options, stack git
    /// identity").
    pub detail: String,
}

/// Errors raised while resuming a run.
#[derive(Debug, Error)]
pub enum ResumeError {
    /// The prior run's event chain failed to verify.
    #[error("prior run event chain is broken: {0}")]
    Integrity(#[from] ChainError),
    /// The prior run's sealed plan could not be parsed.
    #[error("failed to parse prior run's sealed plan: {0}")]
    PlanParse(String),
    /// Drift was detected and `allow_drift` was false.
    #[error("drift detected in {} node(s)", .0.len())]
    Drift(Vec<DriftEntry>),
}

/// The outcome of loading and reconciling a prior run against the current
/// stack tree, ready to seed a new scheduler run (spec §4.10 "Resume
/// entry", "Rerun-failed filter").
#[derive(Debug, Clone)]
pub struct ResumeDecision {
    /// The prior run being resumed.
    pub prior_run_id: crate::core::RunId,
    /// Nodes whose prior status was `succeeded`; the scheduler treats these
    /// as already complete so only their successors remain schedulable.
    pub already_succeeded: BTreeSet<NodeId>,
    /// Attempt counts carried over so retry budgets honor cumulative
    /// history.
    pub seed_attempts: BTreeMap<NodeId, u32>,
    /// Drift entries found (empty unless `allow_drift` was set).
    pub drift: Vec<DriftEntry>,
}

/// Loads a prior run's events, verifies the chain, reconstructs per-node
/// status, checks drift against `current_plan`, and produces a
/// [`ResumeDecision`] (spec §4.10).
///
/// # Errors
///
/// Returns [`ResumeError::Integrity`] when the event chain fails to verify,
/// [`ResumeError::PlanParse`] when the prior sealed plan cannot be parsed,
/// or [`ResumeError::Drift`] when drift is found and `allow_drift` is
/// false.
pub fn resume(
    prior_run: &Run,
    events: &[RunEvent],
    current_plan: &Plan,
    hash_ctx: &HashContext,
    chart_source: &dyn ChartDigestSource,
    values_source: &dyn ValuesContentSource,
    allow_drift: bool,
) -> Result<ResumeDecision, ResumeError> {
    verify_chain(hash_ctx.algorithm, events)?;

    let prior_plan: Plan = serde_json::from_str(&prior_run.sealed_plan_json)
        .map_err(|err| ResumeError::PlanParse(err.to_string()))?;

    let (statuses, attempts) = reconstruct_status(events);

    let mut drift = Vec::new();
    for node in &current_plan.nodes {
        let Some(prior_node) = prior_plan.node(&node.id) else {
            continue;
        };
        let Some(prior_input) = &prior_node.effective_input else {
            continue;
        };
        let recomputed =
            hasher::compute(node, hash_ctx, chart_source, values_source).map_err(|err| {
                ResumeError::PlanParse(format!("recompute effective input for {}: {err}", node.id))
            })?;
        if recomputed.hash != prior_input.hash {
            drift.push(describe_drift(node, prior_input, &recomputed));
        }
    }

    if !drift.is_empty() && !allow_drift {
        return Err(ResumeError::Drift(drift));
    }

    let already_succeeded = statuses
        .into_iter()
        .filter(|(_, status)| *status == NodeLifecycle::Succeeded)
        .map(|(id, _)| id)
        .collect();

    Ok(ResumeDecision {
        prior_run_id: prior_run.run_id.clone(),
        already_succeeded,
        seed_attempts: attempts,
        drift,
    })
}

/// Reconstructs per-node lifecycle status and attempt counters from the
/// event stream, latest event per node winning.
fn reconstruct_status(
    events: &[RunEvent],
) -> (BTreeMap<NodeId, NodeLifecycle>, BTreeMap<NodeId, u32>) {
    let mut statuses = BTreeMap::new();
    let mut attempts = BTreeMap::new();

    for event in events {
        let Some(node_id) = &event.node_id else {
            continue;
        };
        if let Some(attempt) = event.attempt {
            attempts
                .entry(node_id.clone())
                .and_modify(|existing: &mut u32| *existing = (*existing).max(attempt))
                .or_insert(attempt);
        }
        let status = match event.kind {
            RunEventKind::NodeRunning => Some(NodeLifecycle::Running),
            RunEventKind::NodeSucceeded => Some(NodeLifecycle::Succeeded),
            RunEventKind::NodeFailed => Some(NodeLifecycle::Failed),
            RunEventKind::NodeBlocked => Some(NodeLifecycle::Blocked),
            RunEventKind::NodeRetryScheduled
            | RunEventKind::RunStarted
            | RunEventKind::RunCompleted => None,
        };
        if let Some(status) = status {
            statuses.insert(node_id.clone(), status);
        }
    }

    (statuses, attempts)
}

fn describe_drift(
    node: &crate::core::ResolvedRelease,
    prior: &crate::core::EffectiveInput,
    current: &crate::core::EffectiveInput,
) -> DriftEntry {
    let mut parts = Vec::new();
    if prior.chart_digest != current.chart_digest {
        parts.push("chart contents changed".to_string());
    }
    if prior.resolved_version != current.resolved_version {
        parts.push("chart version changed".to_string());
    }
    if prior.values != current.values {
        parts.push("values files changed".to_string());
    }
    if prior.set_overrides_digest != current.set_overrides_digest {
        parts.push("set overrides changed".to_string());
    }
    if prior.cluster_target_digest != current.cluster_target_digest {
        parts.push("cluster target changed".to_string());
    }
    if prior.apply_options_digest != current.apply_options_digest
        || prior.delete_options_digest != current.delete_options_digest
        || prior.verify_options_digest != current.verify_options_digest
    {
        parts.push("apply/delete/verify options changed".to_string());
    }
    if prior.stack_git != current.stack_git {
        parts.push("stack git identity changed".to_string());
    }
    if parts.is_empty() {
        parts.push("effective input hash changed for an unrecorded reason".to_string());
    }
    DriftEntry {
        node_id: node.id.clone(),
        detail: parts.join(", "),
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
    use crate::core::Command;
    use crate::core::FailMode;
    use crate::core::HashDigest;
    use crate::core::RunId;
    use crate::core::SelectorSnapshot;
    use crate::core::Timestamp;
    use crate::core::compute_self_hash;
    use crate::interfaces::ContentSourceError;
    use time::OffsetDateTime;

    struct StubChart;
    impl ChartDigestSource for StubChart {
        fn chart_digest(
            &self,
            chart_ref: &str,
            _resolved_version: Option<&str>,
        ) -> Result<crate::core::HashDigest, ContentSourceError> {
            Ok(crate::core::hashing::hash_bytes(
                HashAlgorithm::Sha256,
                chart_ref.as_bytes(),
            ))
        }
    }
    struct StubValues;
    impl ValuesContentSource for StubValues {
        fn read(&self, path: &std::path::Path) -> Result<Vec<u8>, ContentSourceError> {
            Ok(path.to_string_lossy().into_owned().into_bytes())
        }
    }

    fn hash_ctx() -> HashContext {
        HashContext {
            stack_git: crate::core::GitIdentity {
                commit: "abc".to_string(),
                dirty: false,
            },
            binary: crate::core::BinaryIdentity {
                version: "0.1.0".to_string(),
                commit: "def".to_string(),
            },
            kube_context: "ctx".to_string(),
            include_values_contents: true,
            algorithm: HashAlgorithm::Sha256,
        }
    }

    fn node() -> crate::core::ResolvedRelease {
        crate::core::ResolvedRelease {
            id: NodeId::new("prod/default/app"),
            name: crate::core::ReleaseName::new("app"),
            cluster: crate::core::ClusterName::new("prod"),
            namespace: crate::core::Namespace::new("default"),
            chart: "repo/app".to_string(),
            chart_version: None,
            resolved_chart_version: None,
            values_files: vec![std::path::PathBuf::from("values.yaml")],
            set_overrides: std::collections::BTreeMap::new(),
            tags: Vec::new(),
            needs: Vec::new(),
            inferred_needs: Vec::new(),
            apply_options: crate::core::ApplyOptions::default(),
            delete_options: crate::core::DeleteOptions::default(),
            verify_options: crate::core::VerifyOptions::default(),
            parallelism_group: None,
            effective_input: None,
        }
    }

    fn plan_with_input(input: Option<crate::core::EffectiveInput>) -> Plan {
        let mut n = node();
        n.effective_input = input;
        Plan {
            nodes: vec![n.clone()],
            edges: Vec::new(),
            stack_root: std::path::PathBuf::from("/stack"),
            stack_name: crate::core::StackName::new("demo"),
            profile: None,
            runner: crate::core::RunnerConfig::default(),
            execution_groups: vec![vec![n.id]],
        }
    }

    fn run_with_plan(plan: &Plan) -> Run {
        Run {
            run_id: RunId::new("2026-01-01T00-00-00.000000000Z"),
            command: Command::Apply,
            profile: None,
            selector: SelectorSnapshot::default(),
            concurrency: 1,
            fail_mode: FailMode::FailFast,
            sealed_plan_json: serde_json::to_string(plan).expect("serialize plan"),
            plan_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
            resumes: None,
        }
    }

    fn succeeded_event(run_id: &RunId) -> RunEvent {
        let mut event = RunEvent {
            run_id: run_id.clone(),
            seq: 0,
            ts: Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH),
            kind: RunEventKind::NodeSucceeded,
            node_id: Some(NodeId::new("prod/default/app")),
            attempt: Some(1),
            message: "ok".to_string(),
            error: None,
            prev_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
            self_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
        };
        event.self_hash = compute_self_hash(HashAlgorithm::Sha256, &event);
        event
    }

    #[test]
    fn no_drift_when_inputs_are_identical() {
        let ctx = hash_ctx();
        let input = hasher::compute(&node(), &ctx, &StubChart, &StubValues).expect("compute");
        let prior_plan = plan_with_input(Some(input));
        let current_plan = plan_with_input(None);
        let run = run_with_plan(&prior_plan);
        let events = vec![succeeded_event(&run.run_id)];

        let decision =
            resume(&run, &events, &current_plan, &ctx, &StubChart, &StubValues, false)
                .expect("resumes without drift");
        assert!(decision.drift.is_empty());
        assert!(decision.already_succeeded.contains(&NodeId::new("prod/default/app")));
    }

    #[test]
    fn drift_blocks_resume_without_allow_drift() {
        let ctx = hash_ctx();
        let mut stale_node = node();
        stale_node.values_files.push(std::path::PathBuf::from("extra.yaml"));
        let input = hasher::compute(&stale_node, &ctx, &StubChart, &StubValues).expect("compute");
        let prior_plan = plan_with_input(Some(input));
        let current_plan = plan_with_input(None);
        let run = run_with_plan(&prior_plan);
        let events = vec![succeeded_event(&run.run_id)];

        let err = resume(&run, &events, &current_plan, &ctx, &StubChart, &StubValues, false)
            .expect_err("drift should block resume");
        assert!(matches!(err, ResumeError::Drift(_)));
    }

    #[test]
    fn allow_drift_proceeds_and_reports_entries() {
        let ctx = hash_ctx();
        let mut stale_node = node();
        stale_node.values_files.push(std::path::PathBuf::from("extra.yaml"));
        let input = hasher::compute(&stale_node, &ctx, &StubChart, &StubValues).expect("compute");
        let prior_plan = plan_with_input(Some(input));
        let current_plan = plan_with_input(None);
        let run = run_with_plan(&prior_plan);
        let events = vec![succeeded_event(&run.run_id)];

        let decision =
            resume(&run, &events, &current_plan, &ctx, &StubChart, &StubValues, true)
                .expect("allowed");
        assert_eq!(decision.drift.len(), 1);
    }
}
