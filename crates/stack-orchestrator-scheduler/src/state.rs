// stack-orchestrator-scheduler/src/state.rs
// ============================================================================
// Module: Supervisor State
// Description: Ready-queue, in-degree, lifecycle, and event-sequencing
//              bookkeeping for one run (spec §4.7, §5).
// Purpose: A plain struct holding everything the supervisor's mutex guards,
//          kept free of `Mutex`/`Condvar`/thread concerns so the scheduling
//          arithmetic is directly unit-testable.
// Dependencies: stack-orchestrator-core, crate::gates, crate::ramp
// ============================================================================

use std::collections::BTreeMap;

use stack_orchestrator_core::core::Edge;
use stack_orchestrator_core::core::EventError;
use stack_orchestrator_core::core::HashAlgorithm;
use stack_orchestrator_core::core::HashDigest;
use stack_orchestrator_core::core::NodeId;
use stack_orchestrator_core::core::NodeLifecycle;
use stack_orchestrator_core::core::NodeStatus;
use stack_orchestrator_core::core::Plan;
use stack_orchestrator_core::core::RunEvent;
use stack_orchestrator_core::core::RunEventKind;
use stack_orchestrator_core::core::RunId;
use stack_orchestrator_core::core::RunStatus;
use stack_orchestrator_core::core::RunTotals;
use stack_orchestrator_core::core::RunnerConfig;
use stack_orchestrator_core::core::Timestamp;
use stack_orchestrator_core::core::chain::compute_self_hash;
use stack_orchestrator_core::interfaces::ChartRenderer;
use stack_orchestrator_core::runtime::dag;

use crate::gates::GateCounters;
use crate::gates::GateKey;
use crate::gates::infer_primary_kind;
use crate::ramp::RampState;

/// How a node's single execution attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The node succeeded.
    Succeeded,
    /// The node exhausted retries or hit a non-retryable error.
    Failed,
}

/// All scheduling state for one run, mutated under the supervisor's mutex.
#[derive(Debug)]
pub struct SupervisorState {
    /// Node lookup by id (borrowed from the plan).
    successors: BTreeMap<NodeId, Vec<NodeId>>,
    /// Remaining predecessor count per node.
    in_degree: BTreeMap<NodeId, usize>,
    /// Ids ready to run, kept sorted by id for deterministic tie-breaking.
    ready: Vec<NodeId>,
    /// Current lifecycle per node.
    lifecycle: BTreeMap<NodeId, NodeLifecycle>,
    /// Attempts made so far per node.
    attempts: BTreeMap<NodeId, u32>,
    /// Last recorded error per node.
    last_error: BTreeMap<NodeId, EventError>,
    /// Gate identity per node, resolved once up front.
    gate_keys: BTreeMap<NodeId, GateKey>,
    /// In-flight gate counters.
    gates: GateCounters,
    /// Progressive concurrency ramp state.
    ramp: RampState,
    /// Runner configuration (concurrency ceilings, fail mode, retry budget).
    runner: RunnerConfig,
    /// Run this state belongs to.
    run_id: RunId,
    /// The first non-retryable (or retry-exhausted) node error observed,
    /// preserved as the run's primary error regardless of fail mode.
    primary_error: Option<EventError>,
    /// Set once a failure has stopped new dispatch under fail-fast.
    fail_fast_triggered: bool,
    /// Whether cancellation has been requested.
    cancelled: bool,
    /// Next event sequence number to assign.
    next_seq: u64,
    /// Hash of the most recently appended event's body.
    prev_hash: HashDigest,
    /// Hash algorithm used for event chaining.
    hash_algorithm: HashAlgorithm,
    /// Total node count, for summary totals.
    total_nodes: u32,
}

impl SupervisorState {
    /// Builds initial scheduling state from `plan`, operating over `edges`
    /// (the plan's own edges for apply, [`dag::reversed`] for delete).
    /// `seed_attempts` pre-populates the attempt counter for nodes carried
    /// over from a prior run being resumed (spec §4.10 "Rerun-failed
    /// filter": "Seed the new scheduler with the stored attempt counts so
    /// retry budgets honor cumulative history"); pass an empty map for a
    /// fresh run.
    #[must_use]
    pub fn new(
        plan: &Plan,
        edges: &[Edge],
        runner: RunnerConfig,
        run_id: RunId,
        renderer: Option<&dyn ChartRenderer>,
        hash_algorithm: HashAlgorithm,
        seed_attempts: &BTreeMap<NodeId, u32>,
    ) -> Self {
        let all_ids: Vec<NodeId> = plan.nodes.iter().map(|node| node.id.clone()).collect();
        let successors = dag::successors_of(edges);
        let mut in_degree: BTreeMap<NodeId, usize> = all_ids.iter().cloned().map(|id| (id, 0)).collect();
        for edge in edges {
            if let Some(count) = in_degree.get_mut(&edge.to_id) {
                *count += 1;
            }
        }

        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();

        let lifecycle = all_ids.iter().cloned().map(|id| (id, NodeLifecycle::Planned)).collect();
        let gate_keys = plan
            .nodes
            .iter()
            .map(|node| (node.id.clone(), GateKey::new(node, infer_primary_kind(renderer, node))))
            .collect();

        let progressive = runner.progressive && runner.concurrency > 1;
        let ramp = RampState::new(runner.concurrency, progressive, &crate::config::SchedulerConfig::default());

        Self {
            successors,
            in_degree,
            ready,
            lifecycle,
            attempts: seed_attempts.clone(),
            last_error: BTreeMap::new(),
            gate_keys,
            gates: GateCounters::new(),
            ramp,
            total_nodes: u32::try_from(all_ids.len()).unwrap_or(u32::MAX),
            runner,
            run_id,
            primary_error: None,
            fail_fast_triggered: false,
            cancelled: false,
            next_seq: 0,
            prev_hash: HashDigest::of_empty(hash_algorithm),
            hash_algorithm,
        }
    }

    /// Overrides the ramp state built in [`Self::new`], used by callers that
    /// pass explicit scheduler tuning instead of the defaults.
    pub fn set_ramp(&mut self, ramp: RampState) {
        self.ramp = ramp;
    }

    /// Signals cooperative cancellation: no further nodes are dequeued.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Current `targetWorkers` ceiling from the progressive ramp.
    #[must_use]
    pub fn target_workers(&self) -> u32 {
        self.ramp.target_workers()
    }

    /// Dequeues the highest-priority ready node that clears every
    /// concurrency gate, marking it running and consuming one attempt.
    /// Returns `None` when the queue is empty, cancelled, fail-fast has
    /// tripped, or every ready node is currently gated.
    pub fn dequeue_ready(&mut self) -> Option<(NodeId, u32)> {
        if self.cancelled || self.fail_fast_triggered {
            return None;
        }
        let target = self.ramp.target_workers();
        let gate_keys = &self.gate_keys;
        let gates = &self.gates;
        let runner = &self.runner;
        let position = self
            .ready
            .iter()
            .position(|id| gate_keys.get(id).is_some_and(|key| gates.admits(key, runner, target)))?;
        let id = self.ready.remove(position);
        if let Some(key) = self.gate_keys.get(&id).cloned() {
            self.gates.record_start(&key);
        }
        self.lifecycle.insert(id.clone(), NodeLifecycle::Running);
        let attempt = self.attempts.entry(id.clone()).or_insert(0);
        *attempt += 1;
        Some((id.clone(), *attempt))
    }

    /// Whether any node is currently dispatched.
    #[must_use]
    pub fn has_running(&self) -> bool {
        self.lifecycle.values().any(|status| *status == NodeLifecycle::Running)
    }

    /// Whether the run has nothing left to dispatch and nothing in flight.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.ready.is_empty() && !self.has_running()
    }

    /// Whether the run has reached a terminal dispatch state: nothing is
    /// running, and nothing further will ever be dequeued either because
    /// the ready queue is empty, cancellation was requested, or fail-fast
    /// has tripped (spec §4.7 "stops dispatching new nodes on the first
    /// failure"; any sibling branches left in the ready queue simply never
    /// run). Workers exit once this holds.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.has_running() && (self.ready.is_empty() || self.cancelled || self.fail_fast_triggered)
    }

    /// Records a retryable failure that will be re-attempted by the same
    /// worker (spec §4.7 "re-execute the same node"): the node keeps its
    /// `Running` lifecycle and gate slot, and the attempt counter advances.
    /// Returns the attempt number about to run.
    pub fn record_retry(&mut self, id: &NodeId, error: EventError) -> u32 {
        self.ramp.record_failure(error.class);
        self.last_error.insert(id.clone(), error);
        let attempt = self.attempts.entry(id.clone()).or_insert(0);
        *attempt += 1;
        *attempt
    }

    /// Records a terminal node outcome and cascades lifecycle/in-degree
    /// updates to successors. Returns the ids of any successors newly
    /// transitioned to `blocked` as a result, in the order they were
    /// discovered, so callers can emit one `NODE_BLOCKED` event per id.
    pub fn record_terminal(&mut self, id: &NodeId, outcome: NodeOutcome, error: Option<EventError>) -> Vec<NodeId> {
        self.release_gate(id);
        match outcome {
            NodeOutcome::Succeeded => {
                self.ramp.record_success();
                self.lifecycle.insert(id.clone(), NodeLifecycle::Succeeded);
            }
            NodeOutcome::Failed => {
                if let Some(error) = &error {
                    self.ramp.record_failure(error.class);
                    self.last_error.insert(id.clone(), error.clone());
                    if self.primary_error.is_none() {
                        self.primary_error = Some(error.clone());
                    }
                }
                self.lifecycle.insert(id.clone(), NodeLifecycle::Failed);
                if self.runner.fail_mode == stack_orchestrator_core::core::FailMode::FailFast {
                    self.fail_fast_triggered = true;
                }
            }
        }
        let mut newly_blocked = Vec::new();
        self.propagate(id, outcome == NodeOutcome::Succeeded, &mut newly_blocked);
        newly_blocked
    }

    fn release_gate(&mut self, id: &NodeId) {
        if let Some(key) = self.gate_keys.get(id).cloned() {
            self.gates.record_finish(&key);
        }
    }

    /// Decrements each successor's in-degree; successors of a non-succeeded
    /// node are marked `blocked` instead of becoming ready, and that
    /// blocking cascades transitively. Newly blocked ids are appended to
    /// `newly_blocked`.
    fn propagate(&mut self, id: &NodeId, succeeded: bool, newly_blocked: &mut Vec<NodeId>) {
        let Some(successors) = self.successors.get(id).cloned() else {
            return;
        };
        for successor in successors {
            if let Some(count) = self.in_degree.get_mut(&successor) {
                *count = count.saturating_sub(1);
                let zero = *count == 0;
                if !succeeded {
                    self.block(&successor, newly_blocked);
                } else if zero && self.lifecycle.get(&successor) == Some(&NodeLifecycle::Planned) {
                    self.ready.push(successor.clone());
                    self.ready.sort();
                }
            }
        }
    }

    /// Marks `id` blocked (if not already terminal) and cascades to its own
    /// successors so the whole downstream branch resolves.
    fn block(&mut self, id: &NodeId, newly_blocked: &mut Vec<NodeId>) {
        let current = self.lifecycle.get(id).copied().unwrap_or(NodeLifecycle::Planned);
        if matches!(current, NodeLifecycle::Succeeded | NodeLifecycle::Failed | NodeLifecycle::Blocked) {
            return;
        }
        self.lifecycle.insert(id.clone(), NodeLifecycle::Blocked);
        self.ready.retain(|ready_id| ready_id != id);
        newly_blocked.push(id.clone());
        self.propagate(id, false, newly_blocked);
    }

    /// Whether fail-fast has stopped further dispatch.
    #[must_use]
    pub const fn fail_fast_triggered(&self) -> bool {
        self.fail_fast_triggered
    }

    /// The first failure's error, preserved as the run's primary error.
    #[must_use]
    pub fn primary_error(&self) -> Option<&EventError> {
        self.primary_error.as_ref()
    }

    /// Builds the next event in this run's hash chain, advancing `seq` and
    /// `prev_hash` as a side effect.
    pub fn next_event(
        &mut self,
        ts: Timestamp,
        kind: RunEventKind,
        node_id: Option<NodeId>,
        attempt: Option<u32>,
        message: String,
        error: Option<EventError>,
    ) -> RunEvent {
        let mut event = RunEvent {
            run_id: self.run_id.clone(),
            seq: self.next_seq,
            ts,
            kind,
            node_id,
            attempt,
            message,
            error,
            prev_hash: self.prev_hash.clone(),
            self_hash: HashDigest::of_empty(self.hash_algorithm),
        };
        event.self_hash = compute_self_hash(self.hash_algorithm, &event);
        self.next_seq += 1;
        self.prev_hash = event.self_hash.clone();
        event
    }

    /// Aggregate status counts across all nodes.
    #[must_use]
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            planned: self.total_nodes,
            ..RunTotals::default()
        };
        for status in self.lifecycle.values() {
            match status {
                NodeLifecycle::Succeeded => totals.succeeded += 1,
                NodeLifecycle::Failed => totals.failed += 1,
                NodeLifecycle::Blocked => totals.blocked += 1,
                NodeLifecycle::Running => totals.running += 1,
                NodeLifecycle::Planned => {}
            }
        }
        totals
    }

    /// Per-node status snapshot, in a stable node-id order.
    #[must_use]
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        self.lifecycle
            .iter()
            .map(|(id, status)| NodeStatus {
                node_id: id.clone(),
                status: *status,
                attempt: self.attempts.get(id).copied().unwrap_or(0),
                error: self.last_error.get(id).cloned(),
            })
            .collect()
    }

    /// Overall run status implied by current lifecycle state.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        if self.cancelled {
            return RunStatus::Cancelled;
        }
        let totals = self.totals();
        if totals.failed > 0 || totals.blocked > 0 {
            RunStatus::Failed
        } else if totals.succeeded == self.total_nodes {
            RunStatus::Succeeded
        } else {
            RunStatus::Running
        }
    }

    /// Current retry attempt count for a node.
    #[must_use]
    pub fn attempts_for(&self, id: &NodeId) -> u32 {
        self.attempts.get(id).copied().unwrap_or(0)
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

    use stack_orchestrator_core::core::ApplyOptions;
    use stack_orchestrator_core::core::ClusterName;
    use stack_orchestrator_core::core::DeleteOptions;
    use stack_orchestrator_core::core::ErrorClass;
    use stack_orchestrator_core::core::Namespace;
    use stack_orchestrator_core::core::ReleaseName;
    use stack_orchestrator_core::core::ResolvedRelease;
    use stack_orchestrator_core::core::StackName;
    use stack_orchestrator_core::core::VerifyOptions;
    use time::OffsetDateTime;

    use super::*;

    fn node(id: &str) -> ResolvedRelease {
        ResolvedRelease {
            id: NodeId::new(id),
            name: ReleaseName::new(id),
            cluster: ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "charts/app".to_string(),
            chart_version: None,
            resolved_chart_version: None,
            values_files: Vec::new(),
            set_overrides: BTreeMap::new(),
            tags: Vec::new(),
            needs: Vec::new(),
            inferred_needs: Vec::new(),
            apply_options: ApplyOptions::default(),
            delete_options: DeleteOptions::default(),
            verify_options: VerifyOptions::default(),
            parallelism_group: None,
            effective_input: None,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from_id: NodeId::new(from),
            to_id: NodeId::new(to),
        }
    }

    fn plan(ids: &[&str], edges: Vec<Edge>) -> Plan {
        Plan {
            nodes: ids.iter().map(|id| node(id)).collect(),
            edges,
            stack_root: std::path::PathBuf::from("/stacks/demo"),
            stack_name: StackName::new("demo"),
            profile: None,
            runner: RunnerConfig::default(),
            execution_groups: Vec::new(),
        }
    }

    fn ts() -> Timestamp {
        Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn linear_chain_dequeues_one_at_a_time() {
        let plan = plan(&["a", "b", "c"], vec![edge("a", "b"), edge("b", "c")]);
        let mut state = SupervisorState::new(&plan, &plan.edges, RunnerConfig::default(), RunId::new("r1"), None, HashAlgorithm::Sha256, &BTreeMap::new());
        let (first, attempt) = state.dequeue_ready().expect("a is ready");
        assert_eq!(first.as_str(), "a");
        assert_eq!(attempt, 1);
        assert!(state.dequeue_ready().is_none(), "b is blocked on a");
        state.record_terminal(&first, NodeOutcome::Succeeded, None);
        let (second, _) = state.dequeue_ready().expect("b is now ready");
        assert_eq!(second.as_str(), "b");
    }

    #[test]
    fn failed_predecessor_blocks_successor_under_fail_fast() {
        let plan = plan(&["a", "b", "c"], vec![edge("a", "b"), edge("b", "c")]);
        let mut runner = RunnerConfig::default();
        runner.fail_mode = stack_orchestrator_core::core::FailMode::FailFast;
        let mut state = SupervisorState::new(&plan, &plan.edges, runner, RunId::new("r1"), None, HashAlgorithm::Sha256, &BTreeMap::new());
        let (a, _) = state.dequeue_ready().expect("a ready");
        state.record_terminal(&a, NodeOutcome::Succeeded, None);
        let (b, _) = state.dequeue_ready().expect("b ready");
        let error = EventError {
            class: ErrorClass::Other,
            message: "boom".to_string(),
        };
        let newly_blocked = state.record_terminal(&b, NodeOutcome::Failed, Some(error));
        assert_eq!(newly_blocked, vec![NodeId::new("c")]);
        assert!(state.fail_fast_triggered());
        let statuses = state.node_statuses();
        let c_status = statuses.iter().find(|s| s.node_id.as_str() == "c").expect("c present");
        assert_eq!(c_status.status, NodeLifecycle::Blocked);
        assert_eq!(state.run_status(), RunStatus::Failed);
    }

    #[test]
    fn retry_advances_the_attempt_counter_without_requeueing() {
        let plan = plan(&["a"], Vec::new());
        let mut state = SupervisorState::new(&plan, &plan.edges, RunnerConfig::default(), RunId::new("r1"), None, HashAlgorithm::Sha256, &BTreeMap::new());
        let (a, attempt) = state.dequeue_ready().expect("a ready");
        assert_eq!(attempt, 1);
        let next_attempt = state.record_retry(
            &a,
            EventError {
                class: ErrorClass::RateLimit,
                message: "429".to_string(),
            },
        );
        assert_eq!(next_attempt, 2);
        assert!(state.dequeue_ready().is_none(), "node is still held by its own worker, not requeued");
        assert_eq!(state.attempts_for(&a), 2);
    }

    #[test]
    fn event_chain_hashes_are_linked() {
        let plan = plan(&["a"], Vec::new());
        let mut state = SupervisorState::new(&plan, &plan.edges, RunnerConfig::default(), RunId::new("r1"), None, HashAlgorithm::Sha256, &BTreeMap::new());
        let first = state.next_event(ts(), RunEventKind::RunStarted, None, None, "started".to_string(), None);
        let second = state.next_event(ts(), RunEventKind::NodeRunning, Some(NodeId::new("a")), Some(1), "running".to_string(), None);
        assert_eq!(second.prev_hash, first.self_hash);
        assert_ne!(first.self_hash, second.self_hash);
    }

    #[test]
    fn seed_attempts_carries_over_retry_budget_on_resume() {
        let plan = plan(&["a"], Vec::new());
        let mut seed_attempts = BTreeMap::new();
        seed_attempts.insert(NodeId::new("a"), 2);
        let mut state = SupervisorState::new(
            &plan,
            &plan.edges,
            RunnerConfig::default(),
            RunId::new("r2"),
            None,
            HashAlgorithm::Sha256,
            &seed_attempts,
        );
        assert_eq!(state.attempts_for(&NodeId::new("a")), 2);
        let (a, attempt) = state.dequeue_ready().expect("a ready");
        assert_eq!(attempt, 3, "resumed node continues its attempt count rather than starting fresh");
        assert_eq!(state.attempts_for(&a), 3);
    }
}
