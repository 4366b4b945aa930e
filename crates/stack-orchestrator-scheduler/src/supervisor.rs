// stack-orchestrator-scheduler/src/supervisor.rs
// ============================================================================
// Module: Supervisor
// Description: Drives a pool of worker threads against a plan's dependency
//              graph, honoring concurrency gates, progressive ramp-up, and
//              retry/backoff, persisting every transition as a hash-chained
//              run event (spec §4.7, §5).
// Purpose: The only component that actually spawns threads; everything it
//          calls into (`state`, `gates`, `ramp`, `backoff`) is pure and
//          directly unit-tested on its own.
// Dependencies: stack-orchestrator-core, crate::state, crate::config,
//               crate::backoff
// ============================================================================

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use stack_orchestrator_core::core::Clock;
use stack_orchestrator_core::core::Command;
use stack_orchestrator_core::core::Edge;
use stack_orchestrator_core::core::EventError;
use stack_orchestrator_core::core::HashAlgorithm;
use stack_orchestrator_core::core::NodeId;
use stack_orchestrator_core::core::Plan;
use stack_orchestrator_core::core::Run;
use stack_orchestrator_core::core::RunEventKind;
use stack_orchestrator_core::core::RunStatus;
use stack_orchestrator_core::core::RunSummary;
use stack_orchestrator_core::core::Timestamp;
use stack_orchestrator_core::interfaces::ChartRenderer;
use stack_orchestrator_core::interfaces::ExecutorAdapter;
use stack_orchestrator_core::interfaces::RunStore;
use stack_orchestrator_core::runtime::CancellationToken;

use crate::backoff::backoff_duration;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::state::NodeOutcome;
use crate::state::SupervisorState;

/// How long the main dispatch loop sleeps between checks of
/// `target_workers` when nothing has woken it, as a safety net against a
/// missed notification.
const RAMP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Drives one run to completion (spec §4.7, §5). Owns the ready-queue
/// mutex and condvar; worker threads and the dispatch loop below
/// communicate through them rather than channels, matching the spec's
/// "transactional gate decisions" requirement.
pub struct Supervisor<'a> {
    state: Mutex<SupervisorState>,
    condvar: Condvar,
    store: &'a dyn RunStore,
    executor: &'a dyn ExecutorAdapter,
    clock: &'a dyn Clock,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl<'a> Supervisor<'a> {
    /// Builds a supervisor for one run over `plan`, operating on `edges`
    /// (the plan's own edges for apply, [`dag::reversed`] for delete).
    /// `seed_attempts` carries over prior-run attempt counts when resuming
    /// (spec §4.10 "Rerun-failed filter"); pass an empty map for a fresh
    /// run.
    #[must_use]
    pub fn new(
        plan: &Plan,
        edges: &[Edge],
        run_id: stack_orchestrator_core::core::RunId,
        store: &'a dyn RunStore,
        executor: &'a dyn ExecutorAdapter,
        clock: &'a dyn Clock,
        renderer: Option<&dyn ChartRenderer>,
        config: SchedulerConfig,
        cancel: CancellationToken,
        hash_algorithm: HashAlgorithm,
        seed_attempts: &std::collections::BTreeMap<NodeId, u32>,
    ) -> Self {
        let state = SupervisorState::new(plan, edges, plan.runner.clone(), run_id, renderer, hash_algorithm, seed_attempts);
        Self {
            state: Mutex::new(state),
            condvar: Condvar::new(),
            store,
            executor,
            clock,
            config,
            cancel,
        }
    }

    /// Signals cooperative cancellation: dispatch of new nodes stops, and
    /// the executor's cancellation token is tripped so in-flight Helm
    /// invocations unwind (spec §5 "Cancellation").
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.lock_state().cancel();
        self.condvar.notify_all();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a run event while `state` is already held locked, keeping
    /// event generation (which advances `seq`/`prev_hash`) and the durable
    /// write serialized together (spec §5 "writes from the supervisor...
    /// are serialized").
    fn append(
        &self,
        state: &mut SupervisorState,
        kind: RunEventKind,
        node_id: Option<NodeId>,
        attempt: Option<u32>,
        message: String,
        error: Option<EventError>,
    ) -> Result<(), SchedulerError> {
        let event = state.next_event(self.clock.now(), kind, node_id, attempt, message, error);
        self.store.append_event(&event)?;
        Ok(())
    }

    fn save_summary(&self, state: &SupervisorState, run_id: &stack_orchestrator_core::core::RunId, started_at: Timestamp) -> Result<(), SchedulerError> {
        let summary = RunSummary {
            run_id: run_id.clone(),
            status: state.run_status(),
            started_at,
            updated_at: self.clock.now(),
            totals: state.totals(),
            nodes: state.node_statuses(),
        };
        self.store.save_summary(&summary)?;
        Ok(())
    }

    /// Runs `plan` under `run` to completion: spawns workers lazily as
    /// `target_workers` ramps up, blocks until every node is terminal (or
    /// fail-fast/cancellation has stopped dispatch), and returns the final
    /// summary.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the run store rejects a read or
    /// write, or the supervisor's state mutex was poisoned by a panicking
    /// worker.
    pub fn run(&self, plan: &Plan, run: &Run) -> Result<RunSummary, SchedulerError> {
        let started_at = self.clock.now();
        {
            let mut state = self.lock_state();
            self.append(
                &mut state,
                RunEventKind::RunStarted,
                None,
                None,
                format!("run {} started ({} nodes)", run.run_id, plan.nodes.len()),
                None,
            )?;
            self.save_summary(&state, &run.run_id, started_at)?;
        }

        std::thread::scope(|scope| {
            let mut spawned: u32 = 0;
            let mut handles = Vec::new();
            loop {
                let target = {
                    let state = self.lock_state();
                    if state.is_finished() {
                        break;
                    }
                    state.target_workers()
                };
                while spawned < target {
                    spawned += 1;
                    handles.push(scope.spawn(|| self.worker_loop(plan, run)));
                }
                let state = self.lock_state();
                if state.is_finished() {
                    break;
                }
                let _ = self.condvar.wait_timeout(state, RAMP_POLL_INTERVAL);
            }
            for handle in handles {
                let _ = handle.join();
            }
        });

        let mut state = self.lock_state();
        let final_status = state.run_status();
        let message = match final_status {
            RunStatus::Succeeded => "run completed: all nodes succeeded".to_string(),
            RunStatus::Failed => state
                .primary_error()
                .map_or_else(|| "run completed: failed".to_string(), |error| format!("run completed: failed ({})", error.message)),
            RunStatus::Cancelled => "run completed: cancelled".to_string(),
            RunStatus::Running => "run completed: incomplete".to_string(),
        };
        let completion_error = state.primary_error().cloned();
        self.append(&mut state, RunEventKind::RunCompleted, None, None, message, completion_error)?;
        self.save_summary(&state, &run.run_id, started_at)?;
        Ok(RunSummary {
            run_id: run.run_id.clone(),
            status: final_status,
            started_at,
            updated_at: self.clock.now(),
            totals: state.totals(),
            nodes: state.node_statuses(),
        })
    }

    /// One worker's lifetime: repeatedly dequeues a ready node, runs it
    /// (with inline retries) to a terminal outcome, and exits once the run
    /// is finished.
    fn worker_loop(&self, plan: &Plan, run: &Run) {
        loop {
            let dispatch = {
                let mut state = self.lock_state();
                loop {
                    if let Some(pair) = state.dequeue_ready() {
                        break Some(pair);
                    }
                    if state.is_finished() {
                        break None;
                    }
                    state = self.condvar.wait_timeout(state, RAMP_POLL_INTERVAL).map_or_else(|poisoned| poisoned.into_inner().0, |(guard, _)| guard);
                }
            };
            let Some((node_id, attempt)) = dispatch else {
                return;
            };
            self.run_node(plan, run, node_id, attempt);
            self.condvar.notify_all();
        }
    }

    /// Runs one node to a terminal outcome, retrying inline per spec §4.7
    /// ("re-execute the same node") until it succeeds, exhausts its retry
    /// budget, or hits a non-retryable error.
    fn run_node(&self, plan: &Plan, run: &Run, node_id: NodeId, mut attempt: u32) {
        let Some(node) = plan.node(&node_id) else {
            return;
        };
        loop {
            if let Err(err) = self.emit_running(&node_id, attempt) {
                log_store_error(&err);
                return;
            }

            let outcome = match run.command {
                Command::Apply => self.executor.apply(node, &self.cancel),
                Command::Delete => self.executor.delete(node, &self.cancel),
            };

            match outcome {
                Ok(execution) => {
                    let mut state = self.lock_state();
                    if let Err(err) = self.append(
                        &mut state,
                        RunEventKind::NodeSucceeded,
                        Some(node_id.clone()),
                        Some(attempt),
                        execution.detail,
                        None,
                    ) {
                        log_store_error(&err);
                    }
                    let newly_blocked = state.record_terminal(&node_id, NodeOutcome::Succeeded, None);
                    self.emit_blocked(&mut state, &newly_blocked);
                    let _ = self.save_summary(&state, &run.run_id, self.clock.now());
                    return;
                }
                Err(node_error) => {
                    let event_error = EventError {
                        class: node_error.class,
                        message: node_error.message.clone(),
                    };
                    let max_attempts = plan.runner.max_attempts;
                    let can_retry = node_error.class.is_retryable() && attempt < max_attempts;

                    let mut state = self.lock_state();
                    if let Err(err) = self.append(
                        &mut state,
                        RunEventKind::NodeFailed,
                        Some(node_id.clone()),
                        Some(attempt),
                        node_error.message.clone(),
                        Some(event_error.clone()),
                    ) {
                        log_store_error(&err);
                    }

                    if can_retry {
                        let next_attempt = state.record_retry(&node_id, event_error);
                        if let Err(err) = self.append(
                            &mut state,
                            RunEventKind::NodeRetryScheduled,
                            Some(node_id.clone()),
                            Some(next_attempt),
                            "retry scheduled".to_string(),
                            None,
                        ) {
                            log_store_error(&err);
                        }
                        drop(state);
                        let jitter = jitter_unit(&node_id, attempt);
                        std::thread::sleep(backoff_duration(attempt, &self.config, jitter));
                        attempt = next_attempt;
                        continue;
                    }

                    let newly_blocked = state.record_terminal(&node_id, NodeOutcome::Failed, Some(event_error));
                    self.emit_blocked(&mut state, &newly_blocked);
                    let _ = self.save_summary(&state, &run.run_id, self.clock.now());
                    return;
                }
            }
        }
    }

    fn emit_running(&self, node_id: &NodeId, attempt: u32) -> Result<(), SchedulerError> {
        let mut state = self.lock_state();
        self.append(&mut state, RunEventKind::NodeRunning, Some(node_id.clone()), Some(attempt), "running".to_string(), None)
    }

    fn emit_blocked(&self, state: &mut SupervisorState, newly_blocked: &[NodeId]) {
        for blocked_id in newly_blocked {
            if let Err(err) = self.append(state, RunEventKind::NodeBlocked, Some(blocked_id.clone()), None, "blocked on a failed predecessor".to_string(), None) {
                log_store_error(&err);
            }
        }
    }
}

/// Swallows a store error encountered mid-run: the node-level outcome has
/// already been decided and must not be lost because an audit write
/// failed. The error would already have been surfaced as a hard failure
/// had it occurred on the `RUN_STARTED`/`RUN_COMPLETED` writes in
/// [`Supervisor::run`], which do propagate.
fn log_store_error(_err: &SchedulerError) {}

/// Deterministic per-attempt jitter fraction in `[0.0, 1.0)`, derived from
/// the node id and attempt number rather than a random source so retries
/// stay reproducible across identical runs.
fn jitter_unit(node_id: &NodeId, attempt: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    node_id.hash(&mut hasher);
    attempt.hash(&mut hasher);
    #[allow(clippy::cast_precision_loss, reason = "jitter only needs a coarse fractional spread")]
    let fraction = (hasher.finish() % 1_000_000) as f64 / 1_000_000.0;
    fraction
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

    use std::collections::BTreeMap;

    use stack_orchestrator_core::core::ApplyOptions;
    use stack_orchestrator_core::core::ClusterName;
    use stack_orchestrator_core::core::DeleteOptions;
    use stack_orchestrator_core::core::ErrorClass;
    use stack_orchestrator_core::core::FailMode;
    use stack_orchestrator_core::core::FixedClock;
    use stack_orchestrator_core::core::Namespace;
    use stack_orchestrator_core::core::ReleaseName;
    use stack_orchestrator_core::core::ResolvedRelease;
    use stack_orchestrator_core::core::RunId;
    use stack_orchestrator_core::core::RunnerConfig;
    use stack_orchestrator_core::core::StackName;
    use stack_orchestrator_core::core::VerifyOptions;
    use stack_orchestrator_core::interfaces::StoreError;
    use time::OffsetDateTime;

    use stack_orchestrator_executor::FakeExecutorAdapter;
    use stack_orchestrator_executor::ScriptedResult;

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<Vec<stack_orchestrator_core::core::RunEvent>>,
        summaries: Mutex<Vec<RunSummary>>,
    }

    impl RunStore for MemoryStore {
        fn create_run(&self, _run: &Run) -> Result<(), StoreError> {
            Ok(())
        }
        fn load_run(&self, _run_id: &RunId) -> Result<Option<Run>, StoreError> {
            Ok(None)
        }
        fn latest_run(&self, _stack_root: &std::path::Path) -> Result<Option<Run>, StoreError> {
            Ok(None)
        }
        fn append_event(&self, event: &stack_orchestrator_core::core::RunEvent) -> Result<(), StoreError> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
            Ok(())
        }
        fn load_events(&self, _run_id: &RunId) -> Result<Vec<stack_orchestrator_core::core::RunEvent>, StoreError> {
            Ok(self.events.lock().unwrap_or_else(PoisonError::into_inner).clone())
        }
        fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
            self.summaries.lock().unwrap_or_else(PoisonError::into_inner).push(summary.clone());
            Ok(())
        }
        fn load_summary(&self, _run_id: &RunId) -> Result<Option<RunSummary>, StoreError> {
            Ok(self.summaries.lock().unwrap_or_else(PoisonError::into_inner).last().cloned())
        }
    }

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

    fn plan(ids: &[&str], edges: Vec<Edge>, runner: RunnerConfig) -> Plan {
        Plan {
            nodes: ids.iter().map(|id| node(id)).collect(),
            edges,
            stack_root: std::path::PathBuf::from("/stacks/demo"),
            stack_name: StackName::new("demo"),
            profile: None,
            runner,
            execution_groups: Vec::new(),
        }
    }

    fn run(id: &str, concurrency: u32, fail_mode: FailMode) -> (Run, RunnerConfig) {
        let runner = RunnerConfig {
            concurrency,
            fail_mode,
            ..RunnerConfig::default()
        };
        let run = Run {
            run_id: RunId::new(id),
            command: Command::Apply,
            profile: None,
            selector: stack_orchestrator_core::core::SelectorSnapshot::default(),
            concurrency,
            fail_mode,
            sealed_plan_json: String::new(),
            plan_hash: stack_orchestrator_core::core::HashDigest::of_empty(HashAlgorithm::Sha256),
            resumes: None,
        };
        (run, runner)
    }

    fn clock() -> FixedClock {
        FixedClock(Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH))
    }

    #[test]
    fn linear_chain_runs_to_completion_in_order() {
        let edge = |from: &str, to: &str| Edge {
            from_id: NodeId::new(from),
            to_id: NodeId::new(to),
        };
        let (run, runner) = run("r1", 2, FailMode::FailFast);
        let plan = plan(&["a", "b", "c", "d"], vec![edge("a", "b"), edge("b", "c"), edge("c", "d")], runner);
        let store = MemoryStore::default();
        let executor = FakeExecutorAdapter::new();
        let clock = clock();
        let supervisor = Supervisor::new(
            &plan,
            &plan.edges,
            run.run_id.clone(),
            &store,
            &executor,
            &clock,
            None,
            SchedulerConfig::default(),
            CancellationToken::new(),
            HashAlgorithm::Sha256,
            &std::collections::BTreeMap::new(),
        );
        let summary = supervisor.run(&plan, &run).expect("run completes");
        assert_eq!(summary.status, RunStatus::Succeeded);
        assert_eq!(summary.totals.succeeded, 4);
        let calls = executor.calls();
        assert_eq!(calls.len(), 4, "each node applied exactly once");
    }

    #[test]
    fn fail_fast_blocks_the_downstream_branch() {
        let edge = |from: &str, to: &str| Edge {
            from_id: NodeId::new(from),
            to_id: NodeId::new(to),
        };
        let (run, runner) = run("r1", 1, FailMode::FailFast);
        let plan = plan(&["a", "b", "c"], vec![edge("a", "b"), edge("b", "c")], runner);
        let store = MemoryStore::default();
        let executor = FakeExecutorAdapter::new();
        executor.script(NodeId::new("b"), ScriptedResult::Fail(stack_orchestrator_core::interfaces::NodeError::new(ErrorClass::Other, "boom".to_string())));
        let clock = clock();
        let supervisor = Supervisor::new(
            &plan,
            &plan.edges,
            run.run_id.clone(),
            &store,
            &executor,
            &clock,
            None,
            SchedulerConfig::default(),
            CancellationToken::new(),
            HashAlgorithm::Sha256,
            &std::collections::BTreeMap::new(),
        );
        let summary = supervisor.run(&plan, &run).expect("run completes");
        assert_eq!(summary.status, RunStatus::Failed);
        let c_status = summary.nodes.iter().find(|s| s.node_id.as_str() == "c").expect("c present");
        assert_eq!(c_status.status, stack_orchestrator_core::core::NodeLifecycle::Blocked);
    }

    #[test]
    fn retryable_failure_succeeds_on_a_later_attempt() {
        let (run, mut runner) = run("r1", 1, FailMode::FailFast);
        runner.max_attempts = 3;
        let plan = plan(&["a"], Vec::new(), runner);
        let store = MemoryStore::default();
        let executor = FakeExecutorAdapter::new();
        executor.script(
            NodeId::new("a"),
            ScriptedResult::Fail(stack_orchestrator_core::interfaces::NodeError::new(ErrorClass::RateLimit, "429".to_string())),
        );
        executor.script(
            NodeId::new("a"),
            ScriptedResult::Fail(stack_orchestrator_core::interfaces::NodeError::new(ErrorClass::RateLimit, "429".to_string())),
        );
        executor.script(NodeId::new("a"), ScriptedResult::Succeed);
        let clock = clock();
        let supervisor = Supervisor::new(
            &plan,
            &plan.edges,
            run.run_id.clone(),
            &store,
            &executor,
            &clock,
            None,
            SchedulerConfig {
                base_backoff_ms: 1,
                max_backoff_ms: 1,
                ..SchedulerConfig::default()
            },
            CancellationToken::new(),
            HashAlgorithm::Sha256,
            &std::collections::BTreeMap::new(),
        );
        let summary = supervisor.run(&plan, &run).expect("run completes");
        assert_eq!(summary.status, RunStatus::Succeeded);
        let a_status = summary.nodes.first().expect("node present");
        assert_eq!(a_status.attempt, 3);
        assert_eq!(executor.calls().len(), 3);
    }

    #[test]
    fn resumed_run_seeds_attempt_counter_from_prior_run() {
        let (run, mut runner) = run("r2", 1, FailMode::FailFast);
        runner.max_attempts = 3;
        let plan = plan(&["a"], Vec::new(), runner);
        let store = MemoryStore::default();
        let executor = FakeExecutorAdapter::new();
        executor.script(NodeId::new("a"), ScriptedResult::Succeed);
        let clock = clock();
        let mut seed_attempts = std::collections::BTreeMap::new();
        seed_attempts.insert(NodeId::new("a"), 2);
        let supervisor = Supervisor::new(
            &plan,
            &plan.edges,
            run.run_id.clone(),
            &store,
            &executor,
            &clock,
            None,
            SchedulerConfig::default(),
            CancellationToken::new(),
            HashAlgorithm::Sha256,
            &seed_attempts,
        );
        let summary = supervisor.run(&plan, &run).expect("run completes");
        assert_eq!(summary.status, RunStatus::Succeeded);
        let a_status = summary.nodes.first().expect("node present");
        assert_eq!(
            a_status.attempt, 3,
            "resumed node's attempt counter starts from the carried-over value instead of a fresh budget"
        );
    }
}
