// stack-orchestrator-executor/src/fake.rs
// ============================================================================
// Module: Fake Executor Adapter
// Description: In-memory `ExecutorAdapter` for scheduler and CLI tests.
// Purpose: Scripted outcomes per node id, with a call log, so tests can
//          assert dispatch order and retry behavior without invoking Helm.
// Dependencies: stack-orchestrator-core
// ============================================================================

use std::collections::VecDeque;
use std::sync::Mutex;

use stack_orchestrator_core::core::NodeId;
use stack_orchestrator_core::core::ResolvedRelease;
use stack_orchestrator_core::interfaces::ExecutionOutcome;
use stack_orchestrator_core::interfaces::ExecutorAdapter;
use stack_orchestrator_core::interfaces::NodeError;
use stack_orchestrator_core::runtime::CancellationToken;

/// A single scripted result for one `apply` or `delete` call.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    /// The call succeeds.
    Succeed,
    /// The call fails with the given error.
    Fail(NodeError),
}

/// Records one observed `apply` or `delete` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Node the call targeted.
    pub node_id: NodeId,
    /// Whether this was an apply (`true`) or delete (`false`) call.
    pub is_apply: bool,
}

/// A fake [`ExecutorAdapter`] that returns scripted results per node id, in
/// call order, and records every invocation for test assertions.
#[derive(Debug, Default)]
pub struct FakeExecutorAdapter {
    scripts: Mutex<std::collections::HashMap<NodeId, VecDeque<ScriptedResult>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeExecutorAdapter {
    /// Builds an adapter with no scripted results; unscripted nodes succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `result` as the next outcome for `node_id`.
    pub fn script(&self, node_id: NodeId, result: ScriptedResult) {
        let mut scripts = self.scripts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        scripts.entry(node_id).or_default().push_back(result);
    }

    /// Returns every recorded call, in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    fn next_result(&self, node_id: &NodeId, is_apply: bool) -> Result<ExecutionOutcome, NodeError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                node_id: node_id.clone(),
                is_apply,
            });
        let mut scripts = self.scripts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = scripts.get_mut(node_id).and_then(VecDeque::pop_front);
        match result {
            Some(ScriptedResult::Succeed) | None => Ok(ExecutionOutcome {
                succeeded: true,
                detail: "ok".to_string(),
            }),
            Some(ScriptedResult::Fail(error)) => Err(error),
        }
    }
}

impl ExecutorAdapter for FakeExecutorAdapter {
    fn apply(
        &self,
        node: &ResolvedRelease,
        _cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError> {
        self.next_result(&node.id, true)
    }

    fn delete(
        &self,
        node: &ResolvedRelease,
        _cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError> {
        self.next_result(&node.id, false)
    }
}
