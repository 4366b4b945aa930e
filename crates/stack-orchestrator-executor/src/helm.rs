// stack-orchestrator-executor/src/helm.rs
// ============================================================================
// Module: Helm Executor Adapter
// Description: `ExecutorAdapter` implementation that shells out to a `helm`
//              binary on `PATH`.
// Purpose: Translates a `ResolvedRelease` into `helm upgrade --install` /
//          `helm uninstall` invocations (spec §4.8).
// Dependencies: stack-orchestrator-core, std::process
// ============================================================================

//! ## Overview
//! Each call spawns one `helm` child process, waits for it to exit (or for
//! cancellation to be signalled, which kills the child), and classifies any
//! non-zero-exit failure via [`crate::classify::classify`]. No retry logic
//! lives here: the Supervisor owns attempt counting and backoff (spec §4.7);
//! this adapter only ever makes one invocation per call.

use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;

use stack_orchestrator_core::core::ResolvedRelease;
use stack_orchestrator_core::interfaces::ExecutionOutcome;
use stack_orchestrator_core::interfaces::ExecutorAdapter;
use stack_orchestrator_core::interfaces::NodeError;
use stack_orchestrator_core::runtime::CancellationToken;

use crate::classify::classify;

/// How often the child process is polled for cooperative cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shells out to a `helm` binary for apply/delete invocations.
#[derive(Debug, Clone)]
pub struct HelmExecutorAdapter {
    /// Path to the `helm` binary, or a bare name resolved via `PATH`.
    helm_binary: PathBuf,
    /// Kube context passed to every invocation via `--kube-context`.
    kube_context: Option<String>,
}

impl HelmExecutorAdapter {
    /// Builds an adapter that invokes `helm` (resolved via `PATH`) with no
    /// fixed kube context; the context is taken from the node's cluster
    /// target when set via [`Self::with_kube_context`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            helm_binary: PathBuf::from("helm"),
            kube_context: None,
        }
    }

    /// Overrides the `helm` binary path.
    #[must_use]
    pub fn with_binary(mut self, path: PathBuf) -> Self {
        self.helm_binary = path;
        self
    }

    /// Sets the `--kube-context` passed to every invocation.
    #[must_use]
    pub fn with_kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    /// Builds the base `helm` command with namespace and context flags
    /// common to apply and delete.
    fn base_command(&self, node: &ResolvedRelease) -> Command {
        let mut command = Command::new(&self.helm_binary);
        command.arg("--namespace").arg(node.namespace.as_str());
        if let Some(context) = &self.kube_context {
            command.arg("--kube-context").arg(context);
        }
        command
    }

    fn run(&self, mut command: Command, cancel: &CancellationToken) -> Result<ExecutionOutcome, NodeError> {
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        let child = command.spawn().map_err(|err| {
            NodeError::new(classify(&err.to_string()), format!("failed to spawn helm: {err}"))
        })?;
        let output = wait_with_cancellation(child, cancel)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(ExecutionOutcome {
                succeeded: true,
                detail: stdout,
            })
        } else {
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(NodeError::new(classify(&message), message))
        }
    }
}

impl Default for HelmExecutorAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorAdapter for HelmExecutorAdapter {
    fn apply(
        &self,
        node: &ResolvedRelease,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError> {
        let mut command = self.base_command(node);
        command.args(["upgrade", "--install", node.name.as_str(), &node.chart]);
        if let Some(version) = node.resolved_chart_version.as_ref().or(node.chart_version.as_ref()) {
            command.arg("--version").arg(version);
        }
        for values_file in &node.values_files {
            command.arg("--values").arg(values_file);
        }
        for (key, value) in &node.set_overrides {
            command.arg("--set").arg(format!("{key}={value}"));
        }
        if node.apply_options.atomic {
            command.arg("--atomic");
        }
        if node.apply_options.wait {
            command.arg("--wait");
        }
        command.arg("--timeout").arg(format!("{}s", node.apply_options.timeout_seconds));
        self.run(command, cancel)
    }

    fn delete(
        &self,
        node: &ResolvedRelease,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, NodeError> {
        let mut command = self.base_command(node);
        command.args(["uninstall", node.name.as_str()]);
        if node.delete_options.wait {
            command.arg("--wait");
        }
        command.arg("--timeout").arg(format!("{}s", node.delete_options.timeout_seconds));
        self.run(command, cancel)
    }
}

/// Waits for `child` to exit, polling `cancel` every
/// [`CANCEL_POLL_INTERVAL`] and killing the child if cancellation is
/// signalled mid-wait (spec §9 "Cooperative cancellation").
fn wait_with_cancellation(
    mut child: Child,
    cancel: &CancellationToken,
) -> Result<std::process::Output, NodeError> {
    loop {
        match child.try_wait() {
            Ok(Some(_status)) => {
                return child
                    .wait_with_output()
                    .map_err(|err| NodeError::new(classify(&err.to_string()), err.to_string()));
            }
            Ok(None) => {
                if cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(NodeError::new(
                        stack_orchestrator_core::core::ErrorClass::Other,
                        "cancelled".to_string(),
                    ));
                }
                std::thread::sleep(CANCEL_POLL_INTERVAL);
            }
            Err(err) => {
                return Err(NodeError::new(classify(&err.to_string()), err.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_binary_overrides_the_resolved_helm_path() {
        let adapter = HelmExecutorAdapter::new().with_binary(PathBuf::from("/usr/local/bin/helm"));
        assert_eq!(adapter.helm_binary, PathBuf::from("/usr/local/bin/helm"));
    }

    #[test]
    fn with_kube_context_is_recorded() {
        let adapter = HelmExecutorAdapter::new().with_kube_context("staging");
        assert_eq!(adapter.kube_context.as_deref(), Some("staging"));
    }
}
