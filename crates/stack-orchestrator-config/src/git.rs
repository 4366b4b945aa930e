// stack-orchestrator-config/src/git.rs
// ============================================================================
// Module: Git Identity Probe
// Description: Resolves `{commit, dirty}` for a stack root by shelling out to
//              a local `git` binary.
// Purpose: Implements spec §2 item 1; feeds `GitIdentity` into the Effective
//          Input Hasher and sealed-bundle attestations.
// Dependencies: stack-orchestrator-core
// ============================================================================

use std::path::Path;
use std::process::Command;

use stack_orchestrator_core::core::GitIdentity;

/// Probes `root` for its git commit and dirty state.
///
/// Shells out to `git rev-parse HEAD` and `git status --porcelain`. Any
/// failure (missing binary, not a git repository, I/O error, non-UTF-8
/// output) degrades to [`GitIdentity::unknown`] rather than propagating an
/// error, matching spec §2 item 1: a stack need not live in a git
/// repository at all.
#[must_use]
pub fn git_identity(root: &Path) -> GitIdentity {
    let Some(commit) = run_git(root, &["rev-parse", "HEAD"]) else {
        return GitIdentity::unknown();
    };
    let commit = commit.trim().to_string();
    if commit.is_empty() {
        return GitIdentity::unknown();
    }

    let dirty = run_git(root, &["status", "--porcelain"])
        .is_none_or(|status| !status.trim().is_empty());

    GitIdentity { commit, dirty }
}

/// Runs `git <args>` in `root`, returning stdout on success and `None` on
/// any failure (spawn failure, non-zero exit, non-UTF-8 output).
fn run_git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(root).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
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

    #[test]
    fn non_git_directory_degrades_to_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = git_identity(dir.path());
        assert_eq!(identity, GitIdentity::unknown());
    }
}
