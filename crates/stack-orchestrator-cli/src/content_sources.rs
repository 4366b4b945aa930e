// stack-orchestrator-cli/src/content_sources.rs
// ============================================================================
// Module: Filesystem Content Sources
// Description: `ChartDigestSource`/`ValuesContentSource` backed by the local
//              filesystem.
// Purpose: Feeds the Effective Input Hasher (spec §4.5) and Seal & Bundle
//          (spec §4.11) with real chart/values content, the only concrete
//          implementations of these traits outside test fixtures.
// Dependencies: stack-orchestrator-core
// ============================================================================

//! ## Overview
//! A chart reference that resolves to a directory under the stack root is
//! digested by walking its tree deterministically and hashing every file's
//! relative path and contents. A chart reference that does not resolve to a
//! local path (a repository alias such as `bitnami/redis`) is treated as
//! opaque and digested by its reference string and resolved version only;
//! the orchestrator never fetches a remote chart just to digest it.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use stack_orchestrator_core::core::HashAlgorithm;
use stack_orchestrator_core::core::HashDigest;
use stack_orchestrator_core::core::hashing::hash_joined;
use stack_orchestrator_core::interfaces::ChartDigestSource;
use stack_orchestrator_core::interfaces::ContentSourceError;
use stack_orchestrator_core::interfaces::ValuesContentSource;

/// Digests chart trees found on the local filesystem, under a stack root.
#[derive(Debug, Clone)]
pub struct FilesystemChartDigestSource {
    /// Root directory chart references are resolved relative to.
    stack_root: PathBuf,
    /// Hash algorithm used for the digest.
    algorithm: HashAlgorithm,
}

impl FilesystemChartDigestSource {
    /// Builds a source rooted at `stack_root`.
    #[must_use]
    pub fn new(stack_root: PathBuf, algorithm: HashAlgorithm) -> Self {
        Self { stack_root, algorithm }
    }

    /// Resolves `chart_ref` to a local directory, if it is one.
    fn local_chart_dir(&self, chart_ref: &str) -> Option<PathBuf> {
        let candidate = Path::new(chart_ref);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.stack_root.join(candidate)
        };
        resolved.is_dir().then_some(resolved)
    }
}

impl ChartDigestSource for FilesystemChartDigestSource {
    fn chart_digest(
        &self,
        chart_ref: &str,
        resolved_version: Option<&str>,
    ) -> Result<HashDigest, ContentSourceError> {
        if let Some(dir) = self.local_chart_dir(chart_ref) {
            return digest_chart_tree(&dir, self.algorithm);
        }
        let version = resolved_version.unwrap_or("unpinned");
        Ok(hash_joined(self.algorithm, &[chart_ref.as_bytes(), version.as_bytes()]))
    }
}

/// Walks `dir` deterministically (lexicographic) and hashes every regular
/// file's path (relative to `dir`) and contents.
fn digest_chart_tree(dir: &Path, algorithm: HashAlgorithm) -> Result<HashDigest, ContentSourceError> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut tokens: Vec<Vec<u8>> = Vec::with_capacity(files.len() * 2);
    for relative in &files {
        let absolute = dir.join(relative);
        let contents = fs::read(&absolute)
            .map_err(|err| ContentSourceError::Chart(format!("{}: {err}", absolute.display())))?;
        tokens.push(relative.as_bytes().to_vec());
        tokens.push(contents);
    }
    let borrowed: Vec<&[u8]> = tokens.iter().map(Vec::as_slice).collect();
    Ok(hash_joined(algorithm, &borrowed))
}

/// Recursively collects regular-file paths under `root`, relative to `base`,
/// using forward slashes so the digest is stable across platforms.
fn collect_files(base: &Path, root: &Path, out: &mut Vec<String>) -> Result<(), ContentSourceError> {
    let entries = fs::read_dir(root)
        .map_err(|err| ContentSourceError::Chart(format!("{}: {err}", root.display())))?;
    for entry in entries {
        let entry = entry.map_err(|err| ContentSourceError::Chart(format!("{}: {err}", root.display())))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|err| ContentSourceError::Chart(format!("{}: {err}", path.display())))?;
        if file_type.is_dir() {
            collect_files(base, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(relative);
        }
    }
    Ok(())
}

/// Reads values file bytes directly from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemValuesContentSource;

impl ValuesContentSource for FilesystemValuesContentSource {
    fn read(&self, path: &Path) -> Result<Vec<u8>, ContentSourceError> {
        fs::read(path).map_err(|err| ContentSourceError::ValuesFile(format!("{}: {err}", path.display())))
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

    #[test]
    fn local_chart_digest_is_stable_across_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("charts/app/templates")).expect("mkdir");
        fs::write(dir.path().join("charts/app/Chart.yaml"), b"name: app\n").expect("write");
        fs::write(dir.path().join("charts/app/templates/deployment.yaml"), b"kind: Deployment\n")
            .expect("write");

        let source = FilesystemChartDigestSource::new(dir.path().to_path_buf(), HashAlgorithm::Sha256);
        let first = source.chart_digest("charts/app", None).expect("digest");
        let second = source.chart_digest("charts/app", None).expect("digest");
        assert_eq!(first, second);
    }

    #[test]
    fn remote_chart_ref_digests_reference_and_version_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = FilesystemChartDigestSource::new(dir.path().to_path_buf(), HashAlgorithm::Sha256);
        let a = source.chart_digest("bitnami/redis", Some("18.0.0")).expect("digest");
        let b = source.chart_digest("bitnami/redis", Some("19.0.0")).expect("digest");
        assert_ne!(a, b);
    }

    #[test]
    fn values_content_source_reads_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("values.yaml");
        fs::write(&path, b"replicas: 3\n").expect("write");
        let source = FilesystemValuesContentSource;
        let bytes = source.read(&path).expect("read");
        assert_eq!(bytes, b"replicas: 3\n");
    }
}
