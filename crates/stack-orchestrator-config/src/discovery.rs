// stack-orchestrator-config/src/discovery.rs
// ============================================================================
// Module: Universe Discovery
// Description: Walks a directory tree to find stack definition files, release
//              files, and values files, producing an immutable Universe.
// Purpose: Implements spec §4.1.
// Dependencies: stack-orchestrator-core, serde_yaml, crate::schema
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use stack_orchestrator_core::core::ApplyOptions;
use stack_orchestrator_core::core::ClusterName;
use stack_orchestrator_core::core::DeleteOptions;
use stack_orchestrator_core::core::Namespace;
use stack_orchestrator_core::core::ParallelismGroup;
use stack_orchestrator_core::core::ProfileName;
use stack_orchestrator_core::core::RawRelease;
use stack_orchestrator_core::core::ReleaseDefaults;
use stack_orchestrator_core::core::ReleaseName;
use stack_orchestrator_core::core::StackName;
use stack_orchestrator_core::core::Universe;
use stack_orchestrator_core::core::VerifyOptions;

use crate::schema::ApplyOptionsYaml;
use crate::schema::ClusterEntry;
use crate::schema::DeleteOptionsYaml;
use crate::schema::ReleaseDefaultsYaml;
use crate::schema::ReleaseEntry;
use crate::schema::ReleaseFile;
use crate::schema::ReleaseYaml;
use crate::schema::StackFile;
use crate::schema::SUPPORTED_API_VERSION;
use crate::schema::VerifyOptionsYaml;

/// Errors raised while discovering a [`Universe`] (spec §4.1 Contract).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No stack definition file was found at the configured root.
    #[error("no stack definition file found under {0}")]
    MissingStackFile(PathBuf),
    /// Reading a file from disk failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// YAML parsing failed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_yaml::Error,
    },
    /// A referenced path does not exist.
    #[error("referenced path does not exist: {0}")]
    MissingPath(PathBuf),
    /// A release's cluster is not declared on the stack.
    #[error("release {release} references unknown cluster {cluster}")]
    UnknownCluster {
        /// The release declaring the reference.
        release: String,
        /// The unknown cluster name.
        cluster: String,
    },
    /// Two release declarations resolved to the same `cluster/namespace/name`
    /// id.
    #[error("duplicate release id: {0}")]
    DuplicateId(String),
    /// The stack file's `apiVersion` is missing or unsupported.
    #[error("unsupported apiVersion {found:?}, expected {SUPPORTED_API_VERSION}")]
    UnsupportedApiVersion {
        /// The `apiVersion` value found, if any.
        found: String,
    },
}

/// Configured file-name patterns recognized during discovery (spec §4.1
/// Rules: "Files matching configured file-name patterns are parsed; all
/// other files are ignored").
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Name of the top-level stack definition file, searched for at the
    /// discovery root only.
    pub stack_file_name: String,
    /// Suffix identifying a standalone release file, matched anywhere under
    /// the discovery root during the auto-discovery walk.
    pub release_file_suffix: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            stack_file_name: "stack.yaml".to_string(),
            release_file_suffix: ".release.yaml".to_string(),
        }
    }
}

/// Discovers and parses a [`Universe`] rooted at `root` (spec §4.1).
///
/// # Errors
///
/// Returns [`ConfigError`] when the stack file is missing, a referenced path
/// does not exist, YAML parsing fails, two release files declare the same
/// id, or a cluster reference is unknown.
pub fn discover(root: &Path, config: &DiscoveryConfig) -> Result<Universe, ConfigError> {
    let root = fs::canonicalize(root).map_err(|source| ConfigError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let stack_file_path = root.join(&config.stack_file_name);
    if !stack_file_path.is_file() {
        return Err(ConfigError::MissingStackFile(root));
    }
    let stack_file: StackFile = parse_yaml(&stack_file_path)?;
    if stack_file.api_version != SUPPORTED_API_VERSION {
        return Err(ConfigError::UnsupportedApiVersion {
            found: stack_file.api_version,
        });
    }

    let clusters: Vec<ClusterEntry> = stack_file.clusters;
    let cluster_names: BTreeSet<String> = clusters.iter().map(|c| c.name.clone()).collect();

    let mut raw_releases = Vec::new();
    let mut referenced_release_files: BTreeSet<PathBuf> = BTreeSet::new();

    for entry in &stack_file.releases {
        match entry {
            ReleaseEntry::Inline(release) => {
                raw_releases.push(resolve_release(release, &root, &stack_file_path)?);
            }
            ReleaseEntry::FileRef { file } => {
                let abs = root.join(file);
                if !abs.is_file() {
                    return Err(ConfigError::MissingPath(abs));
                }
                referenced_release_files.insert(abs.clone());
                let release_file: ReleaseFile = parse_yaml(&abs)?;
                for release in release_file.into_releases() {
                    raw_releases.push(resolve_release(&release, &root, &abs)?);
                }
            }
        }
    }

    for path in walk_release_files(&root, &config.release_file_suffix)? {
        if referenced_release_files.contains(&path) {
            continue;
        }
        let release_file: ReleaseFile = parse_yaml(&path)?;
        for release in release_file.into_releases() {
            raw_releases.push(resolve_release(&release, &root, &path)?);
        }
    }

    raw_releases.sort_by(|a, b| {
        (a.cluster.as_str(), a.namespace.as_str(), a.name.as_str())
            .cmp(&(b.cluster.as_str(), b.namespace.as_str(), b.name.as_str()))
    });

    let mut seen_ids = BTreeSet::new();
    for release in &raw_releases {
        if !cluster_names.contains(release.cluster.as_str()) {
            return Err(ConfigError::UnknownCluster {
                release: release.name.as_str().to_string(),
                cluster: release.cluster.as_str().to_string(),
            });
        }
        let id = format!("{}/{}/{}", release.cluster, release.namespace, release.name);
        if !seen_ids.insert(id.clone()) {
            return Err(ConfigError::DuplicateId(id));
        }
        for path in &release.values_files {
            if !path.is_file() {
                return Err(ConfigError::MissingPath(path.clone()));
            }
        }
    }

    let stack_defaults = resolve_defaults(&stack_file.defaults, &root);
    let mut profile_defaults = BTreeMap::new();
    for (name, defaults) in &stack_file.profiles {
        profile_defaults.insert(ProfileName::new(name.clone()), resolve_defaults(defaults, &root));
    }

    Ok(Universe {
        root,
        stack_name: StackName::new(stack_file.stack_name),
        clusters: clusters.into_iter().map(|c| ClusterName::new(c.name)).collect(),
        profiles: profile_defaults.keys().cloned().collect(),
        default_profile: stack_file.default_profile.map(ProfileName::new),
        stack_defaults,
        profile_defaults,
        releases: raw_releases,
    })
}

/// Deterministic (lexicographic) recursive walk for files matching
/// `suffix` under `root` (spec §4.1 Rules: "Directory traversal is
/// deterministic (lexicographic)").
fn walk_release_files(root: &Path, suffix: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = fs::read_dir(&dir)
            .map_err(|source| ConfigError::Io { path: dir.clone(), source })?
            .collect::<Result<_, _>>()
            .map_err(|source| ConfigError::Io { path: dir.clone(), source })?;
        entries.sort_by_key(std::fs::DirEntry::file_name);
        for entry in entries.into_iter().rev() {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn parse_yaml<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_release(
    release: &ReleaseYaml,
    root: &Path,
    source_path: &Path,
) -> Result<RawRelease, ConfigError> {
    let base = source_path.parent().unwrap_or(root);
    let values_files = release
        .values_files
        .iter()
        .map(|p| resolve_relative(root, base, p))
        .collect();

    Ok(RawRelease {
        name: ReleaseName::new(release.name.clone()),
        cluster: ClusterName::new(release.cluster.clone()),
        namespace: Namespace::new(release.namespace.clone()),
        chart: release.chart.clone(),
        chart_version: release.chart_version.clone(),
        values_files,
        set_overrides: release.set.clone(),
        tags: release.tags.clone(),
        needs: release.needs.iter().cloned().map(ReleaseName::new).collect(),
        apply_options: release.apply_options.map(map_apply_options),
        delete_options: release.delete_options.map(map_delete_options),
        verify_options: release.verify_options.map(map_verify_options),
        parallelism_group: release.parallelism_group.clone().map(ParallelismGroup::new),
        source_path: source_path.to_path_buf(),
    })
}

fn resolve_defaults(defaults: &ReleaseDefaultsYaml, root: &Path) -> ReleaseDefaults {
    ReleaseDefaults {
        values_files: defaults
            .values_files
            .iter()
            .map(|p| resolve_relative(root, root, p))
            .collect(),
        set_overrides: defaults.set.clone(),
        tags: defaults.tags.clone(),
        apply_options: defaults.apply_options.map(map_apply_options),
        delete_options: defaults.delete_options.map(map_delete_options),
        verify_options: defaults.verify_options.map(map_verify_options),
    }
}

/// Resolves a path written in a file relative to that file's own directory,
/// falling back to `root` for absolute-looking references.
fn resolve_relative(root: &Path, base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let candidate = base.join(path);
    if candidate.exists() { candidate } else { root.join(path) }
}

const fn map_apply_options(yaml: ApplyOptionsYaml) -> ApplyOptions {
    ApplyOptions {
        atomic: yaml.atomic,
        wait: yaml.wait,
        timeout_seconds: yaml.timeout_seconds,
    }
}

const fn map_delete_options(yaml: DeleteOptionsYaml) -> DeleteOptions {
    DeleteOptions {
        wait: yaml.wait,
        timeout_seconds: yaml.timeout_seconds,
    }
}

const fn map_verify_options(yaml: VerifyOptionsYaml) -> VerifyOptions {
    VerifyOptions {
        enabled: yaml.enabled,
        timeout_seconds: yaml.timeout_seconds,
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

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn discovers_inline_releases_and_clusters() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r#"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
defaultProfile: prod
profiles:
  prod:
    tags: [prod]
releases:
  - name: a
    cluster: prod
    namespace: default
    chart: repo/a
  - name: b
    cluster: prod
    namespace: default
    chart: repo/b
    needs: [a]
"#,
        );
        let universe = discover(dir.path(), &DiscoveryConfig::default()).expect("discovers");
        assert_eq!(universe.releases.len(), 2);
        assert_eq!(universe.stack_name.as_str(), "demo");
        assert!(universe.profile_defaults.contains_key(&ProfileName::new("prod")));
    }

    #[test]
    fn discovers_file_referenced_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r#"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
releases:
  - file: releases/a.release.yaml
"#,
        );
        write(
            &dir.path().join("releases/a.release.yaml"),
            r#"
name: a
cluster: prod
namespace: default
chart: repo/a
"#,
        );
        let universe = discover(dir.path(), &DiscoveryConfig::default()).expect("discovers");
        assert_eq!(universe.releases.len(), 1);
        assert_eq!(universe.releases[0].name.as_str(), "a");
    }

    #[test]
    fn auto_discovers_unreferenced_release_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
",
        );
        write(
            &dir.path().join("nested/b.release.yaml"),
            r#"
name: b
cluster: prod
namespace: default
chart: repo/b
"#,
        );
        let universe = discover(dir.path(), &DiscoveryConfig::default()).expect("discovers");
        assert_eq!(universe.releases.len(), 1);
        assert_eq!(universe.releases[0].name.as_str(), "b");
    }

    #[test]
    fn unknown_cluster_reference_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r#"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
releases:
  - name: a
    cluster: staging
    namespace: default
    chart: repo/a
"#,
        );
        let err = discover(dir.path(), &DiscoveryConfig::default()).expect_err("unknown cluster");
        assert!(matches!(err, ConfigError::UnknownCluster { .. }));
    }

    #[test]
    fn duplicate_release_id_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r#"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
releases:
  - name: a
    cluster: prod
    namespace: default
    chart: repo/a
  - name: a
    cluster: prod
    namespace: default
    chart: repo/a
"#,
        );
        let err = discover(dir.path(), &DiscoveryConfig::default()).expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateId(_)));
    }

    #[test]
    fn missing_values_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r#"
apiVersion: stack-orchestrator/v1
stackName: demo
clusters:
  - name: prod
releases:
  - name: a
    cluster: prod
    namespace: default
    chart: repo/a
    valuesFiles: [missing.yaml]
"#,
        );
        let err = discover(dir.path(), &DiscoveryConfig::default()).expect_err("missing path");
        assert!(matches!(err, ConfigError::MissingPath(_)));
    }

    #[test]
    fn unsupported_api_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join("stack.yaml"),
            r"
apiVersion: stack-orchestrator/v2
stackName: demo
clusters:
  - name: prod
",
        );
        let err = discover(dir.path(), &DiscoveryConfig::default()).expect_err("unsupported");
        assert!(matches!(err, ConfigError::UnsupportedApiVersion { .. }));
    }
}
