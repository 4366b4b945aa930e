// stack-orchestrator-core/src/runtime/hasher.rs
// ============================================================================
// Module: Effective Input Hasher
// Description: Computes a stable content hash over a node's chart, values,
//              set overrides, cluster target, and apply/delete/verify
//              options.
// Purpose: Implements spec §4.5.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

use thiserror::Error;

use crate::core::ApplyOptions;
use crate::core::BinaryIdentity;
use crate::core::DeleteOptions;
use crate::core::EffectiveInput;
use crate::core::GitIdentity;
use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::ResolvedRelease;
use crate::core::ValuesFileDigest;
use crate::core::VerifyOptions;
use crate::core::hashing;
use crate::interfaces::ChartDigestSource;
use crate::interfaces::ContentSourceError;
use crate::interfaces::ValuesContentSource;

/// Errors raised while computing an effective input hash.
#[derive(Debug, Error)]
pub enum EffectiveInputError {
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// A content source failed.
    #[error(transparent)]
    Source(#[from] ContentSourceError),
}

/// Context shared across every node's effective input computation within a
/// single run (spec §4.5 fields 1–2).
#[derive(Debug, Clone)]
pub struct HashContext {
    /// Stack root git identity.
    pub stack_git: GitIdentity,
    /// Orchestrator binary identity.
    pub binary: BinaryIdentity,
    /// Kube context name used for the cluster target digest.
    pub kube_context: String,
    /// Whether values files are digested by content (`true`) or by path
    /// only (`false`).
    pub include_values_contents: bool,
    /// Hash algorithm to use; always [`HashAlgorithm::Sha256`] today.
    pub algorithm: HashAlgorithm,
}

/// Computes `{EffectiveInput, hash}` for a single node (spec §4.5).
///
/// # Errors
///
/// Returns [`EffectiveInputError`] when canonicalization or a content source
/// read fails.
pub fn compute(
    node: &ResolvedRelease,
    ctx: &HashContext,
    chart_source: &dyn ChartDigestSource,
    values_source: &dyn ValuesContentSource,
) -> Result<EffectiveInput, EffectiveInputError> {
    let algorithm = ctx.algorithm;

    let chart_digest =
        chart_source.chart_digest(&node.chart, node.resolved_chart_version.as_deref())?;

    let mut values = Vec::with_capacity(node.values_files.len());
    for path in &node.values_files {
        let digest = if ctx.include_values_contents {
            let bytes = values_source.read(path)?;
            Some(hashing::hash_bytes(algorithm, &bytes))
        } else {
            None
        };
        values.push(ValuesFileDigest {
            path: path.to_string_lossy().to_string(),
            digest,
        });
    }

    let set_overrides_digest = hashing::hash_canonical_json(algorithm, &node.set_overrides)?;

    let cluster_target_digest = hashing::hash_canonical_json(
        algorithm,
        &(
            node.cluster.as_str(),
            ctx.kube_context.as_str(),
            node.namespace.as_str(),
        ),
    )?;

    let apply_options_digest = options_digest(algorithm, &node.apply_options)?;
    let delete_options_digest = options_digest(algorithm, &node.delete_options)?;
    let verify_options_digest = options_digest(algorithm, &node.verify_options)?;

    let values_tokens: Vec<u8> = hashing::canonical_json_bytes(&values)?;

    let hash = hashing::hash_joined(
        algorithm,
        &[
            ctx.stack_git.commit.as_bytes(),
            &[u8::from(ctx.stack_git.dirty)],
            ctx.binary.version.as_bytes(),
            ctx.binary.commit.as_bytes(),
            node.id.as_str().as_bytes(),
            chart_digest.value.as_bytes(),
            node.chart.as_bytes(),
            node.chart_version.as_deref().unwrap_or("").as_bytes(),
            node.resolved_chart_version.as_deref().unwrap_or("").as_bytes(),
            &values_tokens,
            set_overrides_digest.value.as_bytes(),
            cluster_target_digest.value.as_bytes(),
            apply_options_digest.value.as_bytes(),
            delete_options_digest.value.as_bytes(),
            verify_options_digest.value.as_bytes(),
        ],
    );

    Ok(EffectiveInput {
        stack_git: ctx.stack_git.clone(),
        binary: ctx.binary.clone(),
        node_id: node.id.clone(),
        chart_digest,
        chart_ref: node.chart.clone(),
        requested_version: node.chart_version.clone(),
        resolved_version: node.resolved_chart_version.clone(),
        values,
        set_overrides_digest,
        cluster_target_digest,
        apply_options_digest,
        delete_options_digest,
        verify_options_digest,
        hash,
    })
}

fn options_digest<T: serde::Serialize>(
    algorithm: HashAlgorithm,
    options: &T,
) -> Result<HashDigest, HashError> {
    hashing::hash_canonical_json(algorithm, options)
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
    use crate::core::ClusterName;
    use crate::core::NodeId;
    use crate::core::Namespace;
    use crate::core::ReleaseName;
    use std::collections::BTreeMap;

    struct FixedChartSource;
    impl ChartDigestSource for FixedChartSource {
        fn chart_digest(
            &self,
            chart_ref: &str,
            resolved_version: Option<&str>,
        ) -> Result<HashDigest, ContentSourceError> {
            Ok(hashing::hash_bytes(
                HashAlgorithm::Sha256,
                format!("{chart_ref}@{}", resolved_version.unwrap_or("")).as_bytes(),
            ))
        }
    }

    struct FixedValuesSource;
    impl ValuesContentSource for FixedValuesSource {
        fn read(&self, path: &std::path::Path) -> Result<Vec<u8>, ContentSourceError> {
            Ok(path.to_string_lossy().into_owned().into_bytes())
        }
    }

    fn node() -> ResolvedRelease {
        ResolvedRelease {
            id: NodeId::from_parts(
                &ClusterName::new("prod"),
                &Namespace::new("default"),
                &ReleaseName::new("app"),
            ),
            name: ReleaseName::new("app"),
            cluster: ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "repo/app".to_string(),
            chart_version: Some("1.0.0".to_string()),
            resolved_chart_version: Some("1.0.0".to_string()),
            values_files: vec![std::path::PathBuf::from("values.yaml")],
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

    fn ctx() -> HashContext {
        HashContext {
            stack_git: GitIdentity {
                commit: "abc123".to_string(),
                dirty: false,
            },
            binary: BinaryIdentity {
                version: "0.1.0".to_string(),
                commit: "def456".to_string(),
            },
            kube_context: "prod-context".to_string(),
            include_values_contents: true,
            algorithm: HashAlgorithm::Sha256,
        }
    }

    #[test]
    fn hash_is_stable_across_independent_computations() {
        let n = node();
        let context = ctx();
        let a = compute(&n, &context, &FixedChartSource, &FixedValuesSource).expect("compute");
        let b = compute(&n, &context, &FixedChartSource, &FixedValuesSource).expect("compute");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn changing_values_file_changes_hash() {
        let mut n = node();
        let context = ctx();
        let before = compute(&n, &context, &FixedChartSource, &FixedValuesSource).expect("compute");
        n.values_files.push(std::path::PathBuf::from("extra.yaml"));
        let after = compute(&n, &context, &FixedChartSource, &FixedValuesSource).expect("compute");
        assert_ne!(before.hash, after.hash);
    }

    #[test]
    fn path_only_mode_omits_content_digest() {
        let n = node();
        let mut context = ctx();
        context.include_values_contents = false;
        let result = compute(&n, &context, &FixedChartSource, &FixedValuesSource).expect("compute");
        assert!(result.values[0].digest.is_none());
    }
}
