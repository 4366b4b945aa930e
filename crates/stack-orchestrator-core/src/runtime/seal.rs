// stack-orchestrator-core/src/runtime/seal.rs
// ============================================================================
// Module: Seal & Bundle
// Description: Packs a compiled plan and its content-addressed inputs into a
//              reproducible, attestable bundle; verifies one back.
// Purpose: Implements spec §4.11. Also hosts the JSON-Lines event log used
//          by the secondary on-disk format (spec §9).
// Dependencies: crate::core, crate::interfaces
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::Attestation;
use crate::core::BinaryIdentity;
use crate::core::ChainError;
use crate::core::GitIdentity;
use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::InputManifestEntry;
use crate::core::Plan;
use crate::core::RunEvent;
use crate::core::SealedBundle;
use crate::core::hashing;
use crate::core::verify_chain;
use crate::interfaces::ContentSourceError;
use crate::interfaces::ValuesContentSource;

/// Errors raised while sealing or verifying a bundle.
#[derive(Debug, Error)]
pub enum SealError {
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// A content source read failed.
    #[error(transparent)]
    Source(#[from] ContentSourceError),
    /// The bundle digest did not match its attestation.
    #[error("bundle digest mismatch: attestation says {expected}, recomputed {actual}")]
    DigestMismatch {
        /// Digest recorded in the attestation.
        expected: HashDigest,
        /// Digest recomputed from the bundle's members.
        actual: HashDigest,
    },
    /// The plan hash did not match its attestation.
    #[error("plan hash mismatch: attestation says {expected}, recomputed {actual}")]
    PlanHashMismatch {
        /// Digest recorded in the attestation.
        expected: HashDigest,
        /// Digest recomputed from the plan JSON.
        actual: HashDigest,
    },
    /// A detached signature was present but did not verify.
    #[error("bundle signature did not verify")]
    SignatureInvalid,
}

/// Packs a [`Plan`] and its values-file contents into a [`SealedBundle`]
/// (spec §4.11 "Seal").
///
/// Members are keyed by path and hashed individually; the bundle digest
/// commits to the concatenation of member digests in lexicographic member
/// name order, so the digest is independent of packing order.
///
/// # Errors
///
/// Returns [`SealError`] when canonicalization or a content read fails.
pub fn seal(
    plan: &Plan,
    stack_git: &GitIdentity,
    binary: &BinaryIdentity,
    values_source: &dyn ValuesContentSource,
    algorithm: HashAlgorithm,
) -> Result<SealedBundle, SealError> {
    let plan_json = hashing::canonical_json_bytes(plan)?;
    let plan_hash = hashing::hash_bytes(algorithm, &plan_json);

    let mut members: BTreeMap<String, InputManifestEntry> = BTreeMap::new();
    for node in &plan.nodes {
        for path in &node.values_files {
            let rel = path.to_string_lossy().into_owned();
            if members.contains_key(&rel) {
                continue;
            }
            let bytes = values_source.read(path)?;
            let digest = hashing::hash_bytes(algorithm, &bytes);
            members.insert(
                rel.clone(),
                InputManifestEntry {
                    path: rel,
                    digest,
                    size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                },
            );
        }
    }

    let member_tokens: Vec<&[u8]> = members
        .values()
        .flat_map(|entry| [entry.path.as_bytes(), entry.digest.value.as_bytes()])
        .collect();
    let bundle_digest = hashing::hash_joined(algorithm, &member_tokens);

    Ok(SealedBundle {
        plan_json,
        attestation: Attestation {
            api_version: crate::core::BUNDLE_API_VERSION.to_string(),
            plan_hash,
            bundle_digest,
            stack_git: stack_git.clone(),
            binary: binary.clone(),
        },
        inputs_manifest: members.into_values().collect(),
        signature: None,
    })
}

/// Verifies a [`SealedBundle`] against its own attestation (spec §4.11
/// "Load & verify"): recomputes the plan hash and bundle digest and checks
/// them against the attestation, then (if present) verifies the detached
/// signature.
///
/// # Errors
///
/// Returns [`SealError::PlanHashMismatch`] or [`SealError::DigestMismatch`]
/// when recomputed digests disagree with the attestation, or
/// [`SealError::SignatureInvalid`] when a present signature does not verify.
pub fn verify(
    bundle: &SealedBundle,
    algorithm: HashAlgorithm,
    verify_signature: Option<&dyn Fn(&Attestation, &[u8]) -> bool>,
) -> Result<(), SealError> {
    let recomputed_plan_hash = hashing::hash_bytes(algorithm, &bundle.plan_json);
    if recomputed_plan_hash != bundle.attestation.plan_hash {
        return Err(SealError::PlanHashMismatch {
            expected: bundle.attestation.plan_hash.clone(),
            actual: recomputed_plan_hash,
        });
    }

    let mut sorted = bundle.inputs_manifest.clone();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let member_tokens: Vec<&[u8]> = sorted
        .iter()
        .flat_map(|entry| [entry.path.as_bytes(), entry.digest.value.as_bytes()])
        .collect();
    let recomputed_bundle_digest = hashing::hash_joined(algorithm, &member_tokens);
    if recomputed_bundle_digest != bundle.attestation.bundle_digest {
        return Err(SealError::DigestMismatch {
            expected: bundle.attestation.bundle_digest.clone(),
            actual: recomputed_bundle_digest,
        });
    }

    if let Some(signature) = &bundle.signature {
        let verifier = verify_signature.ok_or(SealError::SignatureInvalid)?;
        if !verifier(&bundle.attestation, signature) {
            return Err(SealError::SignatureInvalid);
        }
    }

    Ok(())
}

/// Deserializes the plan packed inside a bundle, trusting the caller to have
/// already called [`verify`].
///
/// # Errors
///
/// Returns [`SealError::Hash`] when the packed JSON cannot be parsed.
pub fn unpack_plan(bundle: &SealedBundle) -> Result<Plan, SealError> {
    serde_json::from_slice(&bundle.plan_json)
        .map_err(|err| SealError::Hash(HashError::Canonicalization(err.to_string())))
}

/// An append-only, newline-delimited JSON event log sharing the exact
/// hash-chain invariant the SQLite store enforces (spec §9 "both formats
/// round-trip through the event-chain invariant").
#[derive(Debug, Default, Clone)]
pub struct JsonlEventLog {
    lines: Vec<String>,
}

/// Errors raised reading or writing a [`JsonlEventLog`].
#[derive(Debug, Error)]
pub enum JsonlEventLogError {
    /// A line could not be parsed as a [`RunEvent`].
    #[error("malformed event log line {line}: {source}")]
    Malformed {
        /// Zero-based line number.
        line: usize,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// The parsed events failed chain verification.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl JsonlEventLog {
    /// Builds a log from raw file content, one JSON object per line.
    #[must_use]
    pub fn from_content(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Serializes the log back to newline-delimited JSON, suitable for
    /// writing to disk.
    #[must_use]
    pub fn to_content(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Appends an event, serialized as one canonical JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn append(&mut self, event: &RunEvent) -> Result<(), HashError> {
        let bytes = hashing::canonical_json_bytes(event)?;
        let line = String::from_utf8_lossy(&bytes).into_owned();
        self.lines.push(line);
        Ok(())
    }

    /// Parses every line and verifies the resulting event chain using the
    /// same [`verify_chain`] routine the SQLite store uses.
    ///
    /// # Errors
    ///
    /// Returns [`JsonlEventLogError::Malformed`] when a line fails to parse,
    /// or [`JsonlEventLogError::Chain`] when the chain fails to verify.
    pub fn load_and_verify(
        &self,
        algorithm: HashAlgorithm,
    ) -> Result<Vec<RunEvent>, JsonlEventLogError> {
        let mut events = Vec::with_capacity(self.lines.len());
        for (idx, line) in self.lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(line)
                .map_err(|source| JsonlEventLogError::Malformed { line: idx, source })?;
            events.push(event);
        }
        verify_chain(algorithm, &events)?;
        Ok(events)
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
    use crate::core::ApplyOptions;
    use crate::core::ClusterName;
    use crate::core::DeleteOptions;
    use crate::core::Namespace;
    use crate::core::NodeId;
    use crate::core::ReleaseName;
    use crate::core::ResolvedRelease;
    use crate::core::RunEventKind;
    use crate::core::RunId;
    use crate::core::RunnerConfig;
    use crate::core::StackName;
    use crate::core::Timestamp;
    use crate::core::VerifyOptions;
    use crate::core::compute_self_hash;
    use time::OffsetDateTime;

    struct StubValues;
    impl ValuesContentSource for StubValues {
        fn read(&self, path: &std::path::Path) -> Result<Vec<u8>, ContentSourceError> {
            Ok(path.to_string_lossy().into_owned().into_bytes())
        }
    }

    fn plan() -> Plan {
        let node = ResolvedRelease {
            id: NodeId::from_parts(
                &ClusterName::new("prod"),
                &Namespace::new("default"),
                &ReleaseName::new("app"),
            ),
            name: ReleaseName::new("app"),
            cluster: ClusterName::new("prod"),
            namespace: Namespace::new("default"),
            chart: "repo/app".to_string(),
            chart_version: None,
            resolved_chart_version: None,
            values_files: vec![std::path::PathBuf::from("values.yaml")],
            set_overrides: std::collections::BTreeMap::new(),
            tags: Vec::new(),
            needs: Vec::new(),
            inferred_needs: Vec::new(),
            apply_options: ApplyOptions::default(),
            delete_options: DeleteOptions::default(),
            verify_options: VerifyOptions::default(),
            parallelism_group: None,
            effective_input: None,
        };
        Plan {
            nodes: vec![node.clone()],
            edges: Vec::new(),
            stack_root: std::path::PathBuf::from("/stack"),
            stack_name: StackName::new("demo"),
            profile: None,
            runner: RunnerConfig::default(),
            execution_groups: vec![vec![node.id]],
        }
    }

    fn git() -> GitIdentity {
        GitIdentity {
            commit: "abc".to_string(),
            dirty: false,
        }
    }

    fn binary() -> BinaryIdentity {
        BinaryIdentity {
            version: "0.1.0".to_string(),
            commit: "def".to_string(),
        }
    }

    #[test]
    fn sealed_bundle_verifies_round_trip() {
        let p = plan();
        let bundle = seal(&p, &git(), &binary(), &StubValues, HashAlgorithm::Sha256)
            .expect("seal succeeds");
        verify(&bundle, HashAlgorithm::Sha256, None).expect("verifies");
        let unpacked = unpack_plan(&bundle).expect("unpacks");
        assert_eq!(unpacked, p);
    }

    #[test]
    fn tampered_plan_json_fails_verification() {
        let p = plan();
        let mut bundle = seal(&p, &git(), &binary(), &StubValues, HashAlgorithm::Sha256)
            .expect("seal succeeds");
        bundle.plan_json.push(b'x');
        let err = verify(&bundle, HashAlgorithm::Sha256, None).expect_err("mismatch");
        assert!(matches!(err, SealError::PlanHashMismatch { .. }));
    }

    #[test]
    fn tampered_manifest_entry_fails_digest_check() {
        let p = plan();
        let mut bundle = seal(&p, &git(), &binary(), &StubValues, HashAlgorithm::Sha256)
            .expect("seal succeeds");
        if let Some(entry) = bundle.inputs_manifest.first_mut() {
            entry.size += 1;
        }
        let err = verify(&bundle, HashAlgorithm::Sha256, None).expect_err("mismatch");
        assert!(matches!(err, SealError::DigestMismatch { .. }));
    }

    #[test]
    fn jsonl_log_round_trips_and_verifies() {
        let run_id = RunId::new("run-1");
        let mut e0 = RunEvent {
            run_id: run_id.clone(),
            seq: 0,
            ts: Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH),
            kind: RunEventKind::RunStarted,
            node_id: None,
            attempt: None,
            message: "started".to_string(),
            error: None,
            prev_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
            self_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
        };
        e0.self_hash = compute_self_hash(HashAlgorithm::Sha256, &e0);

        let mut log = JsonlEventLog::default();
        log.append(&e0).expect("append");
        let content = log.to_content();

        let reloaded = JsonlEventLog::from_content(&content);
        let events = reloaded
            .load_and_verify(HashAlgorithm::Sha256)
            .expect("verifies");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "started");
    }

    #[test]
    fn jsonl_log_rejects_tampered_line() {
        let run_id = RunId::new("run-1");
        let mut e0 = RunEvent {
            run_id,
            seq: 0,
            ts: Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH),
            kind: RunEventKind::RunStarted,
            node_id: None,
            attempt: None,
            message: "started".to_string(),
            error: None,
            prev_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
            self_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
        };
        e0.self_hash = compute_self_hash(HashAlgorithm::Sha256, &e0);

        let mut log = JsonlEventLog::default();
        log.append(&e0).expect("append");
        let tampered = log.to_content().replace("started", "tampered");
        let reloaded = JsonlEventLog::from_content(&tampered);
        let err = reloaded
            .load_and_verify(HashAlgorithm::Sha256)
            .expect_err("tampered line breaks chain");
        assert!(matches!(err, JsonlEventLogError::Chain(_)));
    }
}
