// stack-orchestrator-core/src/core/chain.rs
// ============================================================================
// Module: Event Chain
// Description: Hash-chain computation and verification shared by every
//              RunStore backend (SQLite, JSON-Lines).
// Purpose: Implements the integrity property in spec §4.6 and the dual
//          on-disk format requirement in spec §9.
// Dependencies: crate::core::hashing, crate::core::model
// ============================================================================

use thiserror::Error;

use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::RunEvent;
use crate::core::hashing;

/// Errors raised while verifying an event chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// An event's `self_hash` does not match the recomputed value.
    #[error("event {seq} self_hash mismatch: expected {expected}, got {actual}")]
    SelfHashMismatch {
        /// The offending event's sequence number.
        seq: u64,
        /// The hash recomputed from the event body and `prev_hash`.
        expected: HashDigest,
        /// The hash actually stored on the event.
        actual: HashDigest,
    },
    /// An event's `prev_hash` does not match the previous event's
    /// `self_hash`.
    #[error("event {seq} prev_hash does not chain to the prior event")]
    BrokenLink {
        /// The offending event's sequence number.
        seq: u64,
    },
    /// Sequence numbers are not contiguous starting at 0.
    #[error("event sequence is not contiguous at {seq}")]
    NonContiguousSequence {
        /// The offending event's sequence number.
        seq: u64,
    },
}

/// Computes `self_hash[n] = SHA256(prev_hash ‖ canonical(event_body[n]))`
/// for a single event (spec §4.6 Integrity).
#[must_use]
pub fn compute_self_hash(algorithm: HashAlgorithm, event: &RunEvent) -> HashDigest {
    let body_bytes =
        hashing::canonical_json_bytes(&event.body()).unwrap_or_default();
    hashing::hash_joined(algorithm, &[event.prev_hash.value.as_bytes(), &body_bytes])
}

/// Verifies that `events` (already in `seq` order) form a valid hash chain
/// rooted at `HashDigest::of_empty`.
///
/// # Errors
///
/// Returns [`ChainError`] on the first broken link, self-hash mismatch, or
/// sequence gap encountered.
pub fn verify_chain(algorithm: HashAlgorithm, events: &[RunEvent]) -> Result<(), ChainError> {
    let mut expected_prev = HashDigest::of_empty(algorithm);
    for (idx, event) in events.iter().enumerate() {
        let expected_seq = u64::try_from(idx).unwrap_or(u64::MAX);
        if event.seq != expected_seq {
            return Err(ChainError::NonContiguousSequence { seq: event.seq });
        }
        if event.prev_hash != expected_prev {
            return Err(ChainError::BrokenLink { seq: event.seq });
        }
        let recomputed = compute_self_hash(algorithm, event);
        if recomputed != event.self_hash {
            return Err(ChainError::SelfHashMismatch {
                seq: event.seq,
                expected: recomputed,
                actual: event.self_hash.clone(),
            });
        }
        expected_prev = event.self_hash.clone();
    }
    Ok(())
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
    use crate::core::NodeId;
    use crate::core::RunEventKind;
    use crate::core::RunId;
    use crate::core::Timestamp;
    use time::OffsetDateTime;

    fn event(run_id: &RunId, seq: u64, prev_hash: HashDigest, message: &str) -> RunEvent {
        let mut event = RunEvent {
            run_id: run_id.clone(),
            seq,
            ts: Timestamp::from_offset(OffsetDateTime::UNIX_EPOCH),
            kind: RunEventKind::NodeRunning,
            node_id: Some(NodeId::new("prod/default/app")),
            attempt: Some(1),
            message: message.to_string(),
            error: None,
            prev_hash,
            self_hash: HashDigest::of_empty(HashAlgorithm::Sha256),
        };
        event.self_hash = compute_self_hash(HashAlgorithm::Sha256, &event);
        event
    }

    #[test]
    fn valid_chain_verifies() {
        let run_id = RunId::new("run-1");
        let e0 = event(&run_id, 0, HashDigest::of_empty(HashAlgorithm::Sha256), "started");
        let e1 = event(&run_id, 1, e0.self_hash.clone(), "running");
        verify_chain(HashAlgorithm::Sha256, &[e0, e1]).expect("valid chain");
    }

    #[test]
    fn reordered_events_break_verification() {
        let run_id = RunId::new("run-1");
        let e0 = event(&run_id, 0, HashDigest::of_empty(HashAlgorithm::Sha256), "started");
        let e1 = event(&run_id, 1, e0.self_hash.clone(), "running");
        let err = verify_chain(HashAlgorithm::Sha256, &[e1, e0]).expect_err("broken");
        assert!(matches!(err, ChainError::NonContiguousSequence { seq: 1 }));
    }

    #[test]
    fn tampered_message_breaks_self_hash() {
        let run_id = RunId::new("run-1");
        let mut e0 = event(&run_id, 0, HashDigest::of_empty(HashAlgorithm::Sha256), "started");
        e0.message = "tampered".to_string();
        let err = verify_chain(HashAlgorithm::Sha256, std::slice::from_ref(&e0)).expect_err("mismatch");
        assert!(matches!(err, ChainError::SelfHashMismatch { seq: 0, .. }));
    }

    #[test]
    fn removing_an_event_breaks_the_link() {
        let run_id = RunId::new("run-1");
        let e0 = event(&run_id, 0, HashDigest::of_empty(HashAlgorithm::Sha256), "started");
        let e1 = event(&run_id, 1, e0.self_hash.clone(), "running");
        let e2 = event(&run_id, 2, e1.self_hash.clone(), "succeeded");
        let mut e2_reseqed = e2;
        e2_reseqed.seq = 1;
        let err = verify_chain(HashAlgorithm::Sha256, &[e0, e2_reseqed]).expect_err("broken");
        assert!(matches!(err, ChainError::BrokenLink { seq: 1 }));
    }
}
