// stack-orchestrator-core/src/core/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for plans, effective inputs, and the
//          event log.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! All digests in the orchestrator are computed over RFC 8785 (JCS) canonical
//! JSON so that identical logical inputs always produce byte-identical
//! digests, independent of map iteration order or field ordering on the wire.
//! Binary payloads (chart tarballs, values file contents) are hashed directly
//! over raw bytes instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for orchestrator artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing, the only algorithm specified.
    Sha256,
}

/// Default hash algorithm used throughout the orchestrator.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Separator byte inserted between canonicalized tokens that are hashed
/// together, preventing ambiguity between e.g. `("ab", "c")` and `("a",
/// "bc")`.
pub const FIELD_SEPARATOR: u8 = 0x00;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }

    /// Returns the empty-input digest (`H("")`) for the given algorithm.
    ///
    /// Used as `self_hash[0]` for a run's event chain (spec §4.6).
    #[must_use]
    pub fn of_empty(algorithm: HashAlgorithm) -> Self {
        hash_bytes(algorithm, &[])
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

/// Hashes a sequence of byte tokens, joined by [`FIELD_SEPARATOR`], using the
/// provided algorithm.
///
/// This is the primitive used by the effective input hasher (spec §4.5) to
/// combine independently-canonicalized fields without ambiguity.
#[must_use]
pub fn hash_joined(algorithm: HashAlgorithm, tokens: &[&[u8]]) -> HashDigest {
    let mut buf = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        if idx > 0 {
            buf.push(FIELD_SEPARATOR);
        }
        buf.extend_from_slice(token);
    }
    hash_bytes(algorithm, &buf)
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

impl std::fmt::Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
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
    fn hash_bytes_is_deterministic() {
        let a = hash_bytes(HashAlgorithm::Sha256, b"hello");
        let b = hash_bytes(HashAlgorithm::Sha256, b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_canonical_json_ignores_field_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        let da = hash_canonical_json(HashAlgorithm::Sha256, &a).expect("canonicalize a");
        let db = hash_canonical_json(HashAlgorithm::Sha256, &b).expect("canonicalize b");
        assert_eq!(da, db);
    }

    #[test]
    fn hash_joined_distinguishes_token_boundaries() {
        let a = hash_joined(HashAlgorithm::Sha256, &[b"ab", b"c"]);
        let b = hash_joined(HashAlgorithm::Sha256, &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_digest_matches_direct_hash() {
        assert_eq!(
            HashDigest::of_empty(HashAlgorithm::Sha256),
            hash_bytes(HashAlgorithm::Sha256, &[])
        );
    }
}
