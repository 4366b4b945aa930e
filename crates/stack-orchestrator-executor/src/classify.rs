// stack-orchestrator-executor/src/classify.rs
// ============================================================================
// Module: Error Classification
// Description: Maps a raw Helm invocation error message onto an `ErrorClass`
//              by substring match (spec §4.8).
// Purpose: Kept as a standalone, exhaustively-tested free function so the
//          exact substring table stays pinned and auditable.
// Dependencies: stack-orchestrator-core
// ============================================================================

use stack_orchestrator_core::core::ErrorClass;

/// Throttling signatures matched for [`ErrorClass::RateLimit`].
const RATE_LIMIT_SIGNATURES: &[&str] = &["429", "too many requests"];

/// Context-deadline signatures matched for [`ErrorClass::Timeout`].
const TIMEOUT_SIGNATURES: &[&str] = &["context deadline exceeded", "context-deadline", "deadline exceeded"];

/// Connection-reset / EOF / I/O timeout signatures matched for
/// [`ErrorClass::Transport`].
const TRANSPORT_SIGNATURES: &[&str] =
    &["connection reset", "connection-reset", "eof", "i/o timeout", "broken pipe"];

/// HTTP 5xx signatures matched for [`ErrorClass::Server5xx`].
const SERVER_5XX_SIGNATURES: &[&str] =
    &["500", "502", "503", "504", "internal server error", "bad gateway", "gateway timeout"];

/// Service-unavailable signatures matched for [`ErrorClass::Unavailable`].
const UNAVAILABLE_SIGNATURES: &[&str] = &["service unavailable", "service-unavailable", "no such host"];

/// Classifies a raw error message from a Helm invocation (spec §4.8).
///
/// Matching is case-insensitive substring search over the tables above, in
/// the declared order: `RATE_LIMIT`, `TIMEOUT`, `TRANSPORT`, `SERVER_5XX`,
/// `UNAVAILABLE`, falling back to `OTHER`. Order matters only when a message
/// happens to match more than one table; in practice Helm/Kubernetes error
/// text rarely does.
#[must_use]
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if matches_any(&lower, RATE_LIMIT_SIGNATURES) {
        ErrorClass::RateLimit
    } else if matches_any(&lower, TIMEOUT_SIGNATURES) {
        ErrorClass::Timeout
    } else if matches_any(&lower, TRANSPORT_SIGNATURES) {
        ErrorClass::Transport
    } else if matches_any(&lower, SERVER_5XX_SIGNATURES) {
        ErrorClass::Server5xx
    } else if matches_any(&lower, UNAVAILABLE_SIGNATURES) {
        ErrorClass::Unavailable
    } else {
        ErrorClass::Other
    }
}

fn matches_any(haystack: &str, signatures: &[&str]) -> bool {
    signatures.iter().any(|signature| haystack.contains(signature))
}
