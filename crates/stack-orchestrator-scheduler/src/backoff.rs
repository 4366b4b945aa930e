// stack-orchestrator-scheduler/src/backoff.rs
// ============================================================================
// Module: Retry Backoff
// Description: Exponential backoff with jitter for retried nodes (spec §4.7
//              "Retry").
// Purpose: Pure function over attempt number and a jitter source, kept
//          deterministic and unit-testable.
// Dependencies: crate::config
// ============================================================================

use std::time::Duration;

use crate::config::SchedulerConfig;

/// Computes the backoff duration before retrying `attempt` (1-based: the
/// attempt that just failed), doubling `base_backoff_ms` per attempt and
/// capping at `max_backoff_ms`, then applying up to 50% jitter via
/// `jitter_unit` (expected in `[0.0, 1.0)`, supplied by the caller so tests
/// stay deterministic).
#[must_use]
pub fn backoff_duration(attempt: u32, config: &SchedulerConfig, jitter_unit: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let scaled = config.base_backoff_ms.saturating_mul(1u64 << exponent);
    let capped = scaled.min(config.max_backoff_ms);
    #[allow(clippy::cast_possible_truncation, reason = "jitter_unit is clamped to [0.0, 1.0)")]
    #[allow(clippy::cast_sign_loss, reason = "capped and jitter_unit are both non-negative")]
    let jitter_ms = (capped as f64 * 0.5 * jitter_unit.clamp(0.0, 1.0)) as u64;
    Duration::from_millis(capped.saturating_sub(jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_before_capping() {
        let config = SchedulerConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 10_000,
            ..SchedulerConfig::default()
        };
        assert_eq!(backoff_duration(1, &config, 0.0), Duration::from_millis(100));
        assert_eq!(backoff_duration(2, &config, 0.0), Duration::from_millis(200));
        assert_eq!(backoff_duration(3, &config, 0.0), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped_at_max() {
        let config = SchedulerConfig {
            base_backoff_ms: 1_000,
            max_backoff_ms: 5_000,
            ..SchedulerConfig::default()
        };
        assert_eq!(backoff_duration(10, &config, 0.0), Duration::from_millis(5_000));
    }

    #[test]
    fn jitter_only_ever_reduces_the_delay() {
        let config = SchedulerConfig {
            base_backoff_ms: 1_000,
            max_backoff_ms: 5_000,
            ..SchedulerConfig::default()
        };
        let unjittered = backoff_duration(2, &config, 0.0);
        let jittered = backoff_duration(2, &config, 1.0);
        assert!(jittered <= unjittered);
        assert!(jittered >= unjittered / 2);
    }
}
