// stack-orchestrator-scheduler/src/config.rs
// ============================================================================
// Module: Scheduler Config
// Description: Progressive-ramp and retry-backoff tuning knobs not carried
//              on `RunnerConfig` (spec §4.7).
// Purpose: `RunnerConfig` (stack-orchestrator-core) holds the plan-level
//          ceilings (`concurrency`, `maxParallelPerNamespace`, ...); this
//          config holds the scheduler's own internal ramp/backoff behavior,
//          which the spec names but does not pin numerically.
// Dependencies: none
// ============================================================================

/// Tuning knobs for progressive concurrency ramp-up and retry backoff (spec
/// §4.7 "Progressive / adaptive mode", "Retry").
///
/// # Invariants
/// - `window` is the number of recent outcomes considered for the rolling
///   failure rate.
/// - `ramp_max_failure_rate` is a fraction in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Rolling window size for the ramp failure-rate calculation.
    pub window: usize,
    /// Consecutive successes required before `targetWorkers` increments.
    pub ramp_after_successes: u32,
    /// Failure rate over `window` below which ramp-up is still permitted.
    pub ramp_max_failure_rate: f64,
    /// Extra successes required after a severe error class before ramp-up
    /// resumes.
    pub cooldown_severe: u32,
    /// Base retry backoff, doubled per attempt (before jitter).
    pub base_backoff_ms: u64,
    /// Ceiling on retry backoff duration.
    pub max_backoff_ms: u64,
    /// How long the supervisor waits for in-flight nodes to finish after
    /// cancellation before giving up on a clean finalize.
    pub finalize_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window: 20,
            ramp_after_successes: 5,
            ramp_max_failure_rate: 0.1,
            cooldown_severe: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            finalize_timeout_seconds: 30,
        }
    }
}
