// stack-orchestrator-scheduler/src/ramp.rs
// ============================================================================
// Module: Progressive Concurrency Ramp
// Description: Pure state machine for `targetWorkers` adjustment (spec
//              §4.7 "Progressive / adaptive mode").
// Purpose: Kept free of thread/mutex concerns so the ramp behavior itself is
//          directly unit-testable.
// Dependencies: stack-orchestrator-core, crate::config
// ============================================================================

use std::collections::VecDeque;

use stack_orchestrator_core::core::ErrorClass;

use crate::config::SchedulerConfig;

/// Error classes that trigger the severe-error cooldown (spec §4.7: "On
/// error classes `RATE_LIMIT`, `SERVER_5XX`, `UNAVAILABLE`, require
/// `cooldownSevere` further successes before the next ramp-up").
fn is_severe(class: ErrorClass) -> bool {
    matches!(class, ErrorClass::RateLimit | ErrorClass::Server5xx | ErrorClass::Unavailable)
}

/// Tracks the rolling outcome window and `targetWorkers` for one run.
#[derive(Debug, Clone)]
pub struct RampState {
    ceiling: u32,
    target_workers: u32,
    window: VecDeque<bool>,
    window_size: usize,
    consecutive_successes: u32,
    consecutive_failures: u32,
    cooldown_remaining: u32,
    after_successes: u32,
    max_failure_rate: f64,
    cooldown_severe: u32,
}

impl RampState {
    /// Builds a ramp state for a run with concurrency ceiling `ceiling`.
    /// When `progressive` is false, `target_workers` is pinned at
    /// `ceiling` and outcomes never change it.
    #[must_use]
    pub fn new(ceiling: u32, progressive: bool, config: &SchedulerConfig) -> Self {
        Self {
            ceiling,
            target_workers: if progressive { 1.min(ceiling.max(1)) } else { ceiling.max(1) },
            window: VecDeque::with_capacity(config.window),
            window_size: config.window,
            consecutive_successes: 0,
            consecutive_failures: 0,
            cooldown_remaining: 0,
            after_successes: config.ramp_after_successes,
            max_failure_rate: config.ramp_max_failure_rate,
            cooldown_severe: config.cooldown_severe,
        }
    }

    /// Current worker admission ceiling.
    #[must_use]
    pub const fn target_workers(&self) -> u32 {
        self.target_workers
    }

    /// Records a successful node outcome and adjusts `target_workers`.
    pub fn record_success(&mut self) {
        self.push_window(true);
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;

        if self.cooldown_remaining > 0 {
            self.cooldown_remaining -= 1;
            return;
        }
        if self.consecutive_successes >= self.after_successes && self.failure_rate() < self.max_failure_rate {
            self.target_workers = (self.target_workers + 1).min(self.ceiling.max(1));
            self.consecutive_successes = 0;
        }
    }

    /// Records a failed node outcome and adjusts `target_workers`.
    pub fn record_failure(&mut self, class: ErrorClass) {
        self.push_window(false);
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;

        self.target_workers = self.target_workers.saturating_sub(1).max(1);
        if self.consecutive_failures >= 2 {
            self.target_workers = 1;
        }
        if is_severe(class) {
            self.cooldown_remaining = self.cooldown_severe;
        }
    }

    fn push_window(&mut self, succeeded: bool) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(succeeded);
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|succeeded| !**succeeded).count();
        #[allow(clippy::cast_precision_loss, reason = "window sizes are small, bounded by config")]
        let rate = failures as f64 / self.window.len() as f64;
        rate
    }
}
