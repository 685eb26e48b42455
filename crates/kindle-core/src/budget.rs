//! Time budget arithmetic for the readiness and warmup phases.

use std::time::Duration;

use tracing::warn;

/// Wall-clock ceilings for a run.
///
/// `global_max` bounds the whole run. The readiness wait is capped at
/// `min(global_max, readiness_max)`, and the warmup phase gets whatever is
/// left of the global budget, capped at `warmup_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub global_max: Duration,
    pub readiness_max: Duration,
    pub warmup_max: Duration,
}

impl TimeBudget {
    /// Build a budget; unset phase ceilings default to the global one.
    pub fn new(global_max: Duration, readiness_max: Option<Duration>, warmup_max: Option<Duration>) -> Self {
        Self {
            global_max,
            readiness_max: readiness_max.unwrap_or(global_max),
            warmup_max: warmup_max.unwrap_or(global_max),
        }
    }

    /// How long the readiness prober may wait.
    pub fn readiness_timeout(&self) -> Duration {
        self.global_max.min(self.readiness_max)
    }

    /// How long the warmup phase may run after readiness took `readiness_elapsed`.
    ///
    /// Never negative: if readiness used up the global budget the result is zero.
    pub fn warmup_budget(&self, readiness_elapsed: Duration) -> Duration {
        let remaining = self.global_max.saturating_sub(readiness_elapsed);
        let budget = self.warmup_max.min(remaining);
        if budget < self.warmup_max {
            warn!(
                configured_ms = self.warmup_max.as_millis() as u64,
                effective_ms = budget.as_millis() as u64,
                readiness_ms = readiness_elapsed.as_millis() as u64,
                "warmup budget truncated by time spent waiting for readiness"
            );
        }
        budget
    }
}
