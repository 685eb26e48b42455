//! Readiness wait followed by warmup.

use std::time::Duration;

use kindle_core::TimeBudget;
use kindle_health::{ReadinessProber, ReadinessReport};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::pool::{WarmupPool, WarmupRequests};

/// What a run achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupOutcome {
    pub requests_sent: u64,
    pub panicked_workers: usize,
    pub readiness: ReadinessReport,
    /// Zero when the target never became ready.
    pub warmup_budget: Duration,
}

impl WarmupOutcome {
    /// Readiness is granted unless `fail_readiness` is set and nothing was sent.
    pub fn should_report_ready(&self, fail_readiness: bool) -> bool {
        !(fail_readiness && self.requests_sent == 0)
    }

    pub fn any_worker_panicked(&self) -> bool {
        self.panicked_workers > 0
    }
}

/// Wait for the target, then send warmup traffic with whatever budget is left.
///
/// The prober's own timeout should be `budget.readiness_timeout()`. If the
/// target never becomes ready the pool is not started.
pub async fn run_warmup(
    prober: &ReadinessProber,
    pool: &WarmupPool,
    requests: &WarmupRequests,
    budget: &TimeBudget,
    cancel: watch::Receiver<bool>,
) -> WarmupOutcome {
    let readiness = prober.wait(cancel.clone()).await;
    if !readiness.is_ready() {
        warn!(state = ?readiness.state, "target not ready, skipping warmup");
        return WarmupOutcome {
            requests_sent: 0,
            panicked_workers: 0,
            readiness,
            warmup_budget: Duration::ZERO,
        };
    }

    let warmup_budget = budget.warmup_budget(readiness.elapsed);
    if requests.is_empty() {
        info!("no warmup requests specified");
    }
    let report = pool.run(requests, warmup_budget, cancel).await;

    WarmupOutcome {
        requests_sent: report.requests_sent,
        panicked_workers: report.panicked_workers,
        readiness,
        warmup_budget,
    }
}
