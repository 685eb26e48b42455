//! kindle-health: waits for the target to report ready.
//!
//! The prober polls the target's readiness endpoint once per second until
//! it answers successfully, the readiness timeout elapses, or the run is
//! cancelled. Exactly one of those three outcomes is reported.
//!
//! # Architecture
//!
//! ```text
//! ReadinessProber::wait(cancel)
//!   ├── sleep POLL_INTERVAL   (races cancel + deadline)
//!   ├── http_probe() / grpc_probe() → ProbeResult   (races cancel + deadline)
//!   └── ReadinessTracker (Waiting → Ready | TimedOut | Cancelled)
//! ```
//!
//! Probe failures never end the loop; they are logged and the next attempt
//! follows after the poll interval.

pub mod checker;
pub mod prober;

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

pub use checker::{ProbeResult, ReadinessState, ReadinessTracker};
pub use prober::{POLL_INTERVAL, ReadinessProber, ReadinessReport, ReadinessTransport};

/// Resolves once the cancellation flag is set.
///
/// If every sender is gone the run can no longer be cancelled, so this
/// never resolves.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Budgets too large to represent as an instant end roughly 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `budget` after `start`, saturating instead of overflowing.
pub fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
