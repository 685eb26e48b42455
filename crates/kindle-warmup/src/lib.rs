//! kindle-warmup: sends synthetic traffic to a freshly started target.
//!
//! A run waits for the target to become ready, works out how much of the
//! global time budget is left, and then lets a pool of workers replay the
//! configured requests until that budget runs out or the run is cancelled.
//!
//! - One shared [`SentCounter`] counts requests that reached the target
//! - Each worker replays the request list cyclically from its own offset
//! - Worker panics are isolated, logged and reported in [`WarmupOutcome`]
//!
//! # Architecture
//!
//! ```text
//! run_warmup()
//!   ├── ReadinessProber::wait  (kindle-health)
//!   ├── TimeBudget::warmup_budget  (kindle-core)
//!   └── WarmupPool::run
//!       ├── C HTTP workers  ─┐
//!       ├── C gRPC workers  ─┼── SentCounter (AtomicU64)
//!       └── join all, close gRPC connection
//! ```

pub mod counter;
pub mod pipeline;
pub mod pool;
pub mod sequence;
mod worker;

pub use counter::SentCounter;
pub use pipeline::{WarmupOutcome, run_warmup};
pub use pool::{PoolConfig, PoolReport, WarmupPool, WarmupRequests};
pub use sequence::RequestCycle;
