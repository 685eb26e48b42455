//! Shared count of successfully sent warmup requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter incremented once per request that reached the target.
///
/// Cloning shares the underlying value; every worker holds a clone.
#[derive(Debug, Clone, Default)]
pub struct SentCounter {
    inner: Arc<AtomicU64>,
}

impl SentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sent request and return the new total.
    pub fn increment(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Start again from zero; clones see the reset too.
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}
