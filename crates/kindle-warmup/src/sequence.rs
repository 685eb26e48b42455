//! Cyclic request sequences.
//!
//! Every worker replays the full request list in order, wrapping around when
//! it runs out. Worker `n` starts at offset `n`, so concurrent workers spread
//! over different requests instead of hitting the first one in lock-step.

use std::sync::Arc;

/// A worker's cursor over a shared request list.
pub struct RequestCycle<T> {
    requests: Arc<[T]>,
    next: usize,
}

impl<T> RequestCycle<T> {
    /// Start at `offset`, wrapped to the list length.
    pub fn new(requests: Arc<[T]>, offset: usize) -> Self {
        let next = if requests.is_empty() {
            0
        } else {
            offset % requests.len()
        };
        Self { requests, next }
    }

    /// The next request, wrapping around at the end.
    ///
    /// Returns `None` if the list is empty.
    pub fn next(&mut self) -> Option<&T> {
        if self.requests.is_empty() {
            return None;
        }
        let idx = self.next;
        self.next = (idx + 1) % self.requests.len();
        Some(&self.requests[idx])
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
