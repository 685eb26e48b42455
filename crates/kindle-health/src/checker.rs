//! Readiness probe logic.
//!
//! A single probe attempt yields a [`ProbeResult`]; the
//! [`ReadinessTracker`] folds attempts, timeouts and cancellation into the
//! readiness state machine.

use kindle_core::{GrpcRequest, Headers};
use kindle_transport::{GrpcTransport, HttpTransport};
use tracing::{debug, info};

/// Result of a single readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// HTTP 2xx, or a gRPC call that returned OK.
    Ready,
    /// The target answered with a non-2xx status.
    NotReady,
    /// The probe could not be executed (connection or call error).
    Failed,
}

/// Readiness state machine.
///
/// `Waiting` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Waiting,
    Ready,
    TimedOut,
    Cancelled,
}

impl ReadinessState {
    pub fn is_terminal(self) -> bool {
        self != ReadinessState::Waiting
    }
}

/// Tracks probe attempts for one readiness wait.
///
/// Exactly one terminal transition happens; once it has, further
/// results, timeouts and cancellations are ignored.
#[derive(Debug)]
pub struct ReadinessTracker {
    state: ReadinessState,
    attempts: u32,
    failures: u32,
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Waiting,
            attempts: 0,
            failures: 0,
        }
    }

    /// Record a probe result and return the new state.
    pub fn record(&mut self, result: ProbeResult) -> ReadinessState {
        if self.state.is_terminal() {
            return self.state;
        }

        self.attempts += 1;
        match result {
            ProbeResult::Ready => {
                info!(attempts = self.attempts, "target is ready");
                self.state = ReadinessState::Ready;
            }
            ProbeResult::NotReady | ProbeResult::Failed => {
                self.failures += 1;
                debug!(attempts = self.attempts, ?result, "target not ready yet");
            }
        }
        self.state
    }

    pub fn time_out(&mut self) -> ReadinessState {
        if !self.state.is_terminal() {
            self.state = ReadinessState::TimedOut;
        }
        self.state
    }

    pub fn cancel(&mut self) -> ReadinessState {
        if !self.state.is_terminal() {
            self.state = ReadinessState::Cancelled;
        }
        self.state
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// `GET path` against the target; ready iff the call succeeds with a 2xx.
///
/// `headers` are sent as given; placeholder expansion is the caller's job.
pub async fn http_probe(client: &dyn HttpTransport, path: &str, headers: &Headers) -> ProbeResult {
    match client.send("GET", path, headers, None).await {
        Ok(response) if response.is_success() => ProbeResult::Ready,
        Ok(response) => {
            debug!(status = response.status, %path, "readiness probe non-2xx");
            ProbeResult::NotReady
        }
        Err(e) => {
            debug!(error = %e, %path, "readiness probe request failed");
            ProbeResult::Failed
        }
    }
}

/// Invoke the readiness method with an empty message; ready iff it returns OK.
pub async fn grpc_probe(client: &dyn GrpcTransport, method: &GrpcRequest, headers: &Headers) -> ProbeResult {
    match client.send(&method.service_method, "", headers).await {
        Ok(_) => ProbeResult::Ready,
        Err(e) => {
            debug!(error = %e, method = %method, "readiness probe call failed");
            ProbeResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_starts_waiting() {
        let tracker = ReadinessTracker::new();
        assert_eq!(tracker.state(), ReadinessState::Waiting);
        assert_eq!(tracker.attempts(), 0);
    }

    #[test]
    fn failures_keep_waiting() {
        let mut tracker = ReadinessTracker::new();
        assert_eq!(tracker.record(ProbeResult::Failed), ReadinessState::Waiting);
        assert_eq!(tracker.record(ProbeResult::NotReady), ReadinessState::Waiting);
        assert_eq!(tracker.failures(), 2);
    }

    #[test]
    fn first_success_is_ready() {
        let mut tracker = ReadinessTracker::new();
        tracker.record(ProbeResult::Failed);
        assert_eq!(tracker.record(ProbeResult::Ready), ReadinessState::Ready);
        assert_eq!(tracker.attempts(), 2);
    }

    #[test]
    fn only_one_terminal_transition() {
        let mut tracker = ReadinessTracker::new();
        tracker.time_out();
        assert_eq!(tracker.record(ProbeResult::Ready), ReadinessState::TimedOut);
        assert_eq!(tracker.cancel(), ReadinessState::TimedOut);
        assert_eq!(tracker.attempts(), 0);

        let mut tracker = ReadinessTracker::new();
        tracker.record(ProbeResult::Ready);
        assert_eq!(tracker.cancel(), ReadinessState::Ready);
        assert_eq!(tracker.time_out(), ReadinessState::Ready);
    }

    #[test]
    fn cancel_from_waiting() {
        let mut tracker = ReadinessTracker::new();
        assert_eq!(tracker.cancel(), ReadinessState::Cancelled);
        assert!(tracker.state().is_terminal());
    }
}
