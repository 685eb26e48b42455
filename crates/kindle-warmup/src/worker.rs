//! A single warmup worker.
//!
//! A worker waits out its ramp-up offset, then repeatedly sleeps for the
//! request delay and sends the next request of its cycle. Every sleep and
//! every send races both the cancellation signal and the warmup deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kindle_core::{GrpcRequest, Headers, HttpRequest, interpolate};
use kindle_health::cancelled;
use kindle_transport::{BoxFuture, GrpcTransport, HttpTransport};
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::counter::SentCounter;
use crate::sequence::RequestCycle;

/// Sends one request of a given protocol.
pub(crate) trait Dispatch: Send + Sync + 'static {
    type Request: fmt::Display + Send + Sync + 'static;

    const PROTOCOL: &'static str;

    /// Returns `true` if the request reached the target, whatever its status.
    fn dispatch<'a>(&'a self, request: &'a Self::Request) -> BoxFuture<'a, bool>;
}

/// Global header values are expanded again for every request.
fn interpolate_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), interpolate(value)))
        .collect()
}

pub(crate) struct HttpDispatch {
    pub client: Arc<dyn HttpTransport>,
    pub headers: Headers,
}

impl Dispatch for HttpDispatch {
    type Request = HttpRequest;

    const PROTOCOL: &'static str = "http";

    fn dispatch<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let mut headers = interpolate_headers(&self.headers);
            headers.extend(request.headers.iter().cloned());

            match self
                .client
                .send(&request.method, &request.path, &headers, request.body.clone())
                .await
            {
                Ok(response) if response.is_success() => {
                    debug!(
                        %request,
                        status = response.status,
                        elapsed_ms = response.duration.as_millis() as u64,
                        "warmup request sent"
                    );
                    true
                }
                Ok(response) => {
                    warn!(
                        %request,
                        status = response.status,
                        elapsed_ms = response.duration.as_millis() as u64,
                        "warmup request returned non-2xx status"
                    );
                    true
                }
                Err(e) => {
                    warn!(%request, error = %e, "warmup request failed");
                    false
                }
            }
        })
    }
}

pub(crate) struct GrpcDispatch {
    pub client: Arc<dyn GrpcTransport>,
    pub headers: Headers,
}

impl Dispatch for GrpcDispatch {
    type Request = GrpcRequest;

    const PROTOCOL: &'static str = "grpc";

    fn dispatch<'a>(&'a self, request: &'a GrpcRequest) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let headers = interpolate_headers(&self.headers);
            match self
                .client
                .send(&request.service_method, &request.message, &headers)
                .await
            {
                Ok(response) => {
                    debug!(
                        %request,
                        elapsed_ms = response.duration.as_millis() as u64,
                        "warmup request sent"
                    );
                    true
                }
                Err(e) => {
                    warn!(%request, error = %e, "warmup request failed");
                    false
                }
            }
        })
    }
}

/// Timing shared by all workers of one run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    pub delay: Duration,
    pub ramp_up: Duration,
    pub deadline: Instant,
}

/// Run one worker to completion and return how many requests it sent.
pub(crate) async fn run<D: Dispatch>(
    id: usize,
    dispatcher: Arc<D>,
    mut requests: RequestCycle<D::Request>,
    schedule: Schedule,
    counter: SentCounter,
    mut cancel: watch::Receiver<bool>,
) -> u64 {
    let mut sent = 0;

    let start_offset = schedule
        .ramp_up
        .saturating_mul(u32::try_from(id).unwrap_or(u32::MAX));
    if !start_offset.is_zero() {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return sent,
            _ = sleep_until(schedule.deadline) => return sent,
            _ = sleep(start_offset) => {}
        }
    }
    debug!(protocol = D::PROTOCOL, worker = id, "warmup worker started");

    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = sleep_until(schedule.deadline) => break,
            _ = sleep(schedule.delay) => {}
        }

        let Some(request) = requests.next() else {
            break;
        };

        let reached = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = sleep_until(schedule.deadline) => break,
            reached = dispatcher.dispatch(request) => reached,
        };
        if reached {
            counter.increment();
            sent += 1;
        }
    }

    debug!(protocol = D::PROTOCOL, worker = id, sent, "warmup worker stopped");
    sent
}
