//! Warmup worker pool.
//!
//! `WarmupPool::run` spawns `concurrency` workers per protocol that has
//! requests, waits for every one of them to exit, and reports how many
//! requests were sent. A panicking worker is logged and counted; the other
//! workers carry on.

use std::sync::Arc;
use std::time::Duration;

use kindle_core::{GrpcRequest, Headers, HttpRequest};
use kindle_health::deadline_after;
use kindle_transport::{GrpcTransport, HttpTransport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::counter::SentCounter;
use crate::sequence::RequestCycle;
use crate::worker::{self, Dispatch, GrpcDispatch, HttpDispatch, Schedule};

/// Worker pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers per protocol.
    pub concurrency: usize,
    /// Pause before each request.
    pub delay: Duration,
    /// Start offset between consecutive workers; zero starts them all at once.
    pub ramp_up: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            delay: Duration::from_millis(250),
            ramp_up: Duration::ZERO,
        }
    }
}

/// Parsed warmup requests, per protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupRequests {
    pub http: Vec<HttpRequest>,
    pub grpc: Vec<GrpcRequest>,
}

impl WarmupRequests {
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.grpc.is_empty()
    }
}

/// Result of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub requests_sent: u64,
    pub panicked_workers: usize,
}

/// Sends warmup traffic through the configured transports.
pub struct WarmupPool {
    config: PoolConfig,
    http: Option<(Arc<dyn HttpTransport>, Headers)>,
    grpc: Option<(Arc<dyn GrpcTransport>, Headers)>,
    counter: SentCounter,
}

impl WarmupPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            http: None,
            grpc: None,
            counter: SentCounter::new(),
        }
    }

    /// Use `client` for HTTP requests, adding `headers` to each.
    pub fn with_http(mut self, client: Arc<dyn HttpTransport>, headers: Headers) -> Self {
        self.http = Some((client, headers));
        self
    }

    /// Use `client` for gRPC requests, adding `headers` to each.
    pub fn with_grpc(mut self, client: Arc<dyn GrpcTransport>, headers: Headers) -> Self {
        self.grpc = Some((client, headers));
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Live view of the sent-request count of the current or last run.
    pub fn counter(&self) -> SentCounter {
        self.counter.clone()
    }

    /// Send warmup traffic for at most `budget`, or until `cancel` fires.
    ///
    /// Every run counts from zero, so runs on the same pool must not overlap.
    /// Returns only after every spawned worker has exited. The gRPC
    /// connection is opened before the gRPC workers start and closed once
    /// they have all exited; a failed connect skips the gRPC workers only.
    pub async fn run(
        &self,
        requests: &WarmupRequests,
        budget: Duration,
        cancel: watch::Receiver<bool>,
    ) -> PoolReport {
        self.counter.reset();
        let schedule = Schedule {
            delay: self.config.delay,
            ramp_up: self.config.ramp_up,
            deadline: deadline_after(Instant::now(), budget),
        };
        info!(
            concurrency = self.config.concurrency,
            delay_ms = self.config.delay.as_millis() as u64,
            ramp_up_ms = self.config.ramp_up.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "starting warmup"
        );

        let http_workers = match &self.http {
            Some((client, headers)) if !requests.http.is_empty() => {
                let dispatcher = Arc::new(HttpDispatch {
                    client: client.clone(),
                    headers: headers.clone(),
                });
                self.spawn_workers(dispatcher, &requests.http, schedule, &cancel)
            }
            Some(_) => {
                info!("no requests specified for http warmup");
                Vec::new()
            }
            None if !requests.http.is_empty() => {
                warn!(requests = requests.http.len(), "http requests given but no http client configured");
                Vec::new()
            }
            None => Vec::new(),
        };

        let grpc_workers = match &self.grpc {
            Some((client, headers)) if !requests.grpc.is_empty() => {
                match client.connect(&Headers::new()).await {
                    Ok(()) => {
                        let dispatcher = Arc::new(GrpcDispatch {
                            client: client.clone(),
                            headers: headers.clone(),
                        });
                        Some((client.clone(), self.spawn_workers(dispatcher, &requests.grpc, schedule, &cancel)))
                    }
                    Err(e) => {
                        error!(error = %e, "unable to connect to gRPC target, skipping gRPC warmup");
                        None
                    }
                }
            }
            Some(_) => {
                info!("no requests specified for grpc warmup");
                None
            }
            None if !requests.grpc.is_empty() => {
                warn!(requests = requests.grpc.len(), "grpc requests given but no grpc client configured");
                None
            }
            None => None,
        };

        let grpc_join = async {
            let Some((client, handles)) = grpc_workers else {
                return 0;
            };
            let panicked = join_workers("grpc", handles).await;
            if let Err(e) = client.close().await {
                warn!(error = %e, "failed to close gRPC connection");
            }
            panicked
        };
        let (http_panicked, grpc_panicked) = tokio::join!(join_workers("http", http_workers), grpc_join);

        let report = PoolReport {
            requests_sent: self.counter.get(),
            panicked_workers: http_panicked + grpc_panicked,
        };
        info!(
            requests_sent = report.requests_sent,
            panicked_workers = report.panicked_workers,
            "warmup finished"
        );
        report
    }

    fn spawn_workers<D: Dispatch>(
        &self,
        dispatcher: Arc<D>,
        requests: &[D::Request],
        schedule: Schedule,
        cancel: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<u64>>
    where
        D::Request: Clone,
    {
        let requests: Arc<[D::Request]> = Arc::from(requests.to_vec());
        (0..self.config.concurrency)
            .map(|id| {
                tokio::spawn(worker::run(
                    id,
                    dispatcher.clone(),
                    RequestCycle::new(requests.clone(), id),
                    schedule,
                    self.counter.clone(),
                    cancel.clone(),
                ))
            })
            .collect()
    }
}

/// Wait for every worker; returns how many of them panicked.
async fn join_workers(protocol: &str, handles: Vec<JoinHandle<u64>>) -> usize {
    let mut panicked = 0;
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(_) => {}
            Err(e) if e.is_panic() => {
                error!(%protocol, worker = id, error = %e, "warmup worker panicked");
                panicked += 1;
            }
            Err(e) => {
                warn!(%protocol, worker = id, error = %e, "warmup worker did not complete");
            }
        }
    }
    panicked
}
