//! Readiness wait loop.

use std::sync::Arc;
use std::time::Duration;

use kindle_core::{Headers, ReadinessProtocol, TargetOptions, interpolate};
use kindle_transport::{GrpcTransport, HttpTransport};
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::{cancelled, deadline_after};
use crate::checker::{ProbeResult, ReadinessState, ReadinessTracker, grpc_probe, http_probe};

/// Delay before each probe attempt.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client used to reach the readiness endpoint.
#[derive(Clone)]
pub enum ReadinessTransport {
    Http(Arc<dyn HttpTransport>),
    /// Connected lazily by the first attempt that needs it.
    Grpc(Arc<dyn GrpcTransport>),
}

impl ReadinessTransport {
    pub fn protocol(&self) -> ReadinessProtocol {
        match self {
            Self::Http(_) => ReadinessProtocol::Http,
            Self::Grpc(_) => ReadinessProtocol::Grpc,
        }
    }
}

/// Terminal result of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessReport {
    pub state: ReadinessState,
    /// Time from the start of the wait until the terminal transition.
    pub elapsed: Duration,
    pub attempts: u32,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }
}

/// Polls the target until it is ready, the timeout elapses, or the run is cancelled.
pub struct ReadinessProber {
    options: TargetOptions,
    transport: ReadinessTransport,
    headers: Headers,
}

impl ReadinessProber {
    /// `transport` must speak `options.protocol`.
    pub fn new(options: TargetOptions, transport: ReadinessTransport, headers: Headers) -> Self {
        debug_assert_eq!(
            options.protocol,
            transport.protocol(),
            "readiness transport does not match the readiness protocol"
        );
        Self {
            options,
            transport,
            headers,
        }
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    /// Run the wait loop to its single terminal state.
    ///
    /// Every sleep and every in-flight probe races the cancellation signal
    /// and the readiness deadline, so the loop never outlives either.
    pub async fn wait(&self, mut cancel: watch::Receiver<bool>) -> ReadinessReport {
        let started = Instant::now();
        let deadline = deadline_after(started, self.options.timeout);
        let mut tracker = ReadinessTracker::new();
        let mut grpc_connected = false;

        info!(
            protocol = %self.options.protocol,
            port = self.options.port,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "waiting for target readiness"
        );

        while !tracker.state().is_terminal() {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    tracker.cancel();
                    break;
                }
                _ = sleep_until(deadline) => {
                    tracker.time_out();
                    break;
                }
                _ = sleep(POLL_INTERVAL) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    tracker.cancel();
                    break;
                }
                _ = sleep_until(deadline) => {
                    tracker.time_out();
                    break;
                }
                result = self.probe(&mut grpc_connected) => result,
            };
            tracker.record(result);
        }

        if grpc_connected {
            if let ReadinessTransport::Grpc(client) = &self.transport {
                if let Err(e) = client.close().await {
                    warn!(error = %e, "failed to close readiness gRPC connection");
                }
            }
        }

        let report = ReadinessReport {
            state: tracker.state(),
            elapsed: started.elapsed(),
            attempts: tracker.attempts(),
        };
        match report.state {
            ReadinessState::Ready => info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                attempts = report.attempts,
                "target ready"
            ),
            ReadinessState::TimedOut => warn!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                attempts = report.attempts,
                "timed out waiting for target readiness"
            ),
            ReadinessState::Cancelled => info!("readiness wait cancelled"),
            ReadinessState::Waiting => {}
        }
        report
    }

    async fn probe(&self, grpc_connected: &mut bool) -> ProbeResult {
        let headers: Headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), interpolate(value)))
            .collect();

        match &self.transport {
            ReadinessTransport::Http(client) => {
                http_probe(client.as_ref(), &self.options.http_path, &headers).await
            }
            ReadinessTransport::Grpc(client) => {
                if !*grpc_connected {
                    if let Err(e) = client.connect(&Headers::new()).await {
                        debug!(error = %e, "readiness gRPC connect failed");
                        return ProbeResult::Failed;
                    }
                    *grpc_connected = true;
                }
                grpc_probe(client.as_ref(), &self.options.grpc_method, &headers).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use bytes::Bytes;
    use kindle_transport::{BoxFuture, GrpcResponse, HttpResponse, TransportError, TransportResult};

    use super::*;

    /// Answers 503 until `ready_after` calls have been made, then 200.
    struct FlakyHttp {
        ready_after: u32,
        calls: AtomicU32,
        paths: Mutex<Vec<String>>,
        headers: Mutex<Vec<Headers>>,
    }

    impl FlakyHttp {
        fn new(ready_after: u32) -> Arc<Self> {
            Arc::new(Self {
                ready_after,
                calls: AtomicU32::new(0),
                paths: Mutex::new(Vec::new()),
                headers: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpTransport for FlakyHttp {
        fn send<'a>(
            &'a self,
            _method: &'a str,
            path: &'a str,
            headers: &'a Headers,
            _body: Option<Bytes>,
        ) -> BoxFuture<'a, TransportResult<HttpResponse>> {
            Box::pin(async move {
                self.paths.lock().unwrap().push(path.to_string());
                self.headers.lock().unwrap().push(headers.clone());
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                let status = if call >= self.ready_after { 200 } else { 503 };
                Ok(HttpResponse {
                    duration: Duration::ZERO,
                    status,
                })
            })
        }
    }

    /// Never answers.
    struct HangingHttp;

    impl HttpTransport for HangingHttp {
        fn send<'a>(
            &'a self,
            _method: &'a str,
            _path: &'a str,
            _headers: &'a Headers,
            _body: Option<Bytes>,
        ) -> BoxFuture<'a, TransportResult<HttpResponse>> {
            Box::pin(std::future::pending())
        }
    }

    /// Refuses the first `connect_failures` connects, then serves OK.
    struct FakeGrpc {
        connect_failures: AtomicU32,
        connects: AtomicU32,
        closes: AtomicU32,
        methods: Mutex<Vec<(String, String)>>,
    }

    impl FakeGrpc {
        fn new(connect_failures: u32) -> Arc<Self> {
            Arc::new(Self {
                connect_failures: AtomicU32::new(connect_failures),
                connects: AtomicU32::new(0),
                closes: AtomicU32::new(0),
                methods: Mutex::new(Vec::new()),
            })
        }
    }

    impl GrpcTransport for FakeGrpc {
        fn connect<'a>(&'a self, _headers: &'a Headers) -> BoxFuture<'a, TransportResult<()>> {
            Box::pin(async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                let left = self.connect_failures.load(Ordering::SeqCst);
                if left > 0 {
                    self.connect_failures.store(left - 1, Ordering::SeqCst);
                    return Err(TransportError::Connect("refused".to_string()));
                }
                Ok(())
            })
        }

        fn send<'a>(
            &'a self,
            service_method: &'a str,
            message: &'a str,
            _headers: &'a Headers,
        ) -> BoxFuture<'a, TransportResult<GrpcResponse>> {
            Box::pin(async move {
                self.methods
                    .lock()
                    .unwrap()
                    .push((service_method.to_string(), message.to_string()));
                Ok(GrpcResponse {
                    duration: Duration::ZERO,
                })
            })
        }

        fn close(&self) -> BoxFuture<'_, TransportResult<()>> {
            Box::pin(async move {
                self.closes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn options(protocol: &str, timeout: Duration) -> TargetOptions {
        TargetOptions::new(protocol, "/ready", "grpc.health.v1.Health/Check", 8080, timeout).unwrap()
    }

    fn http_prober(client: Arc<dyn HttpTransport>, timeout: Duration) -> ReadinessProber {
        ReadinessProber::new(
            options("http", timeout),
            ReadinessTransport::Http(client),
            Headers::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_poll() {
        let client = FlakyHttp::new(1);
        let prober = http_prober(client.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert!(report.is_ready());
        assert_eq!(report.attempts, 1);
        assert_eq!(report.elapsed, POLL_INTERVAL);
        assert_eq!(*client.paths.lock().unwrap(), vec!["/ready".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_until_ready() {
        let client = FlakyHttp::new(3);
        let prober = http_prober(client.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert!(report.is_ready());
        assert_eq!(report.attempts, 3);
        assert_eq!(report.elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let client = FlakyHttp::new(u32::MAX);
        let prober = http_prober(client.clone(), Duration::from_secs(2));
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert_eq!(report.state, ReadinessState::TimedOut);
        assert_eq!(report.elapsed, Duration::from_secs(2));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_sleep() {
        let prober = http_prober(FlakyHttp::new(u32::MAX), Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            let _ = tx.send(true);
        });

        let report = prober.wait(rx).await;

        assert_eq!(report.state, ReadinessState::Cancelled);
        assert_eq!(report.elapsed, Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_overrides_in_flight_probe() {
        let prober = http_prober(Arc::new(HangingHttp), Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            sleep(Duration::from_millis(1200)).await;
            let _ = tx.send(true);
        });

        let report = prober.wait(rx).await;

        assert_eq!(report.state, ReadinessState::Cancelled);
        assert_eq!(report.attempts, 0);
        assert_eq!(report.elapsed, Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_hanging_probe() {
        let prober = http_prober(Arc::new(HangingHttp), Duration::from_millis(1500));
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert_eq!(report.state, ReadinessState::TimedOut);
        assert_eq!(report.elapsed, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn grpc_connects_lazily_and_closes_once() {
        let client = FakeGrpc::new(2);
        let prober = ReadinessProber::new(
            options("grpc", Duration::from_secs(10)),
            ReadinessTransport::Grpc(client.clone()),
            Headers::new(),
        );
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert!(report.is_ready());
        assert_eq!(report.attempts, 3);
        assert_eq!(client.connects.load(Ordering::SeqCst), 3);
        assert_eq!(client.closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            *client.methods.lock().unwrap(),
            vec![("grpc.health.v1.Health/Check".to_string(), String::new())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn grpc_never_connected_is_not_closed() {
        let client = FakeGrpc::new(u32::MAX);
        let prober = ReadinessProber::new(
            options("grpc", Duration::from_secs(3)),
            ReadinessTransport::Grpc(client.clone()),
            Headers::new(),
        );
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert_eq!(report.state, ReadinessState::TimedOut);
        assert_eq!(client.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn header_values_are_expanded_once_per_attempt() {
        let client = FlakyHttp::new(2);
        // One expansion leaves `{$currentTimestamp}`; a second would turn it into digits.
        let prober = ReadinessProber::new(
            options("http", Duration::from_secs(10)),
            ReadinessTransport::Http(client.clone()),
            vec![
                ("X-Nested".to_string(), "{{$random|$currentTimestamp}}".to_string()),
                ("X-Plain".to_string(), "static".to_string()),
            ],
        );
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert!(report.is_ready());
        let sent = client.headers.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for headers in sent.iter() {
            assert_eq!(
                *headers,
                vec![
                    ("X-Nested".to_string(), "{$currentTimestamp}".to_string()),
                    ("X-Plain".to_string(), "static".to_string()),
                ]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_waits_without_overflow() {
        let client = FlakyHttp::new(2);
        let prober = http_prober(client.clone(), Duration::from_secs(u64::MAX));
        let (_tx, rx) = watch::channel(false);

        let report = prober.wait(rx).await;

        assert!(report.is_ready());
        assert_eq!(report.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn transport_reports_its_protocol() {
        assert_eq!(
            ReadinessTransport::Http(Arc::new(HangingHttp)).protocol(),
            ReadinessProtocol::Http
        );
        assert_eq!(ReadinessTransport::Grpc(FakeGrpc::new(0)).protocol(), ReadinessProtocol::Grpc);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "readiness transport does not match")]
    fn mismatched_transport_is_rejected() {
        ReadinessProber::new(
            options("grpc", Duration::from_secs(10)),
            ReadinessTransport::Http(Arc::new(HangingHttp)),
            Headers::new(),
        );
    }
}
