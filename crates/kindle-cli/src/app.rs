//! Sidecar lifecycle.
//!
//! validate config → probe server + liveness → readiness wait → warmup →
//! readiness signal → exit, or wait for a termination signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kindle_core::ReadinessProtocol;
use kindle_health::{ReadinessProber, ReadinessTransport, cancelled};
use kindle_probe::{ProbeServer, ProbeState, Probes};
use kindle_transport::{GrpcClient, HttpClient};
use kindle_warmup::{WarmupPool, run_warmup};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let plan = config.plan().context("invalid configuration")?;
    let http_timeout = Duration::from_millis(config.http_timeout_milliseconds);
    let grpc_timeout = Duration::from_millis(config.grpc_timeout_milliseconds);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // ── Probes ─────────────────────────────────────────────────
    let mut probes = Probes {
        server: None,
        file: config.file_probe(),
    };
    let server_handle = if config.server_probe_enabled {
        let state = ProbeState::new();
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server_probe_port));
        let server = ProbeServer::bind(addr, config.probe_paths(), state.clone()).await?;
        probes.server = Some(state);
        Some(tokio::spawn(server.serve(shutdown_rx.clone())))
    } else {
        None
    };
    probes.mark_alive();

    // ── Signals ────────────────────────────────────────────────
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            termination_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    // ── Readiness + warmup ─────────────────────────────────────
    let readiness_port = plan.target.port;
    let transport = match plan.target.protocol {
        ReadinessProtocol::Http => ReadinessTransport::Http(Arc::new(HttpClient::new(
            &config.http_base_url(readiness_port),
            http_timeout,
        ))),
        ReadinessProtocol::Grpc => ReadinessTransport::Grpc(Arc::new(GrpcClient::new(
            &config.grpc_address(readiness_port),
            grpc_timeout,
        ))),
    };
    let readiness_headers = match plan.target.protocol {
        ReadinessProtocol::Http => config.http_headers(),
        ReadinessProtocol::Grpc => config.grpc_headers(),
    };
    let prober = ReadinessProber::new(plan.target.clone(), transport, readiness_headers);

    let pool = WarmupPool::new(plan.pool)
        .with_http(
            Arc::new(HttpClient::new(
                &config.http_base_url(config.target_http_port),
                http_timeout,
            )),
            config.http_headers(),
        )
        .with_grpc(
            Arc::new(GrpcClient::new(
                &config.grpc_address(config.target_grpc_port),
                grpc_timeout,
            )),
            config.grpc_headers(),
        );

    let outcome = run_warmup(&prober, &pool, &plan.requests, &plan.budget, shutdown_rx.clone()).await;

    if outcome.any_worker_panicked() {
        error!(panicked_workers = outcome.panicked_workers, "some warmup workers panicked");
    }
    if outcome.readiness.is_ready() {
        info!(requests_sent = outcome.requests_sent, "warmup finished");
    } else {
        warn!("target still not ready, no requests were sent");
    }

    if outcome.should_report_ready(config.fail_readiness) {
        probes.mark_ready();
    } else {
        warn!("readiness withheld: no warmup requests were sent");
    }

    // ── Shutdown ───────────────────────────────────────────────
    if config.exit_after_warmup {
        let _ = shutdown_tx.send(true);
    } else {
        info!("waiting for termination signal");
        let mut rx = shutdown_rx.clone();
        cancelled(&mut rx).await;
    }

    if let Some(handle) = server_handle {
        handle.await.context("probe server task failed")??;
    }

    info!("kindle stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
