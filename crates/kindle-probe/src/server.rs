//! Probe HTTP server.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::error::{ProbeError, ProbeResult};
use crate::{ProbePaths, ProbeState, build_router};

/// Default port of the probe server.
pub const DEFAULT_PORT: u16 = 8000;

/// Serves the liveness and readiness endpoints until shutdown.
pub struct ProbeServer {
    listener: TcpListener,
    paths: ProbePaths,
    state: ProbeState,
}

impl ProbeServer {
    /// Fails on invalid `paths` before anything is bound.
    pub async fn bind(addr: SocketAddr, paths: ProbePaths, state: ProbeState) -> ProbeResult<Self> {
        paths.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProbeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            paths,
            state,
        })
    }

    pub fn local_addr(&self) -> ProbeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is set.
    ///
    /// Liveness is reported from the moment the server starts until it is
    /// told to shut down.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> ProbeResult<()> {
        let addr = self.local_addr()?;
        let router = build_router(self.state.clone(), &self.paths);
        let state = self.state.clone();

        info!(
            %addr,
            liveness = %self.paths.liveness,
            readiness = %self.paths.readiness,
            "probe server starting"
        );
        state.set_alive(true);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
                state.set_alive(false);
                info!("probe server shutting down");
            })
            .await?;

        info!("probe server stopped");
        Ok(())
    }
}
