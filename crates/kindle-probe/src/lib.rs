//! kindle-probe: tells the orchestrator whether the sidecar is alive and ready.
//!
//! Two mechanisms are offered and can be combined: an HTTP server with a
//! liveness and a readiness endpoint, and marker files written to disk.
//!
//! # Routes
//!
//! | Method | Path (default) | Description |
//! |---|---|---|
//! | GET | `/alive` | 200 while the probe server runs, 404 otherwise |
//! | GET | `/ready` | 200 once readiness is granted, 404 before |

pub mod error;
pub mod file;
pub mod handlers;
pub mod server;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::routing::get;
use tracing::info;

pub use error::{ProbeError, ProbeResult};
pub use file::FileProbe;
pub use server::ProbeServer;

pub const DEFAULT_LIVENESS_PATH: &str = "/alive";
pub const DEFAULT_READINESS_PATH: &str = "/ready";

/// Flags read by the probe handlers.
#[derive(Debug, Clone, Default)]
pub struct ProbeState {
    alive: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Endpoint paths of the probe server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePaths {
    pub liveness: String,
    pub readiness: String,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            liveness: DEFAULT_LIVENESS_PATH.to_string(),
            readiness: DEFAULT_READINESS_PATH.to_string(),
        }
    }
}

impl ProbePaths {
    /// Check that both paths can be routed: each a literal path starting with
    /// `/`, and different from each other.
    pub fn validate(&self) -> ProbeResult<()> {
        for path in [&self.liveness, &self.readiness] {
            let reason = if !path.starts_with('/') {
                Some("must start with '/'")
            } else if path.contains(['{', '}']) || path.split('/').any(|s| s.starts_with([':', '*'])) {
                Some("must not contain route parameters or wildcards")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ProbeError::InvalidPath {
                    path: path.clone(),
                    reason,
                });
            }
        }
        if self.liveness == self.readiness {
            return Err(ProbeError::InvalidPath {
                path: self.readiness.clone(),
                reason: "liveness and readiness paths must differ",
            });
        }
        Ok(())
    }
}

/// Build the probe router.
///
/// `paths` must pass [`ProbePaths::validate`].
pub fn build_router(state: ProbeState, paths: &ProbePaths) -> Router {
    Router::new()
        .route(&paths.liveness, get(handlers::liveness))
        .route(&paths.readiness, get(handlers::readiness))
        .with_state(state)
}

/// Every enabled signalling mechanism, driven together.
#[derive(Debug, Clone, Default)]
pub struct Probes {
    /// Shared with the probe server, if one runs.
    pub server: Option<ProbeState>,
    pub file: Option<FileProbe>,
}

impl Probes {
    pub fn mark_alive(&self) {
        if let Some(state) = &self.server {
            state.set_alive(true);
        }
        if let Some(file) = &self.file {
            file.mark_alive();
        }
    }

    pub fn mark_ready(&self) {
        info!("marking sidecar ready");
        if let Some(state) = &self.server {
            state.set_ready(true);
        }
        if let Some(file) = &self.file {
            file.mark_ready();
        }
    }
}
