//! Probe error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while exposing liveness and readiness.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unable to bind probe server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("invalid probe path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("probe server failed: {0}")]
    Serve(#[from] std::io::Error),

    #[error("unable to write probe file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type ProbeResult<T> = Result<T, ProbeError>;
