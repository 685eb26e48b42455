//! File-based probes.
//!
//! Some orchestrators check for the existence of a file instead of calling
//! an endpoint. The sidecar writes a small marker file when it comes alive
//! and another one once readiness is granted.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeResult};

pub const DEFAULT_LIVENESS_FILE: &str = "alive";
pub const DEFAULT_READINESS_FILE: &str = "ready";

/// Marker file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProbe {
    pub liveness: PathBuf,
    pub readiness: PathBuf,
}

impl Default for FileProbe {
    fn default() -> Self {
        Self {
            liveness: PathBuf::from(DEFAULT_LIVENESS_FILE),
            readiness: PathBuf::from(DEFAULT_READINESS_FILE),
        }
    }
}

impl FileProbe {
    pub fn new(liveness: impl Into<PathBuf>, readiness: impl Into<PathBuf>) -> Self {
        Self {
            liveness: liveness.into(),
            readiness: readiness.into(),
        }
    }

    /// Write the liveness marker. Failures are logged, not returned.
    pub fn mark_alive(&self) {
        if let Err(e) = write_marker(&self.liveness) {
            warn!(error = %e, "liveness file not written");
        }
    }

    /// Write the readiness marker. Failures are logged, not returned.
    pub fn mark_ready(&self) {
        if let Err(e) = write_marker(&self.readiness) {
            warn!(error = %e, "readiness file not written");
        }
    }
}

/// Create (or truncate) `path` with a short marker, creating parent directories.
pub fn write_marker(path: &Path) -> ProbeResult<()> {
    let write_err = |source| ProbeError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, b"ok\n").map_err(write_err)?;
    debug!(path = %path.display(), "probe file written");
    Ok(())
}
