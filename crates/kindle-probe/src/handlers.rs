//! Probe handlers.
//!
//! Both endpoints answer with an empty body: `200 OK` when the flag is set,
//! `404 Not Found` otherwise.

use axum::extract::State;
use axum::http::StatusCode;

use crate::ProbeState;

fn status(flag: bool) -> StatusCode {
    if flag {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// GET <liveness-path>
pub async fn liveness(State(state): State<ProbeState>) -> StatusCode {
    status(state.is_alive())
}

/// GET <readiness-path>
pub async fn readiness(State(state): State<ProbeState>) -> StatusCode {
    status(state.is_ready())
}
