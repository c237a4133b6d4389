// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the bridge daemon.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors a dispatched command can resolve to. Maps 1:1 onto the HTTP status
/// codes the command-completion path surfaces to a `/rpc` caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No peer connection is currently installed.
    #[error("no editor peer is connected")]
    PeerAbsent,
    /// The request or its event wait exceeded its deadline.
    #[error("request timed out")]
    Timeout,
    /// The caller disconnected, or the process is shutting down.
    #[error("request cancelled")]
    Cancelled,
    /// The peer responded with `status: error`; carries the body verbatim.
    #[error("peer returned an error: {message}")]
    PeerError { code: String, message: String, details: Option<serde_json::Value> },
    /// Any other unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<unityctl_wire::WireError> for BridgeError {
    fn from(err: unityctl_wire::WireError) -> Self {
        BridgeError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> AxumResponse {
        let (status, code, message, details): (StatusCode, &'static str, String, Option<serde_json::Value>) =
            match self {
                BridgeError::PeerAbsent => {
                    (StatusCode::SERVICE_UNAVAILABLE, "peer_absent", "no editor peer is connected".into(), None)
                }
                BridgeError::Timeout => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", "request timed out".into(), None)
                }
                BridgeError::Cancelled => (
                    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
                    "cancelled",
                    "request cancelled".into(),
                    None,
                ),
                // Peer errors are normally handled by the `/rpc` handler directly
                // (surfaced as HTTP 200 with this body); this arm covers callers
                // that propagate the error through `?` instead.
                BridgeError::PeerError { code, message, details } => {
                    let details = details.or_else(|| Some(serde_json::json!({ "peerCode": code })));
                    (StatusCode::OK, "peer_error", message, details)
                }
                BridgeError::Internal(message) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, None)
                }
            };
        (status, Json(ErrorBody { status: "error", code, message, details })).into_response()
    }
}

/// Failures that prevent the daemon from starting up at all; surfaced as
/// process exit code 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("project path does not exist: {0}")]
    ProjectNotFound(std::path::PathBuf),
    #[error("another bridge is already running for this project on port {0}")]
    AlreadyRunning(u16),
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("failed to write handshake file: {0}")]
    HandshakeWrite(#[source] std::io::Error),
    #[error("failed to resolve home directory")]
    NoStateDir,
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
