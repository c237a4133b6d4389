// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup validation, handshake-file handling, and graceful shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bridge::BridgeHandle;
use crate::env;
use crate::error::StartupError;
use crate::identity::ProjectIdentity;

const HANDSHAKE_DIR: &str = ".unityctl";
const HANDSHAKE_FILE: &str = "bridge.json";

#[derive(Serialize)]
struct Handshake {
    #[serde(rename = "projectId")]
    project_id: String,
    port: u16,
    pid: u32,
}

/// Resolve and validate the editor project path, then check the handshake
/// file for an already-running bridge before binding anything.
pub fn validate_project(project: &Path) -> Result<PathBuf, StartupError> {
    let canonical = project.canonicalize().map_err(|_| StartupError::ProjectNotFound(project.to_path_buf()))?;
    if let Some(existing_port) = read_existing_port(&canonical) {
        return Err(StartupError::AlreadyRunning(existing_port));
    }
    Ok(canonical)
}

fn handshake_path(project: &Path) -> PathBuf {
    project.join(HANDSHAKE_DIR).join(HANDSHAKE_FILE)
}

/// Best-effort check: a handshake file naming a port that is not actually
/// listening is treated as stale, not a conflict (the previous bridge likely
/// crashed without cleaning up).
fn read_existing_port(project: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(handshake_path(project)).ok()?;
    let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
    let port = value.get("port")?.as_u64()? as u16;
    let reachable = std::net::TcpStream::connect_timeout(
        &std::net::SocketAddr::from(([127, 0, 0, 1], port)),
        std::time::Duration::from_millis(200),
    )
    .is_ok();
    reachable.then_some(port)
}

pub async fn bind(port: u16) -> Result<TcpListener, StartupError> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(StartupError::Bind)
}

pub fn write_handshake(project: &Path, project_id: &ProjectIdentity, port: u16) -> Result<(), StartupError> {
    let dir = project.join(HANDSHAKE_DIR);
    std::fs::create_dir_all(&dir).map_err(StartupError::HandshakeWrite)?;
    let handshake =
        Handshake { project_id: project_id.as_str().to_string(), port, pid: std::process::id() };
    let body = serde_json::to_string_pretty(&handshake).unwrap_or_default();
    std::fs::write(handshake_path(project), body).map_err(StartupError::HandshakeWrite)
}

pub fn remove_handshake(project: &Path) {
    if let Err(err) = std::fs::remove_file(handshake_path(project)) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(%err, "failed to remove handshake file on shutdown");
        }
    }
}

/// Drain outstanding requests for up to `UNITYCTL_DRAIN_TIMEOUT_MS`, then
/// fire the process-wide cancellation token for anything still pending.
pub async fn shutdown(handle: Arc<BridgeHandle>) {
    info!("shutting down, draining outstanding requests");
    let drain_deadline = tokio::time::Instant::now() + env::drain_timeout();
    while handle.requests.pending_count() > 0 || handle.waiters.pending_count() > 0 {
        if tokio::time::Instant::now() >= drain_deadline {
            warn!("drain timeout exceeded, cancelling outstanding requests");
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    handle.shutdown.cancel();
    handle.requests.cancel_all();
    handle.waiters.cancel_all();
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
