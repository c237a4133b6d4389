// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Manager: owns the single peer WebSocket connection (the Unity
//! Editor side of the bridge) and its lifecycle.
//!
//! There is at most one peer connection at a time. A second `Hello` handshake
//! while one is already open replaces it, mirroring how this lineage's own
//! event bridge treats a fresh connect as authoritative over a stale one
//! rather than refusing it outright.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::registry::{EventWaiterRegistry, RequestRegistry};
use crate::reload::ReloadCoordinator;
use crate::router::Router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Absent,
    Open,
}

struct Inner {
    state: Mutex<PeerState>,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    connected: Notify,
}

/// Shared handle to the peer connection. Cheap to clone; every HTTP handler
/// that needs to reach the editor holds one.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PeerState::Absent),
                outbound: Mutex::new(None),
                connected: Notify::new(),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.lock() == PeerState::Open
    }

    /// Block until a peer is connected or `deadline` passes.
    pub async fn wait_for_peer(&self, deadline: Instant) -> Result<(), BridgeError> {
        if self.is_connected() {
            return Ok(());
        }
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(BridgeError::PeerAbsent);
            };
            tokio::select! {
                () = self.inner.connected.notified() => {
                    if self.is_connected() {
                        return Ok(());
                    }
                }
                () = tokio::time::sleep(remaining) => {
                    return Err(BridgeError::PeerAbsent);
                }
            }
        }
    }

    /// Encode and enqueue a frame for the peer. Fails immediately if there is
    /// no open connection; never blocks on a slow peer beyond the writer
    /// task's bounded channel.
    pub fn send_text(&self, text: String) -> Result<(), BridgeError> {
        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx.try_send(Message::Text(text)).map_err(|_| BridgeError::PeerAbsent),
            None => Err(BridgeError::PeerAbsent),
        }
    }

    /// Adopt a freshly upgraded WebSocket as the peer connection, replacing
    /// any prior one. Spawns the reader and writer halves and returns once
    /// the connection has fully closed.
    pub async fn run(
        &self,
        socket: WebSocket,
        router: Arc<Router>,
        reload: ReloadCoordinator,
        requests: Arc<RequestRegistry>,
        waiters: Arc<EventWaiterRegistry>,
    ) {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(64);

        *self.inner.outbound.lock() = Some(tx);
        *self.inner.state.lock() = PeerState::Open;
        info!("peer connected");
        reload.reconnected();
        self.inner.connected.notify_waiters();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(ack) = router.route(&text).await {
                        let _ = self.send_text(ack);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "peer sent close frame");
                    break;
                }
                Some(Ok(_)) => {} // ping/pong/binary: ignore
                Some(Err(err)) => {
                    warn!(%err, "peer connection error");
                    break;
                }
                None => {
                    info!("peer stream ended");
                    break;
                }
            }
        }

        *self.inner.state.lock() = PeerState::Absent;
        *self.inner.outbound.lock() = None;
        writer.abort();

        if reload.is_reloading() {
            info!("peer disconnected during reload, preserving outstanding work");
        } else {
            warn!("peer disconnected, cancelling outstanding work");
            requests.cancel_all();
            waiters.cancel_all();
        }
    }

    /// Convenience wrapper combining [`Self::wait_for_peer`] with a relative
    /// timeout, used by handlers that only have a duration on hand.
    pub async fn wait_for_peer_for(&self, timeout: Duration) -> Result<(), BridgeError> {
        self.wait_for_peer(Instant::now() + timeout).await
    }

    /// Test-only seam: mark the connection open and capture what handlers
    /// send, without bringing up a real WebSocket.
    #[cfg(test)]
    pub fn open_for_test(&self) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(64);
        *self.inner.outbound.lock() = Some(tx);
        *self.inner.state.lock() = PeerState::Open;
        self.inner.connected.notify_waiters();
        rx
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
