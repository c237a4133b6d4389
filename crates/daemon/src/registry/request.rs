// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request Registry: correlates outbound requests with inbound responses by
//! `request_id`, and enforces timeouts and cancellation.
//!
//! One-shot result slots, keyed by id, following the pending-request-map
//! shape used for LSP client/server correlation elsewhere in this lineage:
//! register under a lock, remove-and-send under the same lock, await the
//! receiver racing a deadline and a cancellation token.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use unityctl_wire::Response;

use crate::error::BridgeError;

#[derive(Default)]
pub struct RequestRegistry {
    slots: Mutex<HashMap<String, oneshot::Sender<Response>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a result slot for `request_id`. The caller must transmit the
    /// request frame only after this call returns, never before, so a
    /// `complete` racing the send cannot be lost.
    fn register(&self, request_id: &str) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(request_id.to_string(), tx);
        rx
    }

    /// Complete the slot for `request_id` if it is still present. Idempotent:
    /// a slot can be completed at most once, so late completions after a
    /// timeout or cancellation are silently discarded.
    pub fn complete(&self, request_id: &str, response: Response) -> bool {
        if let Some(tx) = self.slots.lock().remove(request_id) {
            tx.send(response).is_ok()
        } else {
            false
        }
    }

    /// Atomically drain and cancel every outstanding slot. Dropping each
    /// sender causes its paired `await` in [`Self::send`] to observe a
    /// `RecvError`, which is treated as `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let mut slots = self.slots.lock();
        let count = slots.len();
        slots.clear();
        count
    }

    /// Cancel a single in-flight request by id, if still present. Client
    /// disconnects are handled by [`SlotGuard`] instead, which fires
    /// regardless of how `send`'s future is torn down; this is the explicit,
    /// caller-driven counterpart.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.slots.lock().remove(request_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Register a slot, invoke `send_frame` to transmit the request, then
    /// await the first of {response, deadline, cancellation}. `send_frame`
    /// runs after the slot is published, closing the dispatch-before-register
    /// race for both this registry and any companion event waiter the caller
    /// registered first.
    ///
    /// If this future itself is dropped before any of those three branches
    /// completes — the caller's own future was dropped, e.g. an HTTP handler
    /// torn down because the client disconnected — none of the `select!`
    /// arms run, so cleanup can't rely on them. `SlotGuard` removes the slot
    /// from its `Drop` impl instead, which runs regardless of how this
    /// future's stack frame unwinds.
    pub async fn send<F, E>(
        &self,
        request_id: &str,
        deadline: Instant,
        cancel: &CancellationToken,
        send_frame: F,
    ) -> Result<Response, BridgeError>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let rx = self.register(request_id);
        let _guard = SlotGuard { registry: self, request_id };

        if send_frame().is_err() {
            return Err(BridgeError::PeerAbsent);
        }

        tokio::select! {
            biased;
            result = rx => result.map_err(|_| BridgeError::Cancelled),
            _ = cancel.cancelled() => Err(BridgeError::Cancelled),
            _ = tokio::time::sleep_until(deadline.into()) => Err(BridgeError::Timeout),
        }
    }
}

/// Removes a request's slot on drop, whether that drop comes from a normal
/// return, a timeout/cancel branch, or the enclosing future being dropped
/// outright. Removing an already-removed slot (e.g. `complete` got there
/// first) is a harmless no-op.
struct SlotGuard<'a> {
    registry: &'a RequestRegistry,
    request_id: &'a str,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.registry.slots.lock().remove(self.request_id);
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
