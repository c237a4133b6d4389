// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Waiter Registry: holds per-request waiters for a terminal event
//! that marks command completion.
//!
//! Structurally a sibling of [`crate::registry::request::RequestRegistry`]
//! (same map-of-oneshots shape), keyed by `request_id` instead of event name,
//! since at most one waiter exists per in-flight request.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use unityctl_wire::Event;

use crate::error::BridgeError;

/// An optional predicate on an event's payload: a named field must equal a
/// given value for the event to satisfy the waiter.
#[derive(Debug, Clone)]
pub struct ExpectedState {
    pub field: String,
    pub value: Value,
}

impl ExpectedState {
    fn matches(&self, payload: &Value) -> bool {
        payload.get(&self.field).is_some_and(|v| v == &self.value)
    }
}

struct Waiter {
    event_name: String,
    expected_state: Option<ExpectedState>,
    tx: oneshot::Sender<Event>,
}

#[derive(Default)]
pub struct EventWaiterRegistry {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl EventWaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a waiter. Must be called before the request that triggers
    /// the event is sent, or an event arriving in the gap between send and
    /// registration is lost.
    pub fn register(
        &self,
        request_id: &str,
        event_name: impl Into<String>,
        expected_state: Option<ExpectedState>,
    ) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(
            request_id.to_string(),
            Waiter { event_name: event_name.into(), expected_state, tx },
        );
        rx
    }

    /// Iterate current waiters; complete and remove every waiter whose
    /// `event_name` matches and whose `expected_state` (if any) is satisfied,
    /// in a single pass under one lock acquisition.
    pub fn process(&self, event: &Event) {
        let mut waiters = self.waiters.lock();
        let matched: Vec<String> = waiters
            .iter()
            .filter(|(_, w)| {
                w.event_name == event.event
                    && w.expected_state.as_ref().map_or(true, |s| s.matches(&event.payload))
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in matched {
            if let Some(waiter) = waiters.remove(&id) {
                let _ = waiter.tx.send(event.clone());
            }
        }
    }

    /// Cancel a single waiter by request id, if still present. Client
    /// disconnects are handled by [`WaiterGuard`] instead.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.waiters.lock().remove(request_id).is_some()
    }

    pub fn cancel_all(&self) -> usize {
        let mut waiters = self.waiters.lock();
        let count = waiters.len();
        waiters.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Await the waiter previously allocated by [`Self::register`], racing a
    /// deadline and a cancellation token.
    ///
    /// `WaiterGuard` removes the waiter on drop regardless of which branch
    /// below runs, or whether this future is dropped outright by an HTTP
    /// handler torn down on client disconnect — the same leak risk as
    /// [`crate::registry::request::RequestRegistry::send`].
    pub async fn await_event(
        &self,
        request_id: &str,
        rx: oneshot::Receiver<Event>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Event, BridgeError> {
        let _guard = WaiterGuard { registry: self, request_id };

        tokio::select! {
            biased;
            result = rx => result.map_err(|_| BridgeError::Cancelled),
            _ = cancel.cancelled() => Err(BridgeError::Cancelled),
            _ = tokio::time::sleep_until(deadline.into()) => Err(BridgeError::Timeout),
        }
    }
}

struct WaiterGuard<'a> {
    registry: &'a EventWaiterRegistry,
    request_id: &'a str,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.registry.waiters.lock().remove(self.request_id);
    }
}

#[cfg(test)]
#[path = "event_waiter_tests.rs"]
mod tests;
