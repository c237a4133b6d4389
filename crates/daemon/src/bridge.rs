// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `BridgeHandle`: the single shared context threaded through every HTTP
//! handler and connection task, mirroring this lineage's one-struct,
//! `Arc`-cloned shared-context pattern.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use unityctl_core::{Clock, SystemClock};
use unityctl_wire::{Envelope, Origin, Request as WireRequest, Response, ResponseStatus};

use crate::connection::ConnectionManager;
use crate::error::BridgeError;
use crate::identity::ProjectIdentity;
use crate::logstore::LogStore;
use crate::policy::{policy_for, CompletionMode};
use crate::registry::{EventWaiterRegistry, RequestRegistry};
use crate::reload::ReloadCoordinator;

unityctl_core::define_id! {
    /// Correlates one outbound request with its peer response and, when the
    /// command's completion policy requires it, the gating event.
    pub struct RequestId("req-");
}

/// Shared context threaded through every HTTP handler and connection task.
/// Generic over the clock so tests can substitute [`unityctl_core::FakeClock`];
/// every non-test construction uses the default [`SystemClock`].
pub struct BridgeHandle<C: Clock = SystemClock> {
    pub project_id: ProjectIdentity,
    pub connection: ConnectionManager,
    pub requests: Arc<RequestRegistry>,
    pub waiters: Arc<EventWaiterRegistry>,
    pub reload: ReloadCoordinator,
    pub logs: Arc<LogStore>,
    pub clock: C,
    pub shutdown: CancellationToken,
}

impl<C: Clock> BridgeHandle<C> {
    pub fn new(project_id: ProjectIdentity, clock: C, log_capacity: usize, log_sub_capacity: usize) -> Self {
        Self {
            project_id,
            connection: ConnectionManager::new(),
            requests: Arc::new(RequestRegistry::new()),
            waiters: Arc::new(EventWaiterRegistry::new()),
            reload: ReloadCoordinator::new(),
            logs: Arc::new(LogStore::new(log_capacity, log_sub_capacity)),
            clock,
            shutdown: CancellationToken::new(),
        }
    }

    /// Dispatch one RPC command to the peer and resolve it per the
    /// command's completion policy (immediate response, or response plus a
    /// gating event).
    pub async fn dispatch(
        &self,
        command: &str,
        args: std::collections::HashMap<String, serde_json::Value>,
        agent_id: Option<String>,
    ) -> Result<serde_json::Value, BridgeError> {
        let policy = policy_for(command);
        let deadline = self.clock.now() + policy.timeout;

        self.connection.wait_for_peer(deadline).await?;

        let request_id = RequestId::new().to_string();

        let frame = Envelope::Request(WireRequest {
            origin: Origin::Daemon,
            request_id: request_id.clone(),
            agent_id,
            command: command.to_string(),
            args,
        });

        let event_waiter = match &policy.completion {
            CompletionMode::AwaitEvent { event_name, expected_state } => {
                Some(self.waiters.register(&request_id, *event_name, expected_state.clone()))
            }
            CompletionMode::ResponseOnly => None,
        };

        let connection = &self.connection;
        let response = self
            .requests
            .send(&request_id, deadline, &self.shutdown, || {
                let text = unityctl_wire::encode(&frame).map_err(BridgeError::from)?;
                connection.send_text(text)
            })
            .await?;

        if let Some(rx) = event_waiter {
            if let ResponseStatus::Error = response.status {
                return Err(peer_error(response));
            }
            let event = self.waiters.await_event(&request_id, rx, deadline, &self.shutdown).await?;
            return Ok(event.payload);
        }

        match response.status {
            ResponseStatus::Ok => Ok(response.result.unwrap_or(serde_json::Value::Null)),
            ResponseStatus::Error => Err(peer_error(response)),
        }
    }
}

fn peer_error(response: Response) -> BridgeError {
    let error = response.error.unwrap_or_else(|| unityctl_wire::ResponseError {
        code: "unknown".to_string(),
        message: "peer reported an error with no detail".to_string(),
        details: None,
    });
    BridgeError::PeerError { code: error.code, message: error.message, details: error.details }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
