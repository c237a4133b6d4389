// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message Router: decodes inbound peer frames and dispatches them to the
//! registry or log store that owns the matching state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use unityctl_wire::{decode, Envelope, Event, Hello, Origin};

use crate::logstore::LogStore;
use crate::registry::{EventWaiterRegistry, RequestRegistry};
use crate::reload::ReloadCoordinator;

/// Event names the Log Store ingests. State-transition events (`playModeChanged`,
/// `reload_starting`, `compilation.finished`, ...) only drive the Event Waiter
/// Registry; `log` is the editor plugin's classified console output, and
/// `refresh.complete` additionally doubles as `asset.refresh`'s completion
/// marker (see the completion-policy table).
const LOGGING_KIND_EVENTS: &[&str] = &["log", "refresh.complete"];

fn is_logging_kind(event_name: &str) -> bool {
    LOGGING_KIND_EVENTS.contains(&event_name)
}

/// Appends a logging-kind event to the store. `log` events carry their own
/// `source`/`level`/`message` fields in the payload; other logging-kind
/// events (e.g. `refresh.complete`) have no such shape and are recorded as a
/// single `unity`-sourced info line naming the event.
fn ingest_log_event(logs: &LogStore, event: &Event) {
    if event.event == "log" {
        let source = event.payload.get("source").and_then(|v| v.as_str()).unwrap_or("unity").to_string();
        let level = event.payload.get("level").and_then(|v| v.as_str()).unwrap_or("info").to_string();
        let message = event.payload.get("message").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let stack_trace = event.payload.get("stackTrace").and_then(|v| v.as_str()).map(str::to_string);
        let color = event.payload.get("color").and_then(|v| v.as_str()).map(str::to_string);
        logs.append(source, level, message, stack_trace, color);
    } else {
        logs.append("unity", "info", format!("{}: {}", event.event, event.payload), None, None);
    }
}

pub struct Router {
    project_id: String,
    requests: Arc<RequestRegistry>,
    waiters: Arc<EventWaiterRegistry>,
    reload: ReloadCoordinator,
    logs: Arc<LogStore>,
    reload_grace_period: Duration,
}

impl Router {
    pub fn new(
        project_id: String,
        requests: Arc<RequestRegistry>,
        waiters: Arc<EventWaiterRegistry>,
        reload: ReloadCoordinator,
        logs: Arc<LogStore>,
        reload_grace_period: Duration,
    ) -> Self {
        Self { project_id, requests, waiters, reload, logs, reload_grace_period }
    }

    /// Dispatch a single inbound text frame. Malformed frames are logged and
    /// dropped; the peer connection stays open. Returns the encoded
    /// acknowledgement frame to send back, if the inbound frame was a
    /// `hello`.
    pub async fn route(&self, text: &str) -> Option<String> {
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping malformed frame from peer");
                return None;
            }
        };

        match envelope {
            Envelope::Hello(hello) => {
                debug!(project_id = %hello.project_id, "received hello from peer");
                let ack = Envelope::Hello(Hello {
                    origin: Origin::Daemon,
                    project_id: self.project_id.clone(),
                    unity_version: None,
                    editor_instance_id: None,
                    protocol_version: None,
                    plugin_version: None,
                    capabilities: Vec::new(),
                });
                match unityctl_wire::encode(&ack) {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!(%err, "failed to encode hello acknowledgement");
                        None
                    }
                }
            }
            Envelope::Response(response) => {
                if !self.requests.complete(&response.request_id, response) {
                    debug!("response for unknown or already-resolved request");
                }
                None
            }
            Envelope::Event(event) => {
                if event.event == "reload_starting" {
                    self.reload.begin_reload(self.reload_grace_period, Instant::now());
                }
                self.waiters.process(&event);
                if is_logging_kind(&event.event) {
                    ingest_log_event(&self.logs, &event);
                }
                None
            }
            Envelope::Request(request) => {
                // The daemon is the request-issuing side of this protocol;
                // a peer-originated request has no handler to route to.
                warn!(command = %request.command, "peer sent a request frame, which this bridge does not serve");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
