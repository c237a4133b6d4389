// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reload Coordinator: the state machine for the editor's in-place reload.
//!
//! This is the *only* site that decides whether a disconnect cancels or
//! preserves in-flight work. The Connection Manager only ever consults
//! [`ReloadCoordinator::is_reloading`]; it never calls `cancel_all` directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::registry::{EventWaiterRegistry, RequestRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Reloading,
}

struct Inner {
    state: Mutex<ReloadState>,
    deadline: Mutex<Option<Instant>>,
    reconnected: Notify,
    state_changed: Notify,
}

/// Shared handle to the reload state machine. Cheap to clone; the background
/// deadline-watcher task holds its own clone alongside the registries it
/// cancels on expiry.
#[derive(Clone)]
pub struct ReloadCoordinator {
    inner: Arc<Inner>,
}

impl ReloadCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ReloadState::Idle),
                deadline: Mutex::new(None),
                reconnected: Notify::new(),
                state_changed: Notify::new(),
            }),
        }
    }

    pub fn is_reloading(&self) -> bool {
        *self.inner.state.lock() == ReloadState::Reloading
    }

    /// Called by the Message Router on observing a `reload_starting` event.
    pub fn begin_reload(&self, grace_period: Duration, now: Instant) {
        *self.inner.state.lock() = ReloadState::Reloading;
        *self.inner.deadline.lock() = Some(now + grace_period);
        info!(deadline_ms = grace_period.as_millis() as u64, "editor reload starting");
        self.inner.state_changed.notify_waiters();
    }

    /// Called by the Connection Manager on peer reconnection.
    pub fn reconnected(&self) {
        let was_reloading = {
            let mut state = self.inner.state.lock();
            let was = *state == ReloadState::Reloading;
            *state = ReloadState::Idle;
            was
        };
        *self.inner.deadline.lock() = None;
        if was_reloading {
            info!("editor reconnected within reload grace period");
            self.inner.reconnected.notify_waiters();
            self.inner.state_changed.notify_waiters();
        }
    }

    pub async fn wait_for_reload_complete(&self) {
        self.inner.reconnected.notified().await;
    }

    /// Spawn the background task that transitions `Reloading -> Idle` and
    /// cancels all outstanding work if reconnection does not happen before
    /// the deadline. Held alive by the caller for the daemon's lifetime.
    pub fn spawn_deadline_watcher(
        &self,
        requests: Arc<RequestRegistry>,
        waiters: Arc<EventWaiterRegistry>,
    ) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                let deadline = *coordinator.inner.deadline.lock();
                let Some(deadline) = deadline else {
                    coordinator.inner.state_changed.notified().await;
                    continue;
                };

                tokio::select! {
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        let still_reloading = {
                            let mut state = coordinator.inner.state.lock();
                            let still = *state == ReloadState::Reloading;
                            if still {
                                *state = ReloadState::Idle;
                            }
                            still
                        };
                        if still_reloading {
                            warn!("editor reload deadline exceeded, cancelling outstanding work");
                            *coordinator.inner.deadline.lock() = None;
                            requests.cancel_all();
                            waiters.cancel_all();
                        }
                    }
                    _ = coordinator.inner.reconnected.notified() => {}
                }
            }
        })
    }
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "reload_tests.rs"]
mod tests;
