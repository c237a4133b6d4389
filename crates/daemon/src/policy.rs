// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion policy: how the daemon decides a command is "done" and how
//! long it is willing to wait before giving up.
//!
//! Most commands complete as soon as the peer sends a matching `Response`
//! frame. A handful of commands only report success asynchronously through
//! an `Event`, so the daemon has to wait for a specific follow-up event
//! (optionally gated on a field of its payload) instead of, or in addition
//! to, the immediate response.

use std::time::Duration;

use crate::env;
use crate::registry::ExpectedState;

/// What the Request Registry should wait for beyond the immediate response.
#[derive(Debug, Clone)]
pub enum CompletionMode {
    /// The `Response` frame alone marks the command complete.
    ResponseOnly,
    /// Wait for the named event (optionally state-gated) in addition to the
    /// response; the daemon does not reply to the caller until it arrives.
    AwaitEvent { event_name: &'static str, expected_state: Option<ExpectedState> },
}

#[derive(Debug, Clone)]
pub struct CommandPolicy {
    pub timeout: Duration,
    pub completion: CompletionMode,
}

/// Look up the policy for a command token, applying any `UNITYCTL_TIMEOUT_*`
/// override from the environment on top of the built-in table.
pub fn policy_for(command: &str) -> CommandPolicy {
    let mut policy = builtin_policy(command);
    if let Some(timeout) = env::command_timeout_override(command) {
        policy.timeout = timeout;
    }
    policy
}

fn builtin_policy(command: &str) -> CommandPolicy {
    match command {
        "play.enter" => CommandPolicy {
            timeout: Duration::from_secs(30),
            completion: CompletionMode::AwaitEvent {
                event_name: "playModeChanged",
                expected_state: Some(ExpectedState {
                    field: "state".to_string(),
                    value: serde_json::json!("EnteredPlayMode"),
                }),
            },
        },
        "play.exit" => CommandPolicy {
            timeout: Duration::from_secs(30),
            completion: CompletionMode::AwaitEvent {
                event_name: "playModeChanged",
                expected_state: Some(ExpectedState {
                    field: "state".to_string(),
                    value: serde_json::json!("ExitedPlayMode"),
                }),
            },
        },
        "compile.scripts" => CommandPolicy {
            timeout: Duration::from_secs(30),
            completion: CompletionMode::AwaitEvent { event_name: "compilation.finished", expected_state: None },
        },
        "asset.import" => CommandPolicy {
            timeout: Duration::from_secs(30),
            completion: CompletionMode::AwaitEvent { event_name: "asset.importComplete", expected_state: None },
        },
        "asset.reimportAll" => CommandPolicy {
            timeout: Duration::from_secs(30),
            completion: CompletionMode::AwaitEvent { event_name: "asset.reimportAllComplete", expected_state: None },
        },
        // Unity has no native "asset refresh finished" notification, so the
        // plugin synthesizes a `refresh.complete` event, which the router
        // also ingests into the log store (it is of logging kind).
        "asset.refresh" => CommandPolicy {
            timeout: Duration::from_secs(60),
            completion: CompletionMode::AwaitEvent { event_name: "refresh.complete", expected_state: None },
        },
        "test.run" => CommandPolicy {
            timeout: Duration::from_secs(300),
            completion: CompletionMode::AwaitEvent { event_name: "test.finished", expected_state: None },
        },
        _ => CommandPolicy { timeout: env::DEFAULT_TIMEOUT, completion: CompletionMode::ResponseOnly },
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
