// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

/// Default per-command timeout for commands with no completion-policy entry.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Graceful shutdown drain timeout (default 5s, `UNITYCTL_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("UNITYCTL_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Reload grace-period deadline once a `reload_starting` event is observed
/// (default 60s, `UNITYCTL_RELOAD_DEADLINE_MS`).
pub fn reload_deadline() -> Duration {
    std::env::var("UNITYCTL_RELOAD_DEADLINE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(60))
}

/// Log store ring-buffer capacity override (default ~1000, `UNITYCTL_LOG_CAPACITY`).
pub fn log_capacity() -> usize {
    std::env::var("UNITYCTL_LOG_CAPACITY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1000)
}

/// Per-subscriber bounded queue capacity for log fan-out (`UNITYCTL_LOG_SUB_CAPACITY`).
pub fn log_subscription_capacity() -> usize {
    std::env::var("UNITYCTL_LOG_SUB_CAPACITY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100)
}

/// Per-command timeout override, looked up as `UNITYCTL_TIMEOUT_<TOKEN>` where
/// `token` is the command name upper-cased with `.` replaced by `_`
/// (`play.enter` -> `UNITYCTL_TIMEOUT_PLAY_ENTER`).
pub fn command_timeout_override(command: &str) -> Option<Duration> {
    let var_name = format!("UNITYCTL_TIMEOUT_{}", command.to_uppercase().replace('.', "_"));
    std::env::var(var_name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

/// Log file path for the non-blocking file subscriber, if any
/// (`--log-file` takes precedence; `UNITYCTL_LOG_FILE` is the env fallback).
pub fn log_file() -> Option<std::path::PathBuf> {
    std::env::var("UNITYCTL_LOG_FILE").ok().map(std::path::PathBuf::from)
}
