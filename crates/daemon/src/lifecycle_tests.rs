// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use unityctl_core::SystemClock;

use super::*;
use crate::identity::ProjectIdentity;

#[test]
fn validate_project_rejects_missing_path() {
    let result = validate_project(Path::new("/does/not/exist/unityctl-test"));
    assert!(matches!(result, Err(StartupError::ProjectNotFound(_))));
}

#[test]
fn validate_project_accepts_existing_directory_with_no_handshake() {
    let dir = tempdir().unwrap();
    let result = validate_project(dir.path());
    assert!(result.is_ok());
}

#[test]
fn write_and_remove_handshake_round_trips() {
    let dir = tempdir().unwrap();
    let project_id = ProjectIdentity::from_path(dir.path());
    write_handshake(dir.path(), &project_id, 4242).unwrap();

    let contents = std::fs::read_to_string(handshake_path(dir.path())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["port"], 4242);
    assert_eq!(value["projectId"], project_id.as_str());

    remove_handshake(dir.path());
    assert!(!handshake_path(dir.path()).exists());
}

#[tokio::test]
async fn shutdown_cancels_token_once_drained() {
    let dir = tempdir().unwrap();
    let handle = Arc::new(BridgeHandle::new(
        ProjectIdentity::from_path(dir.path()),
        SystemClock,
        16,
        4,
    ));
    shutdown(handle.clone()).await;
    assert!(handle.shutdown.is_cancelled());
}
