// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON encoding/decoding of [`Envelope`] frames.

use thiserror::Error;

use crate::frame::Envelope;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("frame missing or has unknown `type` discriminator")]
    UnknownType,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a frame to its wire JSON representation.
pub fn encode(envelope: &Envelope) -> Result<String, WireError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse one wire-format text message into a frame.
///
/// Returns [`WireError::UnknownType`] for a syntactically valid JSON object
/// that lacks a recognized `type` discriminator; callers in the router map
/// this (and any other `WireError`) to the `Malformed` taxonomy kind: log a
/// warning and drop the frame, never tear down the peer connection.
pub fn decode(text: &str) -> Result<Envelope, WireError> {
    serde_json::from_str(text).map_err(|err| {
        if err.is_data() {
            WireError::UnknownType
        } else {
            WireError::Json(err)
        }
    })
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
