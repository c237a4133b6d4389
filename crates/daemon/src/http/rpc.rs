// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::bridge::BridgeHandle;
use crate::error::BridgeError;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub command: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(rename = "agentId", default)]
    pub agent_id: Option<String>,
}

pub async fn handle_rpc(
    State(handle): State<Arc<BridgeHandle>>,
    Json(request): Json<RpcRequest>,
) -> Result<impl IntoResponse, BridgeError> {
    match handle.dispatch(&request.command, request.args, request.agent_id).await {
        Ok(result) => Ok(Json(serde_json::json!({ "status": "ok", "result": result }))),
        Err(BridgeError::PeerError { code, message, details }) => {
            Ok(Json(serde_json::json!({
                "status": "error",
                "error": { "code": code, "message": message, "details": details },
            })))
        }
        Err(other) => Err(other),
    }
}
