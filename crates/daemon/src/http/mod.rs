// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP Surface: the `axum::Router` exposing the bridge to CLI/agent clients.
//!
//! One handler function per route, state shared via `State<Arc<BridgeHandle>>`
//! the way this lineage's own listeners share one context struct across every
//! connection. `tower-http`'s `TraceLayer` gives per-request span logging; a
//! `tower::ServiceBuilder` timeout layer backstops any handler that forgets
//! to honor its own command-policy deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{BoxError, Json, Router as AxumRouter};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::bridge::BridgeHandle;
use crate::router::Router;

mod rpc;

pub use rpc::RpcRequest;

/// Upper bound on how long any single HTTP request may run, independent of
/// the per-command completion-policy timeout checked inside `/rpc` itself.
/// Exists purely as a backstop against a handler bug leaving a connection
/// open forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(900);

async fn handle_timeout_error(_err: BoxError) -> StatusCode {
    StatusCode::REQUEST_TIMEOUT
}

pub fn router(handle: Arc<BridgeHandle>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health))
        .route("/rpc", post(rpc::handle_rpc))
        .route("/logs/tail", get(logs_tail))
        .route("/logs/stream", get(logs_stream))
        .route("/console/clear", post(console_clear))
        .route("/peer/connect", get(peer_connect))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::error_handling::HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(handle)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(rename = "projectId")]
    project_id: String,
    #[serde(rename = "unityConnected")]
    unity_connected: bool,
}

async fn health(State(handle): State<Arc<BridgeHandle>>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        project_id: handle.project_id.as_str().to_string(),
        unity_connected: handle.connection.is_connected(),
    })
}

#[derive(Deserialize)]
struct LogsTailQuery {
    #[serde(default = "default_lines")]
    lines: usize,
    #[serde(default = "default_source")]
    source: String,
}

fn default_lines() -> usize {
    100
}

fn default_source() -> String {
    "all".to_string()
}

#[derive(Serialize)]
struct LogsTailBody {
    entries: Vec<crate::logstore::LogEntry>,
}

async fn logs_tail(State(handle): State<Arc<BridgeHandle>>, Query(query): Query<LogsTailQuery>) -> impl IntoResponse {
    let entries = handle.logs.recent(query.lines, &query.source, false);
    Json(LogsTailBody { entries })
}

#[derive(Deserialize)]
struct LogsStreamQuery {
    #[serde(default = "default_source")]
    source: String,
}

async fn logs_stream(
    State(handle): State<Arc<BridgeHandle>>,
    Query(query): Query<LogsStreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let subscription = handle.logs.subscribe();
    let stream = futures_util::stream::unfold((subscription, query.source), |(mut subscription, source)| async move {
        loop {
            let entry = subscription.recv().await?;
            if source != "all" && entry.source != source {
                continue;
            }
            let Ok(json) = serde_json::to_string(&entry) else { continue };
            return Some((Ok(SseEvent::default().data(json)), (subscription, source)));
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Serialize)]
struct ClearBody {
    success: bool,
}

async fn console_clear(State(handle): State<Arc<BridgeHandle>>) -> impl IntoResponse {
    handle.logs.clear();
    Json(ClearBody { success: true })
}

async fn peer_connect(State(handle): State<Arc<BridgeHandle>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let router = Arc::new(Router::new(
            handle.project_id.as_str().to_string(),
            handle.requests.clone(),
            handle.waiters.clone(),
            handle.reload.clone(),
            handle.logs.clone(),
            crate::env::reload_deadline(),
        ));
        handle.connection.run(socket, router, handle.reload.clone(), handle.requests.clone(), handle.waiters.clone()).await;
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
