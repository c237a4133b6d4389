// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios for the bridge daemon: a real `axum` listener on a
//! loopback port, driven over HTTP by `reqwest` and stood in for the editor
//! by a `tokio-tungstenite` client acting as the one peer connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serial_test::serial;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use unityctl_core::SystemClock;
use unityctl_daemon::bridge::BridgeHandle;
use unityctl_daemon::identity::ProjectIdentity;
use unityctl_daemon::http;
use unityctl_wire::{decode, encode, Envelope, Event, Origin, Request, Response, ResponseStatus};

type PeerSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type PeerStream =
    futures_util::stream::SplitStream<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>;

/// Boots a daemon on an ephemeral loopback port and returns its base URL
/// together with the shared handle, for assertions the HTTP surface itself
/// doesn't expose.
async fn spawn_daemon() -> (String, Arc<BridgeHandle>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let handle = Arc::new(BridgeHandle::new(ProjectIdentity::from_path(Path::new("/tmp/unityctl-specs")), SystemClock, 256, 32));
    let _deadline_watcher = handle.reload.spawn_deadline_watcher(handle.requests.clone(), handle.waiters.clone());

    let app = http::router(handle.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), handle)
}

/// Connects a fake editor peer to the daemon's WebSocket endpoint.
async fn connect_peer(base_url: &str) -> (PeerSink, PeerStream) {
    let ws_url = format!("ws{}/peer/connect", base_url.trim_start_matches("http"));
    let (stream, _response) = tokio_tungstenite::connect_async(ws_url).await.expect("connect to peer endpoint");
    stream.split()
}

async fn next_request(stream: &mut PeerStream) -> Request {
    loop {
        match stream.next().await.expect("stream open").expect("no transport error") {
            Message::Text(text) => {
                if let Envelope::Request(request) = decode(&text).expect("valid frame") {
                    return request;
                }
            }
            _ => continue,
        }
    }
}

async fn send_ok_response(sink: &mut PeerSink, request_id: &str, result: serde_json::Value) {
    let frame = Envelope::Response(Response {
        origin: Origin::Peer,
        request_id: request_id.to_string(),
        status: ResponseStatus::Ok,
        result: Some(result),
        error: None,
    });
    sink.send(Message::Text(encode(&frame).expect("encode response"))).await.expect("send response");
}

async fn send_event(sink: &mut PeerSink, event: &str, payload: serde_json::Value) {
    let frame = Envelope::Event(Event { origin: Origin::Peer, event: event.to_string(), payload });
    sink.send(Message::Text(encode(&frame).expect("encode event"))).await.expect("send event");
}

#[tokio::test]
async fn immediate_command_round_trips_through_the_peer() {
    let (base_url, _handle) = spawn_daemon().await;
    let (mut sink, mut stream) = connect_peer(&base_url).await;

    let client = reqwest::Client::new();
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move {
            client
                .post(format!("{base_url}/rpc"))
                .json(&serde_json::json!({ "command": "play.status" }))
                .send()
                .await
                .expect("rpc request")
                .json::<serde_json::Value>()
                .await
                .expect("rpc response body")
        }
    });

    let request = next_request(&mut stream).await;
    assert_eq!(request.command, "play.status");
    send_ok_response(&mut sink, &request.request_id, serde_json::json!({ "state": "stopped" })).await;

    let body = rpc.await.expect("rpc task");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["result"]["state"], "stopped");
}

#[tokio::test]
async fn event_gated_command_waits_for_the_terminal_event() {
    let (base_url, _handle) = spawn_daemon().await;
    let (mut sink, mut stream) = connect_peer(&base_url).await;

    let client = reqwest::Client::new();
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move {
            client
                .post(format!("{base_url}/rpc"))
                .json(&serde_json::json!({ "command": "play.enter" }))
                .send()
                .await
                .expect("rpc request")
                .json::<serde_json::Value>()
                .await
                .expect("rpc response body")
        }
    });

    let request = next_request(&mut stream).await;
    assert_eq!(request.command, "play.enter");
    send_ok_response(&mut sink, &request.request_id, serde_json::json!({ "state": "transitioning" })).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_event(&mut sink, "playModeChanged", serde_json::json!({ "state": "EnteredPlayMode" })).await;

    let body = rpc.await.expect("rpc task");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["result"]["state"], "EnteredPlayMode");
}

#[tokio::test]
#[serial]
async fn command_deadline_exceeded_without_peer_response_surfaces_as_504() {
    std::env::set_var("UNITYCTL_TIMEOUT_ASSET_REFRESH", "1");
    let (base_url, _handle) = spawn_daemon().await;
    let (_sink, mut stream) = connect_peer(&base_url).await;

    let client = reqwest::Client::new();
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move { client.post(format!("{base_url}/rpc")).json(&serde_json::json!({ "command": "asset.refresh" })).send().await }
    });

    // Peer receives the request but deliberately never answers it.
    let _request = next_request(&mut stream).await;

    let response = rpc.await.expect("rpc task").expect("http roundtrip");
    assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    std::env::remove_var("UNITYCTL_TIMEOUT_ASSET_REFRESH");
}

#[tokio::test]
#[serial]
async fn dispatch_with_no_peer_connected_surfaces_as_503() {
    // `wait_for_peer` gives a late-arriving editor the whole command deadline
    // to show up before giving up; shrink it so the test doesn't block on
    // the real 60s default.
    std::env::set_var("UNITYCTL_TIMEOUT_ASSET_REFRESH", "1");
    let (base_url, _handle) = spawn_daemon().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/rpc"))
        .json(&serde_json::json!({ "command": "asset.refresh" }))
        .send()
        .await
        .expect("rpc request");
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    std::env::remove_var("UNITYCTL_TIMEOUT_ASSET_REFRESH");
}

#[tokio::test]
#[serial]
async fn reload_survives_a_disconnect_within_the_grace_period() {
    std::env::set_var("UNITYCTL_RELOAD_DEADLINE_MS", "5000");
    let (base_url, handle) = spawn_daemon().await;
    let (mut sink, mut stream) = connect_peer(&base_url).await;

    let client = reqwest::Client::new();
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move {
            client
                .post(format!("{base_url}/rpc"))
                .json(&serde_json::json!({ "command": "compile.scripts" }))
                .send()
                .await
                .expect("rpc request")
                .json::<serde_json::Value>()
                .await
                .expect("rpc response body")
        }
    });

    let request = next_request(&mut stream).await;
    send_ok_response(&mut sink, &request.request_id, serde_json::Value::Null).await;
    send_event(&mut sink, "reload_starting", serde_json::json!({})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.reload.is_reloading());

    // Drop the peer connection; a fresh one reconnects before the deadline.
    drop(sink);
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut sink2, _stream2) = connect_peer(&base_url).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.reload.is_reloading());
    send_event(&mut sink2, "compilation.finished", serde_json::json!({ "success": true })).await;

    let body = rpc.await.expect("rpc task");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["result"]["success"], true);
    std::env::remove_var("UNITYCTL_RELOAD_DEADLINE_MS");
}

#[tokio::test]
#[serial]
async fn reload_deadline_breach_cancels_outstanding_work() {
    std::env::set_var("UNITYCTL_RELOAD_DEADLINE_MS", "200");
    let (base_url, handle) = spawn_daemon().await;
    let (mut sink, mut stream) = connect_peer(&base_url).await;

    let client = reqwest::Client::new();
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move { client.post(format!("{base_url}/rpc")).json(&serde_json::json!({ "command": "compile.scripts" })).send().await }
    });

    let request = next_request(&mut stream).await;
    send_ok_response(&mut sink, &request.request_id, serde_json::Value::Null).await;
    send_event(&mut sink, "reload_starting", serde_json::json!({})).await;
    drop(sink);
    drop(stream);

    // Peer never reconnects; the deadline watcher must cancel the waiter.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!handle.reload.is_reloading());

    let response = rpc.await.expect("rpc task").expect("http roundtrip");
    assert_eq!(response.status(), reqwest::StatusCode::from_u16(499).expect("valid status"));
    std::env::remove_var("UNITYCTL_RELOAD_DEADLINE_MS");
}

#[tokio::test]
async fn client_disconnect_removes_the_request_slot() {
    let (base_url, handle) = spawn_daemon().await;
    let (_sink, mut stream) = connect_peer(&base_url).await;

    // A client with a timeout far shorter than the command's own deadline;
    // reqwest aborts the underlying connection when it fires, which is what
    // tears down the in-flight request on the server side.
    let client = reqwest::Client::builder().timeout(Duration::from_millis(100)).build().expect("client");
    let rpc = tokio::spawn({
        let base_url = base_url.clone();
        async move { client.post(format!("{base_url}/rpc")).json(&serde_json::json!({ "command": "test.run" })).send().await }
    });

    // The peer sees the request but never answers, standing in for a
    // long-running command the caller gives up on waiting for.
    let _request = next_request(&mut stream).await;
    assert!(rpc.await.expect("rpc task").is_err(), "the client-side timeout should abort the connection");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.requests.pending_count(), 0);
    assert_eq!(handle.waiters.pending_count(), 0);
}

#[tokio::test]
async fn log_tail_and_clear_semantics() {
    let (base_url, handle) = spawn_daemon().await;

    for i in 0..5 {
        handle.logs.append("console", "info", format!("line {i}"), None, None);
    }

    let client = reqwest::Client::new();
    let clear = client.post(format!("{base_url}/console/clear")).send().await.expect("clear request");
    assert_eq!(clear.status(), reqwest::StatusCode::OK);

    for i in 5..8 {
        handle.logs.append("console", "info", format!("line {i}"), None, None);
    }

    let tail: serde_json::Value =
        client.get(format!("{base_url}/logs/tail?lines=0&source=all")).send().await.expect("tail request").json().await.expect("tail body");
    assert_eq!(tail["entries"].as_array().expect("entries array").len(), 3);

    // The HTTP surface only exposes the default (post-watermark) view; the
    // include-cleared variant is exercised directly against the store.
    assert_eq!(handle.logs.recent(0, "all", true).len(), 8);
}

#[tokio::test]
async fn health_reports_project_identity_and_peer_presence() {
    let (base_url, handle) = spawn_daemon().await;
    let client = reqwest::Client::new();

    let before: serde_json::Value = client.get(format!("{base_url}/health")).send().await.expect("health request").json().await.expect("health body");
    assert_eq!(before["unityConnected"], false);
    assert_eq!(before["projectId"], handle.project_id.as_str());

    let (_sink, _stream) = connect_peer(&base_url).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after: serde_json::Value = client.get(format!("{base_url}/health")).send().await.expect("health request").json().await.expect("health body");
    assert_eq!(after["unityConnected"], true);
}
