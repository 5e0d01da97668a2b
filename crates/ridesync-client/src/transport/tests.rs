use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::*;
use crate::api::ApiError;
use crate::auth::TokenRefresher;
use crate::protocol::{lifecycle, Envelope};

const WAIT: Duration = Duration::from_secs(5);

struct Accepted {
    token: Option<String>,
    ws: WebSocketStream<TcpStream>,
}

/// Local server that records the `access_token` header of each upgrade and
/// answers 401 when it equals `reject`.
async fn spawn_server(reject: &'static str) -> (String, mpsc::UnboundedReceiver<Accepted>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen = Arc::new(Mutex::new(None));
            let captured = Arc::clone(&seen);
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let token = req
                    .headers()
                    .get("access_token")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if token.as_deref() == Some(reject) {
                    let mut denied = ErrorResponse::new(Some("unauthorized".into()));
                    *denied.status_mut() = StatusCode::UNAUTHORIZED;
                    return Err(denied);
                }
                *captured.lock().unwrap() = token;
                Ok(resp)
            };
            if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                let token = seen.lock().unwrap().take();
                let _ = tx.send(Accepted { token, ws });
            }
        }
    });

    (format!("ws://{addr}"), rx)
}

fn manager_for(url: &str) -> ConnectionManager {
    ConnectionManager::new(TransportConfig {
        connect_timeout: Duration::from_secs(5),
        ..TransportConfig::new(url)
    })
}

async fn next_envelope(ws: &mut WebSocketStream<TcpStream>) -> Envelope {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_envelope(ws: &mut WebSocketStream<TcpStream>, event: &str, data: serde_json::Value) {
    let json = serde_json::to_string(&Envelope::new(event, data)).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

fn forward_to(
    manager: &ConnectionManager,
    event: &str,
) -> mpsc::UnboundedReceiver<serde_json::Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.on(event, move |payload| {
        let _ = tx.send(payload);
    });
    rx
}

struct FixedRefresher {
    token: Option<&'static str>,
    calls: AtomicUsize,
}

impl FixedRefresher {
    fn new(token: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            token,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TokenRefresher for FixedRefresher {
    async fn refresh(&self) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.map(str::to_string).ok_or(ApiError::Unauthorized)
    }
}

#[tokio::test]
async fn connect_sends_token_and_routes_events_both_ways() {
    let (url, mut accepted) = spawn_server("expired").await;
    let manager = manager_for(&url);
    let mut ride_data = forward_to(&manager, "rideData");

    manager.connect("tok-1");
    let mut conn = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(conn.token.as_deref(), Some("tok-1"));
    assert!(manager.wait_connected(WAIT).await);

    send_envelope(&mut conn.ws, "rideData", json!({ "id": "r1" })).await;
    let payload = timeout(WAIT, ride_data.recv()).await.unwrap().unwrap();
    assert_eq!(payload["id"], "r1");

    manager.emit("subscribeRide", json!("r1"));
    let envelope = next_envelope(&mut conn.ws).await;
    assert_eq!(envelope, Envelope::new("subscribeRide", json!("r1")));

    manager.disconnect();
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn wait_connected_is_false_without_an_open_channel() {
    let manager = manager_for("ws://127.0.0.1:9");
    assert!(!manager.wait_connected(Duration::from_millis(50)).await);

    manager.connect("tok-1");
    assert!(!manager.wait_connected(Duration::from_millis(200)).await);
    manager.disconnect();
}

#[tokio::test]
async fn new_token_replaces_the_connection() {
    let (url, mut accepted) = spawn_server("expired").await;
    let manager = manager_for(&url);

    manager.connect("tok-1");
    let mut first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert!(manager.wait_connected(WAIT).await);

    manager.connect("tok-2");
    let second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(second.token.as_deref(), Some("tok-2"));

    let closed = timeout(WAIT, async {
        loop {
            match first.ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "first connection should be closed");
    assert!(manager.wait_connected(WAIT).await);
    manager.disconnect();
}

#[tokio::test]
async fn auth_rejection_refreshes_once_and_reconnects() {
    let (url, mut accepted) = spawn_server("expired").await;
    let manager = manager_for(&url);
    let refresher = FixedRefresher::new(Some("fresh"));
    manager.set_token_refresher(refresher.clone());
    let mut errors = forward_to(&manager, lifecycle::CONNECT_ERROR);

    manager.connect("expired");

    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(error["status"], 401);

    let conn = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(conn.token.as_deref(), Some("fresh"));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    manager.disconnect();
}

#[tokio::test]
async fn failed_refresh_reports_auth_expired() {
    let (url, _accepted) = spawn_server("expired").await;
    let manager = manager_for(&url);
    let refresher = FixedRefresher::new(None);
    manager.set_token_refresher(refresher.clone());
    let mut expired = forward_to(&manager, lifecycle::AUTH_EXPIRED);

    manager.connect("expired");

    let payload = timeout(WAIT, expired.recv()).await.unwrap().unwrap();
    assert!(payload["message"].is_string());
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn server_sent_connect_error_triggers_refresh() {
    let (url, mut accepted) = spawn_server("never").await;
    let manager = manager_for(&url);
    let refresher = FixedRefresher::new(Some("fresh"));
    manager.set_token_refresher(refresher.clone());

    manager.connect("stale");
    let mut first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    send_envelope(
        &mut first.ws,
        lifecycle::CONNECT_ERROR,
        json!({ "message": "jwt expired" }),
    )
    .await;
    first.ws.close(None).await.unwrap();

    let second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(second.token.as_deref(), Some("fresh"));
    manager.disconnect();
}

#[test]
fn emit_while_disconnected_is_dropped() {
    let manager = ConnectionManager::new(TransportConfig::default());
    manager.emit("subscribeRide", json!("r1"));
    assert!(!manager.is_connected());
}

#[test]
fn disconnect_is_idempotent() {
    let manager = ConnectionManager::new(TransportConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    manager.on(lifecycle::DISCONNECT, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    manager.disconnect();
    manager.disconnect();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn rebinding_an_event_replaces_the_handler() {
    let manager = ConnectionManager::new(TransportConfig::default());
    let hits = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&hits);
    let old = manager.on("rideUpdate", move |_| first.lock().unwrap().push("first"));
    let second = Arc::clone(&hits);
    manager.on("rideUpdate", move |_| second.lock().unwrap().push("second"));

    assert!(manager.dispatch_local("rideUpdate", json!({})));
    assert_eq!(*hits.lock().unwrap(), vec!["second"]);

    // The stale owner cannot remove the newer handler.
    assert!(!manager.release("rideUpdate", old));
    assert!(manager.off("rideUpdate"));
    assert!(!manager.dispatch_local("rideUpdate", json!({})));
}
