//! Background task owning one physical WebSocket connection.

use std::sync::atomic::Ordering;
use std::sync::Weak;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use super::manager::{ConnectionManager, Inner};
use super::registry::HandlerRegistry;
use super::types::TransportConfig;
use crate::protocol::{lifecycle, Envelope};

/// Everything a connection task needs, detached from the manager.
pub(super) struct LinkContext {
    pub(super) config: TransportConfig,
    pub(super) registry: HandlerRegistry,
    pub(super) manager: Weak<Inner>,
    pub(super) generation: u64,
    pub(super) token: String,
    /// Whether an auth rejection may trigger a token refresh.
    pub(super) may_refresh: bool,
}

impl LinkContext {
    fn is_current(&self) -> bool {
        self.manager
            .upgrade()
            .is_some_and(|inner| inner.generation.load(Ordering::SeqCst) == self.generation)
    }

    fn dispatch(&self, event: &str, payload: serde_json::Value) {
        if self.is_current() {
            self.registry.dispatch(event, payload);
        } else {
            debug!(event, "Superseded connection; not dispatching");
        }
    }

    /// Refresh the token out of band and reconnect with it.
    fn handle_auth_failure(&self) {
        if !self.is_current() {
            return;
        }
        if !self.may_refresh {
            warn!("Refreshed token was rejected too; giving up");
            self.dispatch(
                lifecycle::AUTH_EXPIRED,
                json!({ "message": "refreshed token rejected" }),
            );
            return;
        }
        let Some(inner) = self.manager.upgrade() else {
            return;
        };
        let Some(refresher) = inner.token_refresher() else {
            warn!("Auth rejected and no token refresher configured");
            return;
        };
        let manager = ConnectionManager::from_inner(inner);
        let generation = self.generation;

        tokio::spawn(async move {
            match refresher.refresh().await {
                Ok(token) => {
                    if manager.current_generation() == generation {
                        info!("Token refreshed; reconnecting");
                        manager.open(token, false);
                    } else {
                        debug!("Connection replaced during refresh; discarding token");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed");
                    if manager.current_generation() == generation {
                        manager
                            .inner
                            .registry
                            .dispatch(lifecycle::AUTH_EXPIRED, json!({ "message": e.to_string() }));
                    }
                }
            }
        });
    }
}

fn build_request(config: &TransportConfig, token: &str) -> Result<Request, String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("invalid url: {e}"))?;
    let name = HeaderName::from_bytes(config.auth_header.as_bytes())
        .map_err(|e| format!("invalid auth header name: {e}"))?;
    let value = HeaderValue::from_str(&config.auth_value(token))
        .map_err(|e| format!("invalid token: {e}"))?;
    request.headers_mut().insert(name, value);
    Ok(request)
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Connect, then pump frames until either side closes.
///
/// The manager closes the connection by dropping the outbound sender.
pub(super) async fn run_connection(
    ctx: LinkContext,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    state_tx: watch::Sender<bool>,
) {
    let request = match build_request(&ctx.config, &ctx.token) {
        Ok(request) => request,
        Err(message) => {
            error!(%message, "Cannot build connection request");
            ctx.dispatch(lifecycle::CONNECT_ERROR, json!({ "message": message }));
            return;
        }
    };

    info!(
        url = %ctx.config.url.split('?').next().unwrap_or(""),
        "Connecting to ride event server"
    );

    let ws_stream = match tokio::time::timeout(
        ctx.config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(WsError::Http(response))) if is_auth_rejection(response.status()) => {
            warn!(status = %response.status(), "Connection rejected as unauthorized");
            ctx.dispatch(
                lifecycle::CONNECT_ERROR,
                json!({ "message": "unauthorized", "status": response.status().as_u16() }),
            );
            ctx.handle_auth_failure();
            return;
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to ride event server");
            ctx.dispatch(
                lifecycle::CONNECT_ERROR,
                json!({ "message": format!("connection failed: {e}") }),
            );
            return;
        }
        Err(_elapsed) => {
            error!(
                timeout_secs = ctx.config.connect_timeout.as_secs(),
                "Connection attempt timed out"
            );
            ctx.dispatch(
                lifecycle::CONNECT_ERROR,
                json!({ "message": "connection timed out" }),
            );
            return;
        }
    };

    if !ctx.is_current() {
        debug!("Superseded before the handshake finished");
        return;
    }

    state_tx.send_replace(true);
    info!("Connected to ride event server");
    ctx.dispatch(lifecycle::CONNECT, serde_json::Value::Null);

    let (mut sink, mut stream) = ws_stream.split();
    let mut auth_rejected = false;

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
                            warn!(error = %e, event = %envelope.event, "Send failed");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, event = %envelope.event, "Cannot encode payload"),
                },
                None => {
                    debug!("Closing connection");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => {
                        if envelope.event == lifecycle::CONNECT_ERROR {
                            auth_rejected = true;
                        }
                        ctx.dispatch(&envelope.event, envelope.data);
                    }
                    Err(_) => debug!(text = %text, "Unrecognized frame"),
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Server closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state_tx.send_replace(false);
    ctx.dispatch(lifecycle::DISCONNECT, serde_json::Value::Null);
    if auth_rejected {
        ctx.handle_auth_failure();
    }
}
