//! Request/response correlation over the event channel.
//!
//! Emits one request event and waits for the first response event that
//! satisfies a matcher, a timeout, or cancellation, whichever comes
//! first. The response listener is always released afterwards.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ridesync_common::new_correlation_id;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::ConnectionManager;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("request cancelled")]
    Cancelled,

    /// The listener was replaced by another binding before a response came.
    #[error("response listener closed")]
    Closed,
}

/// Issues correlated requests with a shared default timeout.
#[derive(Clone)]
pub struct Correlator {
    connection: ConnectionManager,
    timeout: Duration,
}

impl Correlator {
    pub fn new(connection: ConnectionManager, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Emit `request_event` and wait for a matching `response_event`.
    pub async fn request<M>(
        &self,
        request_event: &str,
        payload: Value,
        response_event: &str,
        matcher: M,
        cancel: &CancellationToken,
    ) -> Result<Value, CorrelationError>
    where
        M: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        request(
            &self.connection,
            request_event,
            payload,
            response_event,
            matcher,
            self.timeout,
            cancel,
        )
        .await
    }
}

pub async fn request<M>(
    connection: &ConnectionManager,
    request_event: &str,
    payload: Value,
    response_event: &str,
    matcher: M,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Value, CorrelationError>
where
    M: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    // Only the handler owns the sender, so replacing the binding closes `rx`.
    let slot = Arc::new(Mutex::new(Some(tx)));
    let id = connection.on(response_event, move |data| {
        if !matcher(&data) {
            return;
        }
        if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(data);
        }
    });

    let request_id = new_correlation_id();
    debug!(%request_id, event = request_event, response = response_event, "Correlated request");
    connection.emit(request_event, payload);

    let outcome = tokio::select! {
        response = rx => response.map_err(|_| CorrelationError::Closed),
        _ = tokio::time::sleep(timeout) => Err(CorrelationError::TimedOut(timeout)),
        _ = cancel.cancelled() => Err(CorrelationError::Cancelled),
    };

    connection.release(response_event, id);
    if let Err(e) = &outcome {
        debug!(
            %request_id,
            event = request_event,
            error = %e,
            "Correlated request finished without response"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;
    use serde_json::json;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(TransportConfig::default())
    }

    fn respond_later(manager: &ConnectionManager, delay: Duration, payload: Value) {
        let manager = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.dispatch_local("pong", payload);
        });
    }

    #[tokio::test]
    async fn resolves_on_first_matching_response() {
        let conn = manager();
        respond_later(&conn, Duration::from_millis(5), json!({ "id": "other" }));
        respond_later(&conn, Duration::from_millis(20), json!({ "id": "d1", "name": "Ana" }));

        let result = request(
            &conn,
            "ping",
            json!({ "id": "d1" }),
            "pong",
            |data| data["id"] == "d1",
            Duration::from_secs(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result["name"], "Ana");
        assert!(!conn.is_bound("pong"));
    }

    #[tokio::test]
    async fn times_out_and_releases_listener() {
        let conn = manager();
        let result = request(
            &conn,
            "ping",
            Value::Null,
            "pong",
            |_| true,
            Duration::from_millis(30),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, Err(CorrelationError::TimedOut(Duration::from_millis(30))));
        assert!(!conn.is_bound("pong"));
    }

    #[tokio::test]
    async fn cancellation_wins_over_timeout() {
        let conn = manager();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = request(
            &conn,
            "ping",
            Value::Null,
            "pong",
            |_| true,
            Duration::from_secs(5),
            &cancel,
        )
        .await;

        assert_eq!(result, Err(CorrelationError::Cancelled));
        assert!(!conn.is_bound("pong"));
    }

    #[tokio::test]
    async fn replaced_listener_reports_closed() {
        let conn = manager();
        let rebinder = conn.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            rebinder.on("pong", |_| {});
        });

        let correlator = Correlator::new(conn.clone(), Duration::from_secs(2));
        let result = correlator
            .request("ping", Value::Null, "pong", |_| true, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(CorrelationError::Closed));
        // The newer binding survives our release.
        assert!(conn.is_bound("pong"));
    }
}
