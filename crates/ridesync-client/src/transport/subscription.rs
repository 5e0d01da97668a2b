//! Scoped group of event bindings that forwards parsed payloads.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::manager::ConnectionManager;
use super::registry::HandlerId;

/// Handlers bound on behalf of one owner (a screen, a feed).
///
/// Released by id on [`Subscription::release`] or drop, so a handler
/// another owner bound later under the same name is left alone.
pub struct Subscription {
    connection: ConnectionManager,
    handlers: Vec<(&'static str, HandlerId)>,
}

impl Subscription {
    /// Bind every name in `events`. Each payload goes through `parse`;
    /// `None` results are dropped.
    pub fn forward<T, F>(
        connection: &ConnectionManager,
        events: &[&'static str],
        parse: F,
    ) -> (Self, mpsc::UnboundedReceiver<T>)
    where
        T: Send + 'static,
        F: Fn(&'static str, serde_json::Value) -> Option<T> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let parse = Arc::new(parse);
        let handlers = events
            .iter()
            .map(|&event| {
                let tx = tx.clone();
                let parse = Arc::clone(&parse);
                let id = connection.on(event, move |payload| {
                    if let Some(item) = parse(event, payload) {
                        let _ = tx.send(item);
                    }
                });
                (event, id)
            })
            .collect();

        (
            Self {
                connection: connection.clone(),
                handlers,
            },
            rx,
        )
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn is_active(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Unbind everything this subscription still owns. Idempotent.
    pub fn release(&mut self) {
        for (event, id) in self.handlers.drain(..) {
            if !self.connection.release(event, id) {
                debug!(event, "Binding already gone");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
