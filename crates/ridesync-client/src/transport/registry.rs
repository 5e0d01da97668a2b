//! Named event handler registry with replace-not-stack semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Callback invoked with an event's payload.
pub type EventHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Identifies one registration so its owner can release it without
/// removing a handler someone else bound later under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Slot {
    id: HandlerId,
    handler: EventHandler,
}

/// At most one handler per event name.
#[derive(Clone, Default)]
pub(crate) struct HandlerRegistry {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl HandlerRegistry {
    /// Bind `handler` to `event`, replacing whatever was bound before.
    pub(crate) fn bind(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let previous = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.to_string(), Slot { id, handler });
        if let Some(previous) = previous {
            debug!(event, replaced = previous.id.0, "Handler replaced");
        }
        id
    }

    /// Remove whatever is bound to `event`.
    pub(crate) fn unbind(&self, event: &str) -> bool {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event)
            .is_some()
    }

    /// Remove the binding for `event` only if it is still `id`.
    pub(crate) fn release(&self, event: &str, id: HandlerId) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.get(event) {
            Some(slot) if slot.id == id => {
                slots.remove(event);
                true
            }
            Some(_) => {
                debug!(event, "Handler already replaced; leaving it bound");
                false
            }
            None => false,
        }
    }

    pub(crate) fn is_bound(&self, event: &str) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event)
    }

    /// Invoke the handler bound to `event`. Returns whether one existed.
    ///
    /// The lock is released before the call so handlers may bind or
    /// unbind themselves.
    pub(crate) fn dispatch(&self, event: &str, payload: serde_json::Value) -> bool {
        let handler = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|slot| Arc::clone(&slot.handler));
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => {
                debug!(event, "No handler bound");
                false
            }
        }
    }
}
