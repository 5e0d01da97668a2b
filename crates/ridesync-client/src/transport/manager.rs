//! Public handle for the ride event channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::connection::{run_connection, LinkContext};
use super::registry::{HandlerId, HandlerRegistry};
use super::types::TransportConfig;
use crate::auth::TokenRefresher;
use crate::protocol::{lifecycle, Envelope};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The live connection, if any.
struct Link {
    outbound: mpsc::Sender<Envelope>,
    state: watch::Receiver<bool>,
}

pub(super) struct Inner {
    pub(super) config: TransportConfig,
    pub(super) registry: HandlerRegistry,
    /// Bumped on every connect/disconnect; background tasks from an older
    /// generation stay silent.
    pub(super) generation: AtomicU64,
    link: Mutex<Option<Link>>,
    refresher: RwLock<Option<Arc<dyn TokenRefresher>>>,
}

impl Inner {
    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn token_refresher(&self) -> Option<Arc<dyn TokenRefresher>> {
        self.refresher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Handle to the single authenticated event channel.
///
/// Cheap to clone; every clone drives the same connection and handler
/// registry. Constructed once at app start and torn down at logout.
#[derive(Clone)]
pub struct ConnectionManager {
    pub(super) inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: HandlerRegistry::default(),
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
                refresher: RwLock::new(None),
            }),
        }
    }

    pub(super) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Install the service used to renew the token after an auth rejection.
    pub fn set_token_refresher(&self, refresher: Arc<dyn TokenRefresher>) {
        *self
            .inner
            .refresher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(refresher);
    }

    /// Open a connection carrying `token`, closing any existing one first.
    ///
    /// Must be called inside a Tokio runtime. Authentication failures are
    /// reported through the `connect_error` event, never returned.
    pub fn connect(&self, token: impl Into<String>) {
        self.open(token.into(), true);
    }

    pub(super) fn open(&self, token: String, may_refresh: bool) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::channel(self.inner.config.outbound_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(false);

        let previous = self.inner.lock_link().replace(Link {
            outbound: outbound_tx,
            state: state_rx,
        });
        if previous.is_some() {
            info!("Closing previous connection before reconnecting");
        }
        // Dropping the old sender makes its task send a close frame and exit.
        drop(previous);

        let ctx = LinkContext {
            config: self.inner.config.clone(),
            registry: self.inner.registry.clone(),
            manager: Arc::downgrade(&self.inner),
            generation,
            token,
            may_refresh,
        };
        tokio::spawn(run_connection(ctx, outbound_rx, state_tx));
    }

    pub(super) fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Publish an event. Dropped silently when the channel is not open.
    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        let link = self.inner.lock_link();
        let Some(link) = link.as_ref() else {
            debug!(event, "Not connected; dropping emit");
            return;
        };
        if !*link.state.borrow() {
            debug!(event, "Connection not open yet; dropping emit");
            return;
        }
        match link.outbound.try_send(Envelope::new(event, payload)) {
            Ok(()) => debug!(event, "Emitted"),
            Err(TrySendError::Full(_)) => warn!(event, "Outbound queue full; dropping emit"),
            Err(TrySendError::Closed(_)) => debug!(event, "Connection closing; dropping emit"),
        }
    }

    /// Bind `handler` to `event`, replacing any handler already bound
    /// under that name.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.inner.registry.bind(event, Arc::new(handler))
    }

    /// Remove whatever handler is bound to `event`.
    pub fn off(&self, event: &str) -> bool {
        self.inner.registry.unbind(event)
    }

    /// Remove the handler for `event` only if `id` still owns it.
    pub fn release(&self, event: &str, id: HandlerId) -> bool {
        self.inner.registry.release(event, id)
    }

    pub fn is_bound(&self, event: &str) -> bool {
        self.inner.registry.is_bound(event)
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .lock_link()
            .as_ref()
            .map(|link| *link.state.borrow())
            .unwrap_or(false)
    }

    /// Wait until the current connection is open. Returns `false` on
    /// timeout or if the connection attempt ends first.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let state = self.inner.lock_link().as_ref().map(|link| link.state.clone());
        let Some(mut state) = state else {
            return false;
        };
        let open = matches!(
            tokio::time::timeout(timeout, state.wait_for(|open| *open)).await,
            Ok(Ok(_))
        );
        open
    }

    /// Close the channel. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.lock_link().take();
        match previous {
            None => debug!("Already disconnected"),
            Some(link) => {
                let was_open = *link.state.borrow();
                drop(link);
                info!("Disconnected");
                if was_open {
                    self.inner.registry.dispatch(
                        lifecycle::DISCONNECT,
                        serde_json::json!({ "reason": "client disconnect" }),
                    );
                }
            }
        }
    }

    /// Feed an inbound event straight into the registry.
    #[cfg(test)]
    pub(crate) fn dispatch_local(&self, event: &str, payload: serde_json::Value) -> bool {
        self.inner.registry.dispatch(event, payload)
    }
}
