//! Process-wide call authority
//!
//! One [`Endpoint`] exists for the lifetime of the application. It is the
//! single authority for "is there a call in progress, and if so, which
//! [`Connection`] represents it": it owns the capability table, the current
//! connection reference, the coarse calling state, and the registry of call
//! projections.
//!
//! Protocol events arrive as [`SignalingEvent`]s on an mpsc queue consumed by
//! [`Endpoint::run`]; user-facing notifications leave through the broadcast
//! channel and the registered [`EndpointEventHandler`]. The current-connection
//! reference is mutated only by the event-consumption path and call
//! operations; readers check for `None` rather than holding locks across
//! calls, tolerating the transient null of the call-cleared window.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use softphone_core::config::{EndpointConfig, InMemoryConfigStore};
//! use softphone_core::endpoint::Endpoint;
//! use softphone_core::signaling::SignalingEvent;
//! # use softphone_core::signaling::{SignalingDriver, SignalingToken, RejectReason};
//! # use softphone_core::error::EndpointResult;
//! # struct StackDriver;
//! # #[async_trait::async_trait]
//! # impl SignalingDriver for StackDriver {
//! #     async fn dial(&self, _: &str) -> EndpointResult<SignalingToken> { unimplemented!() }
//! #     async fn answer(&self, _: &SignalingToken) -> EndpointResult<()> { unimplemented!() }
//! #     async fn reject(&self, _: &SignalingToken, _: RejectReason) -> EndpointResult<()> { unimplemented!() }
//! #     async fn hangup(&self, _: &SignalingToken) -> EndpointResult<()> { unimplemented!() }
//! #     async fn set_video_tradeoff(&self, _: &SignalingToken, _: u32) -> EndpointResult<()> { unimplemented!() }
//! #     async fn resolve_destination(&self, _: &str) -> EndpointResult<String> { unimplemented!() }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryConfigStore::new());
//! let driver = Arc::new(StackDriver);
//! let endpoint = Endpoint::new(EndpointConfig::new(), store, driver);
//!
//! // The signaling stack posts events onto this queue
//! let (event_tx, event_rx) = mpsc::unbounded_channel::<SignalingEvent>();
//! let endpoint_task = tokio::spawn(endpoint.clone().run(event_rx));
//! # drop(event_tx);
//! # let _ = endpoint_task.await;
//! # }
//! ```

pub mod calls;
pub mod events;
pub mod recovery;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::call::{CallId, CallInfo, CallingState};
use crate::config::{ConfigStore, EndpointConfig};
use crate::connection::Connection;
use crate::events::{EndpointEvent, EndpointEventHandler};
use crate::media::Capability;
use crate::signaling::{SignalingDriver, SignalingEvent, SignalingToken};

/// Counters describing the endpoint's activity
#[derive(Debug, Clone, Default)]
pub struct EndpointStats {
    /// Calls handled since construction (both directions)
    pub total_calls: u64,
    /// Calls that reached the established state
    pub established_calls: u64,
    /// Incoming calls that ended without being answered
    pub missed_calls: u64,
    /// Answered calls that have terminated
    pub cleared_calls: u64,
}

/// Process-wide call state authority
///
/// Construct once with [`Endpoint::new`], wire the signaling stack's event
/// queue into [`Endpoint::run`], then drive it with
/// [`connect`](Endpoint::connect) / [`disconnect`](Endpoint::disconnect).
pub struct Endpoint {
    pub(crate) config: EndpointConfig,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) driver: Arc<dyn SignalingDriver>,
    pub(crate) event_handler: Arc<RwLock<Option<Arc<dyn EndpointEventHandler>>>>,
    pub(crate) event_tx: broadcast::Sender<EndpointEvent>,
    pub(crate) calling_state: RwLock<CallingState>,
    /// The single tracked connection; `None` when idle. Readers tolerate a
    /// transient `None` during the call-cleared window.
    pub(crate) current: RwLock<Option<Arc<Connection>>>,
    pub(crate) token_to_call: DashMap<SignalingToken, CallId>,
    pub(crate) call_to_token: DashMap<CallId, SignalingToken>,
    pub(crate) call_info: DashMap<CallId, CallInfo>,
    pub(crate) stats: Mutex<EndpointStats>,
}

impl Endpoint {
    /// Create an endpoint
    ///
    /// `store` is the configuration collaborator the policy flags are read
    /// from; `driver` is the command side of the signaling stack.
    pub fn new(
        config: EndpointConfig,
        store: Arc<dyn ConfigStore>,
        driver: Arc<dyn SignalingDriver>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        info!(
            user_agent = %config.user_agent,
            capabilities = config.capabilities.len(),
            "endpoint created"
        );
        Arc::new(Self {
            config,
            store,
            driver,
            event_handler: Arc::new(RwLock::new(None)),
            event_tx,
            calling_state: RwLock::new(CallingState::Idle),
            current: RwLock::new(None),
            token_to_call: DashMap::new(),
            call_to_token: DashMap::new(),
            call_info: DashMap::new(),
            stats: Mutex::new(EndpointStats::default()),
        })
    }

    /// Register the application-side event handler
    pub async fn set_event_handler(&self, handler: Arc<dyn EndpointEventHandler>) {
        *self.event_handler.write().await = Some(handler);
    }

    /// Subscribe to the endpoint's broadcast events
    ///
    /// This is how the call-history log (and any additional observers)
    /// watch the endpoint.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.event_tx.subscribe()
    }

    /// Current coarse calling state
    pub async fn calling_state(&self) -> CallingState {
        *self.calling_state.read().await
    }

    /// The currently tracked connection, if any
    pub async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.current.read().await.clone()
    }

    /// The ordered capability table this endpoint advertises
    pub fn capabilities(&self) -> &[Capability] {
        &self.config.capabilities
    }

    /// Snapshot of the activity counters
    pub async fn stats(&self) -> EndpointStats {
        self.stats.lock().await.clone()
    }

    /// Consume signaling events until the stack drops its sender
    ///
    /// This is the only task that mutates call state in response to the
    /// stack; shutdown is the queue closing.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SignalingEvent>) {
        info!("endpoint event loop started");
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        info!("signaling event queue closed, endpoint event loop ending");
    }

    /// Publish an event on the broadcast channel
    pub(crate) fn publish(&self, event: EndpointEvent) {
        // No subscribers is fine; the application may not observe events.
        let _ = self.event_tx.send(event);
    }

    /// Store/refresh the registry projection for a connection
    pub(crate) async fn refresh_info(&self, connection: &Connection) {
        let info = connection.info().await;
        debug!(call_id = %info.call_id, state = %info.state, "call info refreshed");
        self.call_info.insert(info.call_id, info);
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("user_agent", &self.config.user_agent)
            .field("tracked_calls", &self.call_info.len())
            .finish()
    }
}
