//! Call-history log
//!
//! An append-only log of completed calls (missed/placed/received), capped at a
//! fixed retention count with oldest-first eviction, persisted as an opaque
//! serialized blob through the configuration collaborator.
//!
//! The log observes the endpoint's broadcast events: a missed-call event
//! appends a `Missed` entry, a cleared-call event appends `Placed` for
//! outgoing calls and `Received` for incoming ones.
//!
//! # Usage Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use softphone_core::config::InMemoryConfigStore;
//! use softphone_core::history::{CallHistory, CallType, MAX_HISTORY_ENTRIES};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryConfigStore::new());
//! let history = CallHistory::new(store, MAX_HISTORY_ENTRIES);
//!
//! history.add("Alice", "h323:alice@example.com", Utc::now(),
//!             Duration::seconds(90), CallType::Received).await;
//! assert_eq!(history.len().await, 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::call::CallDirection;
use crate::config::{keys, ConfigStore};
use crate::events::EndpointEvent;

/// Maximum number of retained history entries
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Classification of a logged call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    /// Incoming call that was never answered
    Missed,
    /// Outgoing call
    Placed,
    /// Incoming call that was answered
    Received,
}

/// One logged call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Remote party name (decorations already stripped)
    pub name: String,
    /// Remote party URI
    pub uri: String,
    /// When the call started
    pub start_time: DateTime<Utc>,
    /// Talk time in seconds; zero for missed calls
    pub duration_secs: i64,
    /// Call classification
    pub call_type: CallType,
}

impl HistoryEntry {
    /// Talk time as a duration
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }
}

/// Notification emitted by the history log
#[derive(Debug, Clone)]
pub enum HistoryEvent {
    /// An entry was evicted or removed
    EntryRemoved(HistoryEntry),
    /// The log content changed (batched; one per mutation)
    Updated,
}

/// Append-only, capped call log persisted through the configuration store
pub struct CallHistory {
    store: Arc<dyn ConfigStore>,
    max_entries: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
    event_tx: broadcast::Sender<HistoryEvent>,
}

impl CallHistory {
    /// Create a history log backed by `store`
    ///
    /// Loads previously persisted entries; a missing or unreadable blob is
    /// logged and the log starts empty.
    pub fn new(store: Arc<dyn ConfigStore>, max_entries: usize) -> Self {
        let entries = match store.get_string(keys::CALL_HISTORY) {
            Some(blob) => match serde_json::from_str::<Vec<HistoryEntry>>(&blob) {
                Ok(list) => VecDeque::from(list),
                Err(e) => {
                    warn!(error = %e, "unreadable call-history blob, starting empty");
                    VecDeque::new()
                }
            },
            None => VecDeque::new(),
        };
        let (event_tx, _) = broadcast::channel(128);
        Self {
            store,
            max_entries,
            entries: RwLock::new(entries),
            event_tx,
        }
    }

    /// Create a history log sized and backed per an endpoint's configuration
    ///
    /// Shares the endpoint's configuration store and honors its
    /// `max_history_entries` override.
    pub fn for_endpoint(endpoint: &crate::endpoint::Endpoint) -> Self {
        Self::new(
            Arc::clone(&endpoint.store),
            endpoint.config.max_history_entries,
        )
    }

    /// Subscribe to history notifications
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.event_tx.subscribe()
    }

    /// Append a call to the log
    ///
    /// An empty `uri` means there is nothing to log; the call is silently
    /// dropped. After every append the retention cap is enforced by evicting
    /// oldest entries first, then the log persists once and emits one
    /// `Updated` notification.
    pub async fn add(
        &self,
        name: impl Into<String>,
        uri: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
        call_type: CallType,
    ) {
        let uri = uri.into();
        if uri.is_empty() {
            debug!("empty uri, nothing to log");
            return;
        }

        let entry = HistoryEntry {
            name: name.into(),
            uri,
            start_time,
            duration_secs: duration.num_seconds(),
            call_type,
        };

        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.push_back(entry);
            while entries.len() > self.max_entries {
                if let Some(evicted) = entries.pop_front() {
                    let _ = self.event_tx.send(HistoryEvent::EntryRemoved(evicted));
                }
            }
            entries.iter().cloned().collect::<Vec<_>>()
        };

        self.persist(&snapshot);
        let _ = self.event_tx.send(HistoryEvent::Updated);
    }

    /// Remove all entries
    ///
    /// Emits one removal notification per entry, then one `Updated`, then
    /// persists the fresh empty log.
    pub async fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write().await;
            std::mem::take(&mut *entries)
        };
        for entry in removed {
            let _ = self.event_tx.send(HistoryEvent::EntryRemoved(entry));
        }
        let _ = self.event_tx.send(HistoryEvent::Updated);
        self.persist(&[]);
    }

    /// Entries in insertion order (oldest first)
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Number of retained entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn persist(&self, entries: &[HistoryEntry]) {
        match serde_json::to_string(entries) {
            Ok(blob) => self.store.set_string(keys::CALL_HISTORY, &blob),
            Err(e) => warn!(error = %e, "failed to serialize call history"),
        }
    }

    /// Observe an endpoint's broadcast events and log terminated calls
    ///
    /// Missed calls log as `Missed`; cleared calls log as `Placed` when
    /// outgoing and `Received` when incoming. The task ends when the endpoint
    /// drops its event channel.
    pub fn observe(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<EndpointEvent>,
    ) -> JoinHandle<()> {
        let history = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EndpointEvent::MissedCall { info, .. }) => {
                        history
                            .add(
                                info.remote_party_name.clone(),
                                info.remote_uri.clone(),
                                info.start_time,
                                Duration::zero(),
                                CallType::Missed,
                            )
                            .await;
                    }
                    Ok(EndpointEvent::CallCleared { info, .. }) => {
                        let call_type = match info.direction {
                            CallDirection::Outgoing => CallType::Placed,
                            CallDirection::Incoming => CallType::Received,
                        };
                        history
                            .add(
                                info.remote_party_name.clone(),
                                info.remote_uri.clone(),
                                info.start_time,
                                info.duration,
                                call_type,
                            )
                            .await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "history observer lagged behind endpoint events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
