//! Event surface of the endpoint
//!
//! The core never touches UI toolkits; everything user-visible leaves the
//! crate as events, with two delivery paths:
//!
//! - a registered [`EndpointEventHandler`] receives each event as an async
//!   call (and answers the incoming-call prompt);
//! - every event is also published as an [`EndpointEvent`] on a broadcast
//!   channel, which is how the call-history log observes the endpoint.
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_core::events::{EndpointEventHandler, IncomingCallInfo, AnswerAction};
//! use async_trait::async_trait;
//!
//! struct PromptingHandler;
//!
//! #[async_trait]
//! impl EndpointEventHandler for PromptingHandler {
//!     async fn on_incoming_call(&self, info: IncomingCallInfo) -> AnswerAction {
//!         println!("Incoming call from {}", info.remote_uri);
//!         // Surface a prompt; the user resolves it later through
//!         // Endpoint::connect() or Endpoint::disconnect().
//!         AnswerAction::Defer
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallDirection, CallEndReason, CallId, ConnectionState};

/// Response to an incoming-call prompt
///
/// Returned by [`EndpointEventHandler::on_incoming_call`] when the policy
/// outcome is pending. `Defer` is the normal choice for interactive UIs: the
/// prompt stays open and the decision arrives later as an explicit
/// `connect()` or `disconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerAction {
    /// Answer the call immediately
    AnswerNow,
    /// Reject the call immediately
    Reject,
    /// Leave the call pending; the user will decide
    Defer,
}

/// Relative priority of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    /// Informational events
    Low,
    /// Regular lifecycle events
    Normal,
    /// Events requiring user attention (incoming call)
    High,
}

/// Details of an incoming call surfaced to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallInfo {
    /// Identifier assigned to the call by the endpoint
    pub call_id: CallId,
    /// Remote party URI
    pub remote_uri: String,
    /// Remote display name, if supplied
    pub remote_display_name: Option<String>,
    /// Remote application string, if supplied
    pub remote_application: Option<String>,
    /// When the offer was received
    pub created_at: DateTime<Utc>,
}

/// Details of a connection state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatusInfo {
    /// Call that changed state
    pub call_id: CallId,
    /// New state after the transition
    pub new_state: ConnectionState,
    /// State before the transition, if known
    pub previous_state: Option<ConnectionState>,
    /// Free-text reason for the change
    pub reason: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Details of a terminated call
///
/// Carries everything the UI needs for its status line and everything the
/// history log needs for its entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedCallInfo {
    /// The terminated call
    pub call_id: CallId,
    /// Direction of the call
    pub direction: CallDirection,
    /// Remote party URI
    pub remote_uri: String,
    /// Remote party name with decorations stripped
    pub remote_party_name: String,
    /// Classified end reason
    pub reason: CallEndReason,
    /// When the call attempt started
    pub start_time: DateTime<Utc>,
    /// Talk time; zero when the call was never established
    pub duration: Duration,
    /// When the call ended
    pub timestamp: DateTime<Utc>,
}

impl ClearedCallInfo {
    /// The fixed human-readable string for the end reason
    pub fn reason_text(&self) -> &'static str {
        self.reason.as_text()
    }
}

/// Event published on the endpoint's broadcast channel
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// A remote party is calling and the decision is pending
    IncomingCall {
        /// Offer details
        info: IncomingCallInfo,
        /// Always high priority
        priority: EventPriority,
    },
    /// A connection changed state
    CallStateChanged {
        /// Transition details
        info: CallStatusInfo,
        /// Event priority
        priority: EventPriority,
    },
    /// An answered call terminated
    CallCleared {
        /// Termination details
        info: ClearedCallInfo,
        /// Event priority
        priority: EventPriority,
    },
    /// An incoming call terminated without ever being answered
    MissedCall {
        /// Termination details
        info: ClearedCallInfo,
        /// Event priority
        priority: EventPriority,
    },
    /// A user-visible status line (device failures, policy rejections)
    StatusMessage {
        /// Message text
        message: String,
        /// Event priority
        priority: EventPriority,
    },
}

/// Application-side handler for endpoint events
///
/// All methods other than the incoming-call prompt default to no-ops so
/// handlers implement only what they display.
#[async_trait]
pub trait EndpointEventHandler: Send + Sync {
    /// An incoming call passed the policy check and awaits a decision
    async fn on_incoming_call(&self, info: IncomingCallInfo) -> AnswerAction;

    /// A connection changed state
    async fn on_call_state_changed(&self, _info: CallStatusInfo) {}

    /// An answered call terminated
    async fn on_call_cleared(&self, _info: ClearedCallInfo) {}

    /// An incoming call was missed (never answered)
    async fn on_missed_call(&self, _info: ClearedCallInfo) {}

    /// A status line should be shown to the user
    async fn on_status_message(&self, _message: String) {}
}
