//! # softphone-core
//!
//! Call-signaling and connection lifecycle engine for a softphone
//! application. The crate owns everything between the signaling stack below
//! and the user interface above: the process-wide [`Endpoint`] authority, the
//! per-call [`Connection`] state machine, incoming-call policy (auto-answer
//! and do-not-disturb), call-end classification with fixed user-facing
//! strings, and the bounded persistent call-history log.
//!
//! The protocol stack itself is external; it talks to this crate through two
//! seams:
//!
//! - the stack posts [`SignalingEvent`](signaling::SignalingEvent)s onto an
//!   mpsc queue consumed by [`Endpoint::run`];
//! - the endpoint issues commands back through the
//!   [`SignalingDriver`](signaling::SignalingDriver) trait.
//!
//! User-facing notifications leave the crate as events, through a registered
//! [`EndpointEventHandler`](events::EndpointEventHandler) and a broadcast
//! channel that additional observers (such as [`CallHistory`]) subscribe to.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use softphone_core::prelude::*;
//!
//! let store = Arc::new(InMemoryConfigStore::new());
//! let endpoint = Endpoint::new(EndpointConfig::new(), store.clone(), driver);
//!
//! let history = Arc::new(CallHistory::for_endpoint(&endpoint));
//! history.observe(endpoint.subscribe());
//!
//! let (event_tx, event_rx) = mpsc::unbounded_channel();
//! tokio::spawn(endpoint.clone().run(event_rx));
//!
//! endpoint.connect("alice").await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod history;
pub mod media;
pub mod signaling;

pub use call::{CallDirection, CallEndReason, CallId, CallInfo, CallingState, ConnectionState};
pub use connection::Connection;
pub use endpoint::{Endpoint, EndpointStats};
pub use error::{EndpointError, EndpointResult};
pub use history::{CallHistory, HistoryEntry, MAX_HISTORY_ENTRIES};

/// Common imports for applications embedding the core
pub mod prelude {
    //! One-line import surface for embedders

    pub use crate::call::{
        CallDirection, CallEndReason, CallId, CallInfo, CallingState, ConnectionState,
    };
    pub use crate::config::{CallPolicy, ConfigStore, EndpointConfig, InMemoryConfigStore};
    pub use crate::endpoint::{Endpoint, EndpointStats};
    pub use crate::error::{EndpointError, EndpointResult};
    pub use crate::events::{
        AnswerAction, EndpointEvent, EndpointEventHandler, IncomingCallInfo,
    };
    pub use crate::history::{CallHistory, CallType, HistoryEntry, MAX_HISTORY_ENTRIES};
    pub use crate::signaling::{SignalingDriver, SignalingEvent, SignalingToken};
}

/// Crate version, from the package manifest
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
