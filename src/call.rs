//! Call types for the softphone core
//!
//! This module contains the identifier, direction and state types shared by the
//! endpoint and connection layers, the classified call-end reasons with their
//! fixed user-facing strings, and the read-only [`CallInfo`] projection used for
//! display and history logging.
//!
//! # Type Categories
//!
//! - **Identity** - [`CallId`], [`CallDirection`]
//! - **State** - [`CallingState`] (endpoint-wide), [`ConnectionState`] (per call)
//! - **Termination** - [`CallEndReason`] and its human-readable mapping
//! - **Projection** - [`CallInfo`], a snapshot consumed by the UI and the history log

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a call
///
/// Assigned by the endpoint when a call attempt begins (inbound offer or
/// outbound dial) and stable for the lifetime of the call and its history entry.
pub type CallId = uuid::Uuid;

/// Direction of a call relative to this endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Call received from a remote party
    Incoming,
    /// Call placed by this endpoint
    Outgoing,
}

/// Process-wide calling state of the endpoint
///
/// The endpoint tracks at most one call at a time; this enum is the coarse
/// "is there a call in progress" answer the UI binds widget sensitivity to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallingState {
    /// No call in progress
    Idle,
    /// An outbound call attempt is in progress
    Dialing,
    /// A call is established
    InCall,
}

/// State of a single connection (call attempt)
///
/// The lifecycle is `Pending → Answered → Established → Cleared`, with
/// `Denied` and `Aborted` as alternative terminal exits from `Pending`.
/// Terminal states are never left and no state is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created, awaiting an answer decision (inbound) or remote answer (outbound)
    Pending,
    /// Locally answered, media negotiation in progress
    Answered,
    /// Media channels negotiated, call is live
    Established,
    /// Terminated after having been live or answered
    Cleared,
    /// Rejected before being answered (policy or explicit refusal)
    Denied,
    /// Outbound attempt cancelled before the remote answered
    Aborted,
}

impl ConnectionState {
    /// Whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleared | Self::Denied | Self::Aborted)
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Pending, Answered) | (Pending, Established) => true,
            (Pending, Denied) | (Pending, Aborted) | (Pending, Cleared) => true,
            (Answered, Established) | (Answered, Cleared) => true,
            (Established, Cleared) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Answered => "Answered",
            Self::Established => "Established",
            Self::Cleared => "Cleared",
            Self::Denied => "Denied",
            Self::Aborted => "Aborted",
        };
        write!(f, "{}", s)
    }
}

/// Classified reason a call ended
///
/// The signaling stack reports termination with protocol-level causes; the
/// endpoint collapses them into this fixed enumeration, each variant carrying
/// one pre-defined user-facing string. Unknown causes fall back to
/// [`CallEndReason::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEndReason {
    /// The remote party hung up an established call
    RemoteHangup,
    /// The remote caller stopped ringing us before we answered
    CallerAborted,
    /// The remote party refused the call
    Refused,
    /// The remote party did not answer in time
    NotAnswered,
    /// The transport could not connect to the remote host
    ConnectFailed,
    /// The remote host could not be reached
    HostUnreachable,
    /// The transport connection was lost mid-call
    ConnectionLost,
    /// Capability negotiation found no common codec
    CapabilityMismatch,
    /// Insufficient bandwidth for the negotiated media
    InsufficientBandwidth,
    /// The call was denied locally (do-not-disturb or explicit rejection)
    AnswerDenied,
    /// The remote party's security requirements could not be met
    SecurityDenied,
    /// This endpoint hung up
    LocalHangup,
    /// Generic completion, used for unclassified causes
    Completed,
}

impl CallEndReason {
    /// The fixed human-readable string for this reason
    pub fn as_text(&self) -> &'static str {
        match self {
            Self::RemoteHangup => "Remote party has cleared the call",
            Self::CallerAborted => "Remote party has stopped calling",
            Self::Refused => "Remote party did not accept your call",
            Self::NotAnswered => "The call was not answered in the required time",
            Self::ConnectFailed => "Could not connect to remote host",
            Self::HostUnreachable => "Remote host could not be reached",
            Self::ConnectionLost => "The connection to the remote party was lost",
            Self::CapabilityMismatch => "No common codec with remote party",
            Self::InsufficientBandwidth => "Insufficient bandwidth for the call",
            Self::AnswerDenied => "Call rejected",
            Self::SecurityDenied => "Security check failed",
            Self::LocalHangup => "Local user cleared the call",
            Self::Completed => "Call completed",
        }
    }
}

impl std::fmt::Display for CallEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// Truncate a remote-supplied string at the first protocol decoration
///
/// Remote party names and application strings arrive decorated with bracketed
/// version info or an address suffix, e.g. `"Alice (Example Corp)"` or
/// `"bob@example.com"`. Display strips everything from the first `(`, `[` or
/// `@` onward.
pub(crate) fn strip_decorations(s: &str) -> &str {
    match s.find(['(', '[', '@']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// Read-only projection of a call's metadata
///
/// A snapshot of one connection, produced by the endpoint for display, querying
/// and history logging. It carries no live references; derived strings are
/// computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    /// Unique identifier of the call
    pub call_id: CallId,
    /// Direction relative to this endpoint
    pub direction: CallDirection,
    /// Connection state at snapshot time
    pub state: ConnectionState,
    /// Remote party URI as received from signaling
    pub remote_uri: String,
    /// Remote party display name, if the remote supplied one
    pub remote_display_name: Option<String>,
    /// Remote application/user-agent string, if supplied
    pub remote_application: Option<String>,
    /// When the call attempt was created
    pub created_at: DateTime<Utc>,
    /// When the call became established, if it ever did
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call ended, if it has
    pub ended_at: Option<DateTime<Utc>>,
    /// Classified end reason, once the call has ended
    pub end_reason: Option<CallEndReason>,
    /// Additional key-value metadata (negotiation flags, codec names)
    pub metadata: HashMap<String, String>,
}

impl CallInfo {
    /// Remote party name with protocol decorations stripped
    ///
    /// Prefers the display name over the URI. Truncates at the first of
    /// `(`, `[` or `@`.
    pub fn remote_party_name(&self) -> String {
        let raw = self
            .remote_display_name
            .as_deref()
            .unwrap_or(&self.remote_uri);
        strip_decorations(raw).to_string()
    }

    /// Remote application string with protocol decorations stripped
    pub fn remote_application(&self) -> String {
        let raw = self.remote_application.as_deref().unwrap_or("");
        strip_decorations(raw).to_string()
    }

    /// Human-readable end reason, or "Call completed" when unclassified
    pub fn end_reason_text(&self) -> &'static str {
        self.end_reason
            .map(|r| r.as_text())
            .unwrap_or(CallEndReason::Completed.as_text())
    }

    /// Whether the call was ever answered locally or established
    pub fn was_answered(&self) -> bool {
        self.connected_at.is_some()
            || matches!(
                self.state,
                ConnectionState::Answered | ConnectionState::Established
            )
    }

    /// Talk time of the call, `None` until it was both connected and ended
    pub fn duration(&self) -> Option<Duration> {
        match (self.connected_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
