//! Signaling stack boundary
//!
//! The call-signaling and media transport live in a wrapped protocol stack,
//! not in this crate. The boundary is message-passing in one direction and a
//! command trait in the other:
//!
//! - the stack posts typed [`SignalingEvent`] values onto an mpsc queue that
//!   [`Endpoint::run`](crate::endpoint::Endpoint::run) consumes, replacing
//!   callback re-entry from the stack's own threads;
//! - the endpoint issues commands (dial, answer, reject, hangup, control
//!   messages) through the [`SignalingDriver`] trait.
//!
//! Tests drive the endpoint with a mock driver and hand-built events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::CallEndReason;
use crate::error::EndpointResult;
use crate::media::{ChannelDirection, ChannelKind, LogicalChannel};

/// Opaque call token assigned by the signaling stack
///
/// The endpoint maps tokens to its own [`CallId`](crate::call::CallId)s; the
/// token never leaks past the endpoint layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalingToken(pub String);

impl std::fmt::Display for SignalingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level sub-cause for a failed or lost connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportFault {
    /// The transport could not establish a connection
    ConnectFailed,
    /// The remote host was unreachable
    HostUnreachable,
    /// An established transport connection was lost
    ConnectionLost,
}

/// Protocol-level cause reported by the stack when a call terminates
///
/// This is the raw taxonomy of the signaling library; the endpoint classifies
/// it into [`CallEndReason`] before anything user-facing sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearCause {
    /// Remote user cleared an established call
    RemoteUser,
    /// Remote caller abandoned the attempt before we answered
    CallerAbort,
    /// Remote party refused the call
    Refusal,
    /// Remote party did not answer within the signaling timeout
    NoAnswer,
    /// Transport failure, with sub-cause
    Transport(TransportFault),
    /// Capability exchange found no common codec
    CapabilityExchange,
    /// Insufficient bandwidth
    NoBandwidth,
    /// The local side denied the answer
    AnswerDenied,
    /// Security/authentication requirements were not met
    SecurityDenial,
    /// The local user cleared the call
    LocalUser,
    /// Anything the stack reports that has no mapping here
    Unknown(String),
}

impl From<&ClearCause> for CallEndReason {
    fn from(cause: &ClearCause) -> Self {
        match cause {
            ClearCause::RemoteUser => CallEndReason::RemoteHangup,
            ClearCause::CallerAbort => CallEndReason::CallerAborted,
            ClearCause::Refusal => CallEndReason::Refused,
            ClearCause::NoAnswer => CallEndReason::NotAnswered,
            ClearCause::Transport(TransportFault::ConnectFailed) => CallEndReason::ConnectFailed,
            ClearCause::Transport(TransportFault::HostUnreachable) => {
                CallEndReason::HostUnreachable
            }
            ClearCause::Transport(TransportFault::ConnectionLost) => CallEndReason::ConnectionLost,
            ClearCause::CapabilityExchange => CallEndReason::CapabilityMismatch,
            ClearCause::NoBandwidth => CallEndReason::InsufficientBandwidth,
            ClearCause::AnswerDenied => CallEndReason::AnswerDenied,
            ClearCause::SecurityDenial => CallEndReason::SecurityDenied,
            ClearCause::LocalUser => CallEndReason::LocalHangup,
            ClearCause::Unknown(_) => CallEndReason::Completed,
        }
    }
}

/// Reason given to the stack when rejecting an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Another call is already tracked
    Busy,
    /// Do-not-disturb is active
    DoNotDisturb,
    /// The user explicitly declined
    Declined,
}

/// Setup optimizations negotiated for an established call
///
/// Logged for diagnostics only; the optimizations themselves happen inside
/// the signaling stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationFlags {
    /// Fast-start was negotiated
    pub fast_start: bool,
    /// H.245 tunneling was negotiated
    pub h245_tunneling: bool,
}

/// An inbound call offer as delivered by the signaling stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallOffer {
    /// Token identifying the call inside the stack
    pub token: SignalingToken,
    /// Remote party URI
    pub remote_uri: String,
    /// Remote display name, if supplied
    pub remote_display_name: Option<String>,
    /// Remote application/user-agent string, if supplied
    pub remote_application: Option<String>,
}

/// Typed event posted by the signaling stack onto the endpoint's queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalingEvent {
    /// A remote party is calling
    IncomingCall {
        /// Details of the offer
        offer: IncomingCallOffer,
    },
    /// A call (inbound or outbound) became established
    CallEstablished {
        /// Stack token of the call
        token: SignalingToken,
        /// Negotiated setup optimizations
        flags: NegotiationFlags,
    },
    /// A call terminated
    CallCleared {
        /// Stack token of the call
        token: SignalingToken,
        /// Protocol-level cause
        cause: ClearCause,
    },
    /// A logical channel opened successfully
    ChannelOpened {
        /// Stack token of the call
        token: SignalingToken,
        /// The opened channel
        channel: LogicalChannel,
    },
    /// A logical channel closed
    ChannelClosed {
        /// Stack token of the call
        token: SignalingToken,
        /// Media kind of the closed channel
        kind: ChannelKind,
        /// Direction of the closed channel
        direction: ChannelDirection,
    },
    /// A capture device failed while opening a transmitted channel
    ChannelDeviceFailed {
        /// Stack token of the call
        token: SignalingToken,
        /// Media kind whose device failed
        kind: ChannelKind,
        /// Stack-reported error text
        error: String,
    },
}

/// Command interface to the signaling stack
///
/// Implementations wrap the native protocol library. All methods are
/// non-blocking from the endpoint's perspective; results of signaling
/// round-trips come back as [`SignalingEvent`]s.
#[async_trait]
pub trait SignalingDriver: Send + Sync {
    /// Start an outbound call attempt to a resolved destination
    async fn dial(&self, destination: &str) -> EndpointResult<SignalingToken>;

    /// Answer a pending inbound call
    async fn answer(&self, token: &SignalingToken) -> EndpointResult<()>;

    /// Reject a pending inbound call
    async fn reject(&self, token: &SignalingToken, reason: RejectReason) -> EndpointResult<()>;

    /// Tear down a call in any non-terminal state
    async fn hangup(&self, token: &SignalingToken) -> EndpointResult<()>;

    /// Send a video quality/tradeoff control message to the peer
    ///
    /// Issued when a received video channel opens and the user has configured
    /// a receive-quality target.
    async fn set_video_tradeoff(&self, token: &SignalingToken, quality: u32)
        -> EndpointResult<()>;

    /// Resolve a dialable destination through the directory
    ///
    /// May be slow or transiently unavailable; callers wrap this in the
    /// bounded retry policy.
    async fn resolve_destination(&self, destination: &str) -> EndpointResult<String>;
}
