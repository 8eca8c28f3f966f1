//! Per-call connection bookkeeping
//!
//! A [`Connection`] represents one call attempt from creation to a terminal
//! state. It owns the transmitted-channel slots and pause flags, the policy
//! snapshot that decides incoming-call disposition, and the state machine
//! enforcing `Pending → Answered → Established → Cleared` (with `Denied` and
//! `Aborted` as terminal exits from `Pending`).
//!
//! Channel-open failures are surfaced once and never retried here; the call
//! proceeds degraded with a placeholder source instead.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::call::{CallDirection, CallEndReason, CallId, CallInfo, ConnectionState};
use crate::config::CallPolicy;
use crate::error::{EndpointError, EndpointResult};
use crate::media::{ChannelDirection, ChannelKind, LogicalChannel, MediaSource};
use crate::signaling::SignalingToken;

/// Disposition of an incoming call decided by policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerDecision {
    /// Answer immediately (auto-answer active)
    Now,
    /// Wait for an explicit user decision
    Pending,
    /// Deny immediately (do-not-disturb active)
    Denied,
}

/// Transmitted-channel slots and the open-channel counter
#[derive(Debug, Default)]
struct ChannelSet {
    audio_tx: Option<LogicalChannel>,
    video_tx: Option<LogicalChannel>,
    open_count: u32,
}

impl ChannelSet {
    fn slot_mut(&mut self, kind: ChannelKind) -> &mut Option<LogicalChannel> {
        match kind {
            ChannelKind::Audio => &mut self.audio_tx,
            ChannelKind::Video => &mut self.video_tx,
        }
    }
}

/// One call attempt/session
///
/// Created when a call attempt begins (inbound offer or outbound dial) and
/// dropped after the call clears. Shared between the event-consumption task
/// and readers via `Arc`.
pub struct Connection {
    call_id: CallId,
    token: SignalingToken,
    direction: CallDirection,
    policy: CallPolicy,
    remote_uri: String,
    remote_display_name: Option<String>,
    remote_application: Option<String>,
    created_at: DateTime<Utc>,
    state: RwLock<ConnectionState>,
    connected_at: RwLock<Option<DateTime<Utc>>>,
    ended_at: RwLock<Option<DateTime<Utc>>>,
    end_reason: RwLock<Option<CallEndReason>>,
    channels: Mutex<ChannelSet>,
    metadata: Mutex<HashMap<String, String>>,
}

impl Connection {
    /// Create a connection for an inbound offer
    pub fn new_incoming(
        call_id: CallId,
        token: SignalingToken,
        remote_uri: impl Into<String>,
        remote_display_name: Option<String>,
        remote_application: Option<String>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            call_id,
            token,
            direction: CallDirection::Incoming,
            policy,
            remote_uri: remote_uri.into(),
            remote_display_name,
            remote_application,
            created_at: Utc::now(),
            state: RwLock::new(ConnectionState::Pending),
            connected_at: RwLock::new(None),
            ended_at: RwLock::new(None),
            end_reason: RwLock::new(None),
            channels: Mutex::new(ChannelSet::default()),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Create a connection for an outbound dial
    pub fn new_outgoing(
        call_id: CallId,
        token: SignalingToken,
        remote_uri: impl Into<String>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            call_id,
            token,
            direction: CallDirection::Outgoing,
            policy,
            remote_uri: remote_uri.into(),
            remote_display_name: None,
            remote_application: None,
            created_at: Utc::now(),
            state: RwLock::new(ConnectionState::Pending),
            connected_at: RwLock::new(None),
            ended_at: RwLock::new(None),
            end_reason: RwLock::new(None),
            channels: Mutex::new(ChannelSet::default()),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Identifier of this call
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Signaling-stack token of this call
    pub fn token(&self) -> &SignalingToken {
        &self.token
    }

    /// Direction of this call
    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Policy snapshot taken when this connection was created
    pub fn policy(&self) -> CallPolicy {
        self.policy
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether the call was answered or established at any point
    pub async fn was_answered(&self) -> bool {
        self.connected_at.read().await.is_some()
            || matches!(
                *self.state.read().await,
                ConnectionState::Answered | ConnectionState::Established
            )
    }

    /// Move the state machine to `next`, returning the previous state
    ///
    /// Rejects transitions the lifecycle does not permit; terminal states are
    /// never left.
    pub async fn transition_to(&self, next: ConnectionState) -> EndpointResult<ConnectionState> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(EndpointError::InvalidCallState {
                expected: format!("a state permitting {}", next),
                actual: state.to_string(),
            });
        }
        let previous = *state;
        *state = next;
        debug!(call_id = %self.call_id, from = %previous, to = %next, "connection state transition");

        match next {
            ConnectionState::Established => {
                *self.connected_at.write().await = Some(Utc::now());
            }
            ConnectionState::Cleared | ConnectionState::Denied | ConnectionState::Aborted => {
                *self.ended_at.write().await = Some(Utc::now());
            }
            _ => {}
        }
        Ok(previous)
    }

    /// Record the classified end reason
    pub async fn set_end_reason(&self, reason: CallEndReason) {
        *self.end_reason.write().await = Some(reason);
    }

    /// Attach a metadata key to this call (negotiation flags, codec names)
    pub async fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.lock().await.insert(key.into(), value.into());
    }

    /// Incoming-call disposition under the policy snapshot
    ///
    /// Pure policy: do-not-disturb denies regardless of auto-answer;
    /// auto-answer answers immediately; otherwise the decision is deferred to
    /// an explicit `connect()`/`disconnect()`.
    pub fn on_answer_call(&self) -> AnswerDecision {
        if self.policy.do_not_disturb {
            AnswerDecision::Denied
        } else if self.policy.auto_answer {
            AnswerDecision::Now
        } else {
            AnswerDecision::Pending
        }
    }

    /// A logical channel opened successfully
    ///
    /// Transmitted channels are stored in their kind's slot (at most one per
    /// kind). Returns the receive-quality value to request from the peer when
    /// this is a received video channel and the user configured one.
    pub async fn on_start_logical_channel(&self, channel: LogicalChannel) -> Option<u32> {
        let mut channels = self.channels.lock().await;
        channels.open_count += 1;

        match channel.direction {
            ChannelDirection::Transmit => {
                let slot = channels.slot_mut(channel.kind);
                if slot.is_some() {
                    warn!(
                        call_id = %self.call_id,
                        kind = %channel.kind,
                        "transmitted channel slot already occupied, replacing"
                    );
                }
                debug!(
                    call_id = %self.call_id,
                    kind = %channel.kind,
                    capability = %channel.capability,
                    "transmitted channel opened"
                );
                *slot = Some(channel);
                None
            }
            ChannelDirection::Receive => {
                debug!(
                    call_id = %self.call_id,
                    kind = %channel.kind,
                    capability = %channel.capability,
                    "received channel opened"
                );
                if channel.kind == ChannelKind::Video {
                    self.policy.video_receive_quality
                } else {
                    None
                }
            }
        }
    }

    /// A logical channel closed
    ///
    /// The transmitted slot for that kind becomes invalid exactly now and is
    /// nulled; the open counter decrements.
    pub async fn on_closed_logical_channel(&self, kind: ChannelKind, direction: ChannelDirection) {
        let mut channels = self.channels.lock().await;
        channels.open_count = channels.open_count.saturating_sub(1);
        if direction == ChannelDirection::Transmit {
            *channels.slot_mut(kind) = None;
        }
        debug!(call_id = %self.call_id, kind = %kind, "channel closed");
    }

    /// A capture device failed while opening a transmitted channel
    ///
    /// The call proceeds degraded: the slot's source becomes a placeholder
    /// (the channel is opened with one if it never opened at all). Not
    /// retried; the caller surfaces one status message.
    pub async fn on_device_failure(&self, kind: ChannelKind) {
        let mut channels = self.channels.lock().await;
        if channels.slot_mut(kind).is_none() {
            channels.open_count += 1;
        }
        let slot = channels.slot_mut(kind);
        match slot {
            Some(channel) => channel.source = MediaSource::Placeholder,
            None => {
                *slot = Some(LogicalChannel::new(
                    kind,
                    ChannelDirection::Transmit,
                    "placeholder",
                    MediaSource::Placeholder,
                ));
            }
        }
        warn!(call_id = %self.call_id, kind = %kind, "device failure, substituting placeholder source");
    }

    /// Toggle the pause flag on one transmitted channel
    ///
    /// Returns the new pause state, or `None` (no-op) when that channel was
    /// never opened. Audio and video flags are independent.
    pub async fn pause_channel(&self, kind: ChannelKind) -> Option<bool> {
        let mut channels = self.channels.lock().await;
        let slot = channels.slot_mut(kind);
        match slot {
            Some(channel) => {
                channel.paused = !channel.paused;
                debug!(call_id = %self.call_id, kind = %kind, paused = channel.paused, "channel pause toggled");
                Some(channel.paused)
            }
            None => None,
        }
    }

    /// Clear pause on both transmitted channels unconditionally
    ///
    /// Idempotent; used when leaving an incoming-call prompt.
    pub async fn unpause_channels(&self) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.audio_tx.as_mut() {
            channel.paused = false;
        }
        if let Some(channel) = channels.video_tx.as_mut() {
            channel.paused = false;
        }
    }

    /// Number of currently open logical channels
    pub async fn open_channel_count(&self) -> u32 {
        self.channels.lock().await.open_count
    }

    /// Snapshot of the transmitted channel of a kind, if open
    pub async fn transmitted_channel(&self, kind: ChannelKind) -> Option<LogicalChannel> {
        let mut channels = self.channels.lock().await;
        channels.slot_mut(kind).clone()
    }

    /// Produce the read-only projection of this connection
    pub async fn info(&self) -> CallInfo {
        CallInfo {
            call_id: self.call_id,
            direction: self.direction,
            state: *self.state.read().await,
            remote_uri: self.remote_uri.clone(),
            remote_display_name: self.remote_display_name.clone(),
            remote_application: self.remote_application.clone(),
            created_at: self.created_at,
            connected_at: *self.connected_at.read().await,
            ended_at: *self.ended_at.read().await,
            end_reason: *self.end_reason.read().await,
            metadata: self.metadata.lock().await.clone(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("call_id", &self.call_id)
            .field("token", &self.token)
            .field("direction", &self.direction)
            .field("remote_uri", &self.remote_uri)
            .finish()
    }
}
