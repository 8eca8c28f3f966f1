//! Signaling-event handling for the endpoint
//!
//! Each method here is the consumption side of one [`SignalingEvent`]; the
//! [`run`](super::Endpoint::run) loop dispatches to them, and the test suites
//! call them directly with hand-built events.
//!
//! Failure semantics: nothing in this module aborts a call for a codec or
//! device failure. Device errors degrade to a status message and a
//! placeholder media source; only the signaling stack's cleared event (or an
//! explicit disconnect) ends a call.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallEndReason, CallId, CallingState, ConnectionState};
use crate::config::CallPolicy;
use crate::connection::{AnswerDecision, Connection};
use crate::events::{
    AnswerAction, CallStatusInfo, ClearedCallInfo, EndpointEvent, EndpointEventHandler,
    EventPriority, IncomingCallInfo,
};
use crate::media::{ChannelDirection, ChannelKind, LogicalChannel};
use crate::signaling::{
    ClearCause, IncomingCallOffer, NegotiationFlags, RejectReason, SignalingEvent, SignalingToken,
};

impl super::Endpoint {
    /// Dispatch one signaling event to its handler
    pub(crate) async fn dispatch(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::IncomingCall { offer } => self.on_incoming_call(offer).await,
            SignalingEvent::CallEstablished { token, flags } => {
                self.on_connection_established(&token, flags).await
            }
            SignalingEvent::CallCleared { token, cause } => {
                self.on_connection_cleared(&token, &cause).await
            }
            SignalingEvent::ChannelOpened { token, channel } => {
                self.on_channel_opened(&token, channel).await
            }
            SignalingEvent::ChannelClosed {
                token,
                kind,
                direction,
            } => self.on_channel_closed(&token, kind, direction).await,
            SignalingEvent::ChannelDeviceFailed { token, kind, error } => {
                self.on_channel_device_failed(&token, kind, &error).await
            }
        }
    }

    /// An inbound offer arrived: apply the incoming-call policy
    ///
    /// At most one call is tracked at a time; a second simultaneous offer is
    /// rejected busy. Do-not-disturb denies regardless of auto-answer;
    /// auto-answer answers immediately; otherwise the call stays pending and
    /// the UI prompt decides (or defers to `connect()`/`disconnect()`).
    pub async fn on_incoming_call(&self, offer: IncomingCallOffer) {
        let policy = CallPolicy::from_store(self.store.as_ref());
        let call_id = CallId::new_v4();
        let connection = Arc::new(Connection::new_incoming(
            call_id,
            offer.token.clone(),
            offer.remote_uri.clone(),
            offer.remote_display_name.clone(),
            offer.remote_application.clone(),
            policy,
        ));

        // Busy check and install happen under one lock acquisition. A
        // connect() still resolving its destination holds the Dialing
        // reservation even though current is not yet set.
        let busy = {
            let mut current = self.current.write().await;
            if current.is_some() || *self.calling_state.read().await != CallingState::Idle {
                true
            } else {
                *current = Some(connection.clone());
                false
            }
        };
        if busy {
            info!(remote = %offer.remote_uri, "second simultaneous call offer, rejecting busy");
            if let Err(e) = self.driver.reject(&offer.token, RejectReason::Busy).await {
                warn!(error = %e, "busy rejection failed");
            }
            self.emit_status(format!("Rejected incoming call from {} (busy)", offer.remote_uri))
                .await;
            return;
        }

        self.token_to_call.insert(offer.token.clone(), call_id);
        self.call_to_token.insert(call_id, offer.token.clone());
        self.refresh_info(&connection).await;
        self.stats.lock().await.total_calls += 1;

        match connection.on_answer_call() {
            AnswerDecision::Denied => {
                info!(call_id = %call_id, remote = %offer.remote_uri, "incoming call denied (do not disturb)");
                if let Err(e) = self
                    .driver
                    .reject(&offer.token, RejectReason::DoNotDisturb)
                    .await
                {
                    warn!(error = %e, "do-not-disturb rejection failed");
                }
                self.emit_status(format!(
                    "Incoming call from {} rejected (do not disturb)",
                    offer.remote_uri
                ))
                .await;
                self.finalize_connection(
                    &connection,
                    CallEndReason::AnswerDenied,
                    ConnectionState::Denied,
                )
                .await;
            }
            AnswerDecision::Now => {
                info!(call_id = %call_id, remote = %offer.remote_uri, "auto-answering incoming call");
                match self.accept_pending(connection.clone()).await {
                    Ok(_) => {}
                    Err(e) => {
                        warn!(call_id = %call_id, error = %e, "auto-answer failed");
                        self.emit_status(format!("Could not answer call: {}", e)).await;
                        self.finalize_connection(
                            &connection,
                            CallEndReason::ConnectFailed,
                            ConnectionState::Cleared,
                        )
                        .await;
                    }
                }
            }
            AnswerDecision::Pending => {
                info!(call_id = %call_id, remote = %offer.remote_uri, "incoming call pending user decision");

                let incoming = IncomingCallInfo {
                    call_id,
                    remote_uri: offer.remote_uri.clone(),
                    remote_display_name: offer.remote_display_name.clone(),
                    remote_application: offer.remote_application.clone(),
                    created_at: Utc::now(),
                };
                self.publish(EndpointEvent::IncomingCall {
                    info: incoming.clone(),
                    priority: EventPriority::High,
                });

                if let Some(handler) = self.handler().await {
                    match handler.on_incoming_call(incoming).await {
                        AnswerAction::AnswerNow => {
                            if let Err(e) = self.accept_pending(connection.clone()).await {
                                warn!(call_id = %call_id, error = %e, "answer failed");
                                self.emit_status(format!("Could not answer call: {}", e)).await;
                            }
                        }
                        AnswerAction::Reject => {
                            if let Err(e) = self
                                .driver
                                .reject(connection.token(), RejectReason::Declined)
                                .await
                            {
                                warn!(error = %e, "rejection failed");
                            }
                            self.finalize_connection(
                                &connection,
                                CallEndReason::AnswerDenied,
                                ConnectionState::Denied,
                            )
                            .await;
                        }
                        AnswerAction::Defer => {}
                    }
                }
            }
        }
    }

    /// A call became established
    ///
    /// Records the connection as current, moves the calling state to
    /// `InCall`, and logs the negotiated setup optimizations.
    pub async fn on_connection_established(&self, token: &SignalingToken, flags: NegotiationFlags) {
        let connection = match self.connection_for(token).await {
            Some(connection) => connection,
            None => {
                warn!(token = %token, "established event for unknown call");
                return;
            }
        };
        let call_id = connection.call_id();

        let previous = match connection.transition_to(ConnectionState::Established).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "established event in invalid state");
                return;
            }
        };

        connection
            .set_metadata("fast_start", flags.fast_start.to_string())
            .await;
        connection
            .set_metadata("h245_tunneling", flags.h245_tunneling.to_string())
            .await;

        *self.calling_state.write().await = CallingState::InCall;
        self.stats.lock().await.established_calls += 1;
        self.refresh_info(&connection).await;

        info!(
            call_id = %call_id,
            fast_start = flags.fast_start,
            h245_tunneling = flags.h245_tunneling,
            "connection established"
        );
        self.emit_state_change(CallStatusInfo {
            call_id,
            new_state: ConnectionState::Established,
            previous_state: Some(previous),
            reason: Some("Call established".to_string()),
            timestamp: Utc::now(),
        })
        .await;
    }

    /// A call terminated: classify the cause and finish bookkeeping
    ///
    /// Never-answered incoming calls forward a missed-call event; everything
    /// else forwards a cleared-call event carrying the fixed human-readable
    /// reason.
    pub async fn on_connection_cleared(&self, token: &SignalingToken, cause: &ClearCause) {
        let connection = match self.connection_for(token).await {
            Some(connection) => connection,
            None => {
                // Local teardown may already have finished; the stack's
                // cleared event then refers to a forgotten token.
                debug!(token = %token, "cleared event for unknown call");
                return;
            }
        };

        let reason = CallEndReason::from(cause);
        self.finalize_connection(&connection, reason, ConnectionState::Cleared)
            .await;
    }

    /// A logical channel opened
    ///
    /// Transmitted channels land in the connection's slots; a received video
    /// channel triggers the user's configured quality tradeoff request.
    pub async fn on_channel_opened(&self, token: &SignalingToken, channel: LogicalChannel) {
        let connection = match self.connection_for(token).await {
            Some(connection) => connection,
            None => {
                debug!(token = %token, "channel opened for unknown call");
                return;
            }
        };

        if let Some(quality) = connection.on_start_logical_channel(channel).await {
            if let Err(e) = self.driver.set_video_tradeoff(token, quality).await {
                // Quality request failures never affect the call
                warn!(call_id = %connection.call_id(), error = %e, "video tradeoff request failed");
            }
        }
    }

    /// A logical channel closed; the matching slot becomes invalid now
    pub async fn on_channel_closed(
        &self,
        token: &SignalingToken,
        kind: ChannelKind,
        direction: ChannelDirection,
    ) {
        if let Some(connection) = self.connection_for(token).await {
            connection.on_closed_logical_channel(kind, direction).await;
        }
    }

    /// A capture device failed: degrade, never abort
    pub async fn on_channel_device_failed(
        &self,
        token: &SignalingToken,
        kind: ChannelKind,
        error: &str,
    ) {
        let connection = match self.connection_for(token).await {
            Some(connection) => connection,
            None => return,
        };

        connection.on_device_failure(kind).await;
        self.emit_status(format!(
            "Could not open {} device ({}); the call continues with a placeholder {} source",
            kind, error, kind
        ))
        .await;
    }

    /// Finish bookkeeping for a terminating connection
    ///
    /// Shared by the cleared-event path and the local disconnect/deny paths.
    /// Safe against double invocation: a connection already in a terminal
    /// state is left untouched.
    pub(crate) async fn finalize_connection(
        &self,
        connection: &Arc<Connection>,
        reason: CallEndReason,
        terminal: ConnectionState,
    ) {
        let call_id = connection.call_id();
        let answered = connection.was_answered().await;
        let previous = connection.state().await;

        connection.set_end_reason(reason).await;
        if let Err(e) = connection.transition_to(terminal).await {
            debug!(call_id = %call_id, error = %e, "connection already finalized");
            return;
        }

        {
            let mut current = self.current.write().await;
            if current.as_ref().map(|c| c.call_id()) == Some(call_id) {
                *current = None;
            }
        }
        *self.calling_state.write().await = CallingState::Idle;

        if let Some((_, token)) = self.call_to_token.remove(&call_id) {
            self.token_to_call.remove(&token);
        }
        self.refresh_info(connection).await;

        let info = connection.info().await;
        let cleared = ClearedCallInfo {
            call_id,
            direction: info.direction,
            remote_uri: info.remote_uri.clone(),
            remote_party_name: info.remote_party_name(),
            reason,
            start_time: info.created_at,
            duration: info.duration().unwrap_or_else(chrono::Duration::zero),
            timestamp: info.ended_at.unwrap_or_else(Utc::now),
        };

        self.emit_state_change(CallStatusInfo {
            call_id,
            new_state: terminal,
            previous_state: Some(previous),
            reason: Some(reason.as_text().to_string()),
            timestamp: Utc::now(),
        })
        .await;

        let missed = info.direction == CallDirection::Incoming && !answered;
        {
            let mut stats = self.stats.lock().await;
            if missed {
                stats.missed_calls += 1;
            } else {
                stats.cleared_calls += 1;
            }
        }

        if missed {
            info!(call_id = %call_id, reason = %reason, "missed call");
            self.publish(EndpointEvent::MissedCall {
                info: cleared.clone(),
                priority: EventPriority::Normal,
            });
            if let Some(handler) = self.handler().await {
                handler.on_missed_call(cleared).await;
            }
        } else {
            info!(call_id = %call_id, reason = %reason, "call cleared");
            self.publish(EndpointEvent::CallCleared {
                info: cleared.clone(),
                priority: EventPriority::Normal,
            });
            if let Some(handler) = self.handler().await {
                handler.on_call_cleared(cleared).await;
            }
        }
    }

    /// Publish a state transition and notify the handler
    pub(crate) async fn emit_state_change(&self, info: CallStatusInfo) {
        self.publish(EndpointEvent::CallStateChanged {
            info: info.clone(),
            priority: EventPriority::Normal,
        });
        if let Some(handler) = self.handler().await {
            handler.on_call_state_changed(info).await;
        }
    }

    /// Publish a user-visible status line and notify the handler
    pub(crate) async fn emit_status(&self, message: String) {
        self.publish(EndpointEvent::StatusMessage {
            message: message.clone(),
            priority: EventPriority::Normal,
        });
        if let Some(handler) = self.handler().await {
            handler.on_status_message(message).await;
        }
    }

    /// The registered event handler, if any
    pub(crate) async fn handler(&self) -> Option<Arc<dyn EndpointEventHandler>> {
        self.event_handler.read().await.clone()
    }

    /// The tracked connection matching a signaling token
    async fn connection_for(&self, token: &SignalingToken) -> Option<Arc<Connection>> {
        let call_id = *self.token_to_call.get(token)?;
        let current = self.current.read().await.clone()?;
        if current.call_id() == call_id {
            Some(current)
        } else {
            None
        }
    }
}
