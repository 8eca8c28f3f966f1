//! Call operations on the endpoint
//!
//! The UI layer drives calls with exactly two verbs:
//!
//! - [`connect`](super::Endpoint::connect) answers a pending incoming call if
//!   one exists, otherwise places an outbound call to the given destination;
//! - [`disconnect`](super::Endpoint::disconnect) aborts a dialing attempt,
//!   tears down the active call, or denies a pending incoming call.
//!
//! Query methods expose the registry of [`CallInfo`] projections.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallEndReason, CallId, CallInfo, CallingState, ConnectionState};
use crate::config::CallPolicy;
use crate::connection::Connection;
use crate::error::{EndpointError, EndpointResult};
use crate::events::CallStatusInfo;
use crate::signaling::RejectReason;

use super::recovery::{retry_with_backoff, RetryConfig};

impl super::Endpoint {
    /// Answer a pending incoming call, or place an outbound call
    ///
    /// When an incoming call is pending, the destination is ignored and the
    /// pending call is answered. Otherwise `destination` must be non-empty;
    /// it is resolved through the directory under the bounded linear retry
    /// schedule, then dialed, and the calling state becomes `Dialing`.
    ///
    /// # Errors
    ///
    /// * [`EndpointError::InvalidCallState`] - a call is already in progress
    /// * [`EndpointError::InvalidConfiguration`] - empty destination
    /// * [`EndpointError::DirectoryLookupFailed`] - resolution failed after
    ///   all retry attempts
    /// * [`EndpointError::CallSetupFailed`] - the stack refused the dial
    pub async fn connect(&self, destination: &str) -> EndpointResult<CallId> {
        let destination = destination.trim();

        // Check and reserve under the current-connection lock. Directory
        // resolution can take the better part of a minute; an offer arriving
        // inside that window must see the endpoint as busy, so the Dialing
        // reservation is taken before the lock is released.
        {
            let guard = self.current.write().await;
            if let Some(connection) = guard.as_ref() {
                let connection = connection.clone();
                drop(guard);
                if connection.direction() == CallDirection::Incoming
                    && connection.state().await == ConnectionState::Pending
                {
                    return self.accept_pending(connection).await;
                }
                return Err(EndpointError::InvalidCallState {
                    expected: "no call, or a pending incoming call".to_string(),
                    actual: connection.state().await.to_string(),
                });
            }
            if destination.is_empty() {
                return Err(EndpointError::InvalidConfiguration {
                    field: "destination".to_string(),
                    reason: "cannot be empty".to_string(),
                });
            }
            *self.calling_state.write().await = CallingState::Dialing;
        }

        let resolved = match retry_with_backoff(
            "resolve_destination",
            RetryConfig::directory(),
            || async { self.driver.resolve_destination(destination).await },
        )
        .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                *self.calling_state.write().await = CallingState::Idle;
                self.emit_status(format!("Could not find {}: {}", destination, e))
                    .await;
                return Err(e);
            }
        };

        let token = match self.driver.dial(&resolved).await {
            Ok(token) => token,
            Err(e) => {
                *self.calling_state.write().await = CallingState::Idle;
                return Err(EndpointError::CallSetupFailed {
                    reason: format!("failed to dial {}: {}", resolved, e),
                });
            }
        };

        let policy = CallPolicy::from_store(self.store.as_ref());
        let call_id = CallId::new_v4();
        let connection = Arc::new(Connection::new_outgoing(
            call_id,
            token.clone(),
            resolved.clone(),
            policy,
        ));

        self.token_to_call.insert(token.clone(), call_id);
        self.call_to_token.insert(call_id, token);
        *self.current.write().await = Some(connection.clone());
        self.refresh_info(&connection).await;
        self.stats.lock().await.total_calls += 1;

        info!(call_id = %call_id, destination = %resolved, "outbound call started");
        self.emit_state_change(CallStatusInfo {
            call_id,
            new_state: ConnectionState::Pending,
            previous_state: None,
            reason: Some("Call created".to_string()),
            timestamp: Utc::now(),
        })
        .await;

        Ok(call_id)
    }

    /// Abort, tear down, or deny the tracked call
    ///
    /// * Dialing: the outbound attempt is aborted (`Aborted`).
    /// * Answered/established: the active call is torn down (`Cleared`).
    /// * Pending incoming: the call is denied (`Denied`).
    ///
    /// A no-op when nothing is tracked or the call already terminated; local
    /// teardown proceeds even when the signaling command fails.
    pub async fn disconnect(&self) -> EndpointResult<()> {
        let connection = match self.current_connection().await {
            Some(connection) => connection,
            None => {
                debug!("disconnect with no call in progress");
                return Ok(());
            }
        };

        let state = connection.state().await;
        match (connection.direction(), state) {
            (CallDirection::Outgoing, ConnectionState::Pending) => {
                info!(call_id = %connection.call_id(), "aborting outbound call attempt");
                if let Err(e) = self.driver.hangup(connection.token()).await {
                    warn!(error = %e, "hangup command failed, finishing local teardown");
                }
                self.finalize_connection(
                    &connection,
                    CallEndReason::LocalHangup,
                    ConnectionState::Aborted,
                )
                .await;
            }
            (CallDirection::Incoming, ConnectionState::Pending) => {
                info!(call_id = %connection.call_id(), "denying pending incoming call");
                if let Err(e) = self
                    .driver
                    .reject(connection.token(), RejectReason::Declined)
                    .await
                {
                    warn!(error = %e, "reject command failed, finishing local teardown");
                }
                self.finalize_connection(
                    &connection,
                    CallEndReason::AnswerDenied,
                    ConnectionState::Denied,
                )
                .await;
            }
            (_, ConnectionState::Answered) | (_, ConnectionState::Established) => {
                info!(call_id = %connection.call_id(), "tearing down active call");
                if let Err(e) = self.driver.hangup(connection.token()).await {
                    warn!(error = %e, "hangup command failed, finishing local teardown");
                }
                self.finalize_connection(
                    &connection,
                    CallEndReason::LocalHangup,
                    ConnectionState::Cleared,
                )
                .await;
            }
            (_, terminal) => {
                debug!(call_id = %connection.call_id(), state = %terminal, "disconnect on terminated call");
            }
        }

        Ok(())
    }

    /// Answer the pending incoming connection
    pub(crate) async fn accept_pending(
        &self,
        connection: Arc<Connection>,
    ) -> EndpointResult<CallId> {
        let call_id = connection.call_id();
        self.driver
            .answer(connection.token())
            .await
            .map_err(|e| EndpointError::CallSetupFailed {
                reason: format!("failed to answer call: {}", e),
            })?;

        let previous = connection.transition_to(ConnectionState::Answered).await?;
        // Leaving the incoming-call prompt lifts any pause left behind
        connection.unpause_channels().await;
        *self.calling_state.write().await = CallingState::InCall;
        self.refresh_info(&connection).await;

        info!(call_id = %call_id, "incoming call answered");
        self.emit_state_change(CallStatusInfo {
            call_id,
            new_state: ConnectionState::Answered,
            previous_state: Some(previous),
            reason: Some("Call answered".to_string()),
            timestamp: Utc::now(),
        })
        .await;

        Ok(call_id)
    }

    /// Projection of one call, live or completed
    pub async fn get_call(&self, call_id: &CallId) -> EndpointResult<CallInfo> {
        self.call_info
            .get(call_id)
            .map(|entry| entry.clone())
            .ok_or(EndpointError::CallNotFound { call_id: *call_id })
    }

    /// Projections of every call seen since construction
    pub async fn calls(&self) -> Vec<CallInfo> {
        self.call_info
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Projection of the tracked call, if any
    pub async fn active_call(&self) -> Option<CallInfo> {
        let connection = self.current_connection().await?;
        Some(connection.info().await)
    }
}
