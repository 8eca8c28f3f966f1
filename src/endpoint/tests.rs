//! Endpoint unit tests
//!
//! The suites drive the endpoint through its public call operations and the
//! signaling handlers directly, with a mock driver recording every command
//! sent toward the stack.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::call::{CallDirection, CallEndReason, CallingState, ConnectionState};
use crate::config::{keys, ConfigStore, EndpointConfig, InMemoryConfigStore};
use crate::error::{EndpointError, EndpointResult};
use crate::events::{
    AnswerAction, ClearedCallInfo, EndpointEventHandler, IncomingCallInfo,
};
use crate::media::{ChannelDirection, ChannelKind, LogicalChannel, MediaSource};
use crate::signaling::{
    ClearCause, IncomingCallOffer, NegotiationFlags, RejectReason, SignalingDriver,
    SignalingToken, TransportFault,
};

use super::Endpoint;

/// Commands recorded by the mock driver
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Dial(String),
    Answer(SignalingToken),
    Reject(SignalingToken, RejectReason),
    Hangup(SignalingToken),
    Tradeoff(SignalingToken, u32),
}

/// Signaling driver that records commands instead of talking to a stack
struct MockDriver {
    commands: Mutex<Vec<Command>>,
    dial_counter: AtomicU64,
    fail_dial: AtomicBool,
    fail_resolve: AtomicBool,
    /// When set, `resolve_destination` parks on `resolve_gate` after
    /// signaling `resolve_entered`
    gate_resolve: AtomicBool,
    resolve_entered: Notify,
    resolve_gate: Notify,
}

impl MockDriver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            dial_counter: AtomicU64::new(0),
            fail_dial: AtomicBool::new(false),
            fail_resolve: AtomicBool::new(false),
            gate_resolve: AtomicBool::new(false),
            resolve_entered: Notify::new(),
            resolve_gate: Notify::new(),
        })
    }

    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingDriver for MockDriver {
    async fn dial(&self, destination: &str) -> EndpointResult<SignalingToken> {
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(EndpointError::network("stack refused dial"));
        }
        self.record(Command::Dial(destination.to_string()));
        let n = self.dial_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SignalingToken(format!("out-{}", n)))
    }

    async fn answer(&self, token: &SignalingToken) -> EndpointResult<()> {
        self.record(Command::Answer(token.clone()));
        Ok(())
    }

    async fn reject(&self, token: &SignalingToken, reason: RejectReason) -> EndpointResult<()> {
        self.record(Command::Reject(token.clone(), reason));
        Ok(())
    }

    async fn hangup(&self, token: &SignalingToken) -> EndpointResult<()> {
        self.record(Command::Hangup(token.clone()));
        Ok(())
    }

    async fn set_video_tradeoff(
        &self,
        token: &SignalingToken,
        quality: u32,
    ) -> EndpointResult<()> {
        self.record(Command::Tradeoff(token.clone(), quality));
        Ok(())
    }

    async fn resolve_destination(&self, destination: &str) -> EndpointResult<String> {
        if self.fail_resolve.load(Ordering::SeqCst) {
            // Non-recoverable so the tests fail fast instead of sleeping
            // through the directory retry schedule
            return Err(EndpointError::internal("directory offline"));
        }
        if self.gate_resolve.load(Ordering::SeqCst) {
            self.resolve_entered.notify_one();
            self.resolve_gate.notified().await;
        }
        Ok(format!("h323:{}@gatekeeper.example.com", destination))
    }
}

/// Handler recording everything it is told, answering prompts with a fixed
/// action
struct RecordingHandler {
    action: AnswerAction,
    incoming: Mutex<Vec<IncomingCallInfo>>,
    cleared: Mutex<Vec<ClearedCallInfo>>,
    missed: Mutex<Vec<ClearedCallInfo>>,
    statuses: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn new(action: AnswerAction) -> Arc<Self> {
        Arc::new(Self {
            action,
            incoming: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            missed: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EndpointEventHandler for RecordingHandler {
    async fn on_incoming_call(&self, info: IncomingCallInfo) -> AnswerAction {
        self.incoming.lock().unwrap().push(info);
        self.action
    }

    async fn on_call_cleared(&self, info: ClearedCallInfo) {
        self.cleared.lock().unwrap().push(info);
    }

    async fn on_missed_call(&self, info: ClearedCallInfo) {
        self.missed.lock().unwrap().push(info);
    }

    async fn on_status_message(&self, message: String) {
        self.statuses.lock().unwrap().push(message);
    }
}

fn setup() -> (Arc<Endpoint>, Arc<MockDriver>, Arc<InMemoryConfigStore>) {
    // RUST_LOG-controlled output for failing tests; repeated init is a no-op
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryConfigStore::new());
    let driver = MockDriver::new();
    let endpoint = Endpoint::new(EndpointConfig::new(), store.clone(), driver.clone());
    (endpoint, driver, store)
}

fn offer(token: &str, uri: &str) -> IncomingCallOffer {
    IncomingCallOffer {
        token: SignalingToken(token.to_string()),
        remote_uri: uri.to_string(),
        remote_display_name: Some("Alice (Example Corp)".to_string()),
        remote_application: None,
    }
}

#[tokio::test]
async fn outbound_call_full_lifecycle() {
    let (endpoint, driver, _) = setup();

    let call_id = endpoint.connect("alice").await.unwrap();
    assert_eq!(endpoint.calling_state().await, CallingState::Dialing);
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.direction, CallDirection::Outgoing);
    assert_eq!(info.state, ConnectionState::Pending);
    assert_eq!(info.remote_uri, "h323:alice@gatekeeper.example.com");

    let token = SignalingToken("out-1".to_string());
    endpoint
        .on_connection_established(&token, NegotiationFlags::default())
        .await;
    assert_eq!(endpoint.calling_state().await, CallingState::InCall);
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Established);
    assert!(info.connected_at.is_some());

    endpoint
        .on_connection_cleared(&token, &ClearCause::RemoteUser)
        .await;
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
    assert!(endpoint.current_connection().await.is_none());

    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Cleared);
    assert_eq!(info.end_reason, Some(CallEndReason::RemoteHangup));
    assert_eq!(
        info.end_reason_text(),
        "Remote party has cleared the call"
    );

    assert_eq!(driver.commands()[0], Command::Dial("h323:alice@gatekeeper.example.com".to_string()));

    let stats = endpoint.stats().await;
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.established_calls, 1);
    assert_eq!(stats.cleared_calls, 1);
    assert_eq!(stats.missed_calls, 0);
}

#[tokio::test]
async fn connect_rejects_empty_destination() {
    let (endpoint, _, _) = setup();
    let err = endpoint.connect("   ").await;
    assert!(matches!(
        err,
        Err(EndpointError::InvalidConfiguration { .. })
    ));
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
}

#[tokio::test]
async fn connect_refuses_second_call() {
    let (endpoint, _, _) = setup();
    endpoint.connect("alice").await.unwrap();
    let err = endpoint.connect("bob").await;
    assert!(matches!(err, Err(EndpointError::InvalidCallState { .. })));
}

#[tokio::test]
async fn failed_dial_leaves_endpoint_idle() {
    let (endpoint, driver, _) = setup();
    driver.fail_dial.store(true, Ordering::SeqCst);

    let err = endpoint.connect("alice").await;
    assert!(matches!(err, Err(EndpointError::CallSetupFailed { .. })));
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
    assert!(endpoint.current_connection().await.is_none());
    assert!(endpoint.calls().await.is_empty());
}

#[tokio::test]
async fn failed_resolution_is_reported_as_status() {
    let (endpoint, driver, _) = setup();
    driver.fail_resolve.store(true, Ordering::SeqCst);
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    assert!(endpoint.connect("nobody").await.is_err());
    let statuses = handler.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].contains("nobody"));
}

#[tokio::test]
async fn connect_answers_pending_incoming_call() {
    let (endpoint, driver, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
    let pending = endpoint.active_call().await.unwrap();
    assert_eq!(pending.state, ConnectionState::Pending);
    assert_eq!(handler.incoming.lock().unwrap().len(), 1);

    // The destination is ignored while an incoming call is pending
    let call_id = endpoint.connect("whatever").await.unwrap();
    assert_eq!(call_id, pending.call_id);
    assert_eq!(endpoint.calling_state().await, CallingState::InCall);
    assert_eq!(
        endpoint.get_call(&call_id).await.unwrap().state,
        ConnectionState::Answered
    );
    assert!(driver
        .commands()
        .contains(&Command::Answer(SignalingToken("in-1".to_string()))));
}

#[tokio::test]
async fn do_not_disturb_denies_before_auto_answer() {
    let (endpoint, driver, store) = setup();
    store.set_bool(keys::DO_NOT_DISTURB, true);
    store.set_bool(keys::AUTO_ANSWER, true);
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;

    assert!(driver.commands().contains(&Command::Reject(
        SignalingToken("in-1".to_string()),
        RejectReason::DoNotDisturb
    )));
    assert!(endpoint.current_connection().await.is_none());
    // The prompt never fired
    assert!(handler.incoming.lock().unwrap().is_empty());

    // Never answered, so the denial lands in the missed list
    let missed = handler.missed.lock().unwrap().clone();
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].reason, CallEndReason::AnswerDenied);
    assert_eq!(missed[0].remote_party_name, "Alice ");
}

#[tokio::test]
async fn auto_answer_skips_the_prompt() {
    let (endpoint, driver, store) = setup();
    store.set_bool(keys::AUTO_ANSWER, true);
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;

    assert_eq!(endpoint.calling_state().await, CallingState::InCall);
    assert!(driver
        .commands()
        .contains(&Command::Answer(SignalingToken("in-1".to_string()))));
    assert!(handler.incoming.lock().unwrap().is_empty());
}

#[tokio::test]
async fn prompt_answer_now_is_honored() {
    let (endpoint, driver, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::AnswerNow);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;

    assert_eq!(endpoint.calling_state().await, CallingState::InCall);
    assert!(driver
        .commands()
        .contains(&Command::Answer(SignalingToken("in-1".to_string()))));
}

#[tokio::test]
async fn prompt_reject_denies_the_call() {
    let (endpoint, driver, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Reject);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;

    assert!(driver.commands().contains(&Command::Reject(
        SignalingToken("in-1".to_string()),
        RejectReason::Declined
    )));
    assert!(endpoint.current_connection().await.is_none());
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
}

#[tokio::test]
async fn second_simultaneous_call_is_rejected_busy() {
    let (endpoint, driver, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;
    endpoint
        .on_incoming_call(offer("in-2", "h323:bob@example.com"))
        .await;

    assert!(driver.commands().contains(&Command::Reject(
        SignalingToken("in-2".to_string()),
        RejectReason::Busy
    )));
    // The first call is untouched
    let current = endpoint.active_call().await.unwrap();
    assert_eq!(current.remote_uri, "h323:alice@example.com");
    assert_eq!(handler.incoming.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn offer_during_destination_resolution_is_rejected_busy() {
    let (endpoint, driver, _) = setup();
    driver.gate_resolve.store(true, Ordering::SeqCst);
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    // connect() parks inside directory resolution
    let dialing = endpoint.clone();
    let connect_task = tokio::spawn(async move { dialing.connect("alice").await });
    driver.resolve_entered.notified().await;
    assert_eq!(endpoint.calling_state().await, CallingState::Dialing);

    // An offer landing inside the resolution window is busy, not current
    endpoint
        .on_incoming_call(offer("in-1", "h323:bob@example.com"))
        .await;
    assert!(driver.commands().contains(&Command::Reject(
        SignalingToken("in-1".to_string()),
        RejectReason::Busy
    )));
    assert!(endpoint.current_connection().await.is_none());
    assert!(handler.incoming.lock().unwrap().is_empty());

    // Releasing the gate lets the outbound call finish normally
    driver.resolve_gate.notify_one();
    let call_id = connect_task.await.unwrap().unwrap();
    let active = endpoint.active_call().await.unwrap();
    assert_eq!(active.call_id, call_id);
    assert_eq!(active.direction, CallDirection::Outgoing);
}

#[tokio::test]
async fn disconnect_aborts_a_dialing_call() {
    let (endpoint, driver, _) = setup();
    let call_id = endpoint.connect("alice").await.unwrap();

    endpoint.disconnect().await.unwrap();
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Aborted);
    assert_eq!(info.end_reason, Some(CallEndReason::LocalHangup));
    assert!(driver
        .commands()
        .contains(&Command::Hangup(SignalingToken("out-1".to_string()))));
}

#[tokio::test]
async fn disconnect_denies_a_pending_incoming_call() {
    let (endpoint, driver, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;
    let call_id = endpoint.active_call().await.unwrap().call_id;

    endpoint.disconnect().await.unwrap();
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Denied);
    assert!(driver.commands().contains(&Command::Reject(
        SignalingToken("in-1".to_string()),
        RejectReason::Declined
    )));
}

#[tokio::test]
async fn disconnect_without_a_call_is_a_noop() {
    let (endpoint, driver, _) = setup();
    endpoint.disconnect().await.unwrap();
    assert!(driver.commands().is_empty());
}

#[tokio::test]
async fn established_call_hangup_clears() {
    let (endpoint, driver, _) = setup();
    let call_id = endpoint.connect("alice").await.unwrap();
    let token = SignalingToken("out-1".to_string());
    endpoint
        .on_connection_established(&token, NegotiationFlags::default())
        .await;

    endpoint.disconnect().await.unwrap();
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Cleared);
    assert_eq!(info.end_reason, Some(CallEndReason::LocalHangup));
    assert_eq!(info.end_reason_text(), "Local user cleared the call");
    assert!(driver.commands().contains(&Command::Hangup(token)));
}

#[tokio::test]
async fn never_answered_incoming_call_is_missed() {
    let (endpoint, _, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;
    endpoint
        .on_connection_cleared(&SignalingToken("in-1".to_string()), &ClearCause::CallerAbort)
        .await;

    let missed = handler.missed.lock().unwrap().clone();
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].reason, CallEndReason::CallerAborted);
    assert_eq!(missed[0].duration, chrono::Duration::zero());
    assert!(handler.cleared.lock().unwrap().is_empty());
    assert_eq!(endpoint.stats().await.missed_calls, 1);
}

#[tokio::test]
async fn answered_incoming_call_is_not_missed() {
    let (endpoint, _, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::AnswerNow);
    endpoint.set_event_handler(handler.clone()).await;

    let token = SignalingToken("in-1".to_string());
    endpoint
        .on_incoming_call(offer("in-1", "h323:alice@example.com"))
        .await;
    endpoint
        .on_connection_established(&token, NegotiationFlags::default())
        .await;
    endpoint
        .on_connection_cleared(&token, &ClearCause::RemoteUser)
        .await;

    assert!(handler.missed.lock().unwrap().is_empty());
    assert_eq!(handler.cleared.lock().unwrap().len(), 1);
    assert_eq!(endpoint.stats().await.cleared_calls, 1);
}

#[tokio::test]
async fn cleared_event_for_unknown_token_is_ignored() {
    let (endpoint, _, _) = setup();
    endpoint
        .on_connection_cleared(
            &SignalingToken("ghost".to_string()),
            &ClearCause::Transport(TransportFault::ConnectionLost),
        )
        .await;
    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
}

#[tokio::test]
async fn received_video_channel_triggers_tradeoff_command() {
    let (endpoint, driver, store) = setup();
    store.set_int(keys::VIDEO_RECEIVE_QUALITY, 6);

    endpoint.connect("alice").await.unwrap();
    let token = SignalingToken("out-1".to_string());
    endpoint
        .on_connection_established(&token, NegotiationFlags::default())
        .await;
    endpoint
        .on_channel_opened(
            &token,
            LogicalChannel::new(
                ChannelKind::Video,
                ChannelDirection::Receive,
                "H.261",
                MediaSource::Device("remote".into()),
            ),
        )
        .await;

    assert!(driver
        .commands()
        .contains(&Command::Tradeoff(token, 6)));
}

#[tokio::test]
async fn device_failure_degrades_with_status_message() {
    let (endpoint, _, _) = setup();
    let handler = RecordingHandler::new(AnswerAction::Defer);
    endpoint.set_event_handler(handler.clone()).await;

    endpoint.connect("alice").await.unwrap();
    let token = SignalingToken("out-1".to_string());
    endpoint
        .on_connection_established(&token, NegotiationFlags::default())
        .await;
    endpoint
        .on_channel_device_failed(&token, ChannelKind::Video, "no such device")
        .await;

    // The call survives the failure
    assert_eq!(endpoint.calling_state().await, CallingState::InCall);
    let connection = endpoint.current_connection().await.unwrap();
    let channel = connection
        .transmitted_channel(ChannelKind::Video)
        .await
        .unwrap();
    assert_eq!(channel.source, MediaSource::Placeholder);

    let statuses = handler.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].contains("no such device"));
}

#[tokio::test]
async fn negotiation_flags_are_recorded_as_metadata() {
    let (endpoint, _, _) = setup();
    let call_id = endpoint.connect("alice").await.unwrap();
    endpoint
        .on_connection_established(
            &SignalingToken("out-1".to_string()),
            NegotiationFlags {
                fast_start: true,
                h245_tunneling: false,
            },
        )
        .await;

    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.metadata.get("fast_start").map(String::as_str), Some("true"));
    assert_eq!(
        info.metadata.get("h245_tunneling").map(String::as_str),
        Some("false")
    );
}
