//! End-to-end lifecycle tests through the signaling event queue
//!
//! These tests drive the endpoint the way the stack does in production: a
//! spawned `run` task consuming an mpsc queue of signaling events, with the
//! queue closing as shutdown.

mod common;

use tokio::sync::mpsc;

use softphone_core::call::{CallDirection, CallEndReason, CallingState, ConnectionState};
use softphone_core::signaling::{ClearCause, NegotiationFlags, SignalingEvent, SignalingToken};

use common::{alice_offer, setup, Command};

#[tokio::test]
async fn outbound_call_driven_through_the_event_queue() {
    let (endpoint, _driver, _) = setup();
    let (tx, rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(endpoint.clone().run(rx));

    let call_id = endpoint.connect("alice").await.unwrap();
    assert_eq!(endpoint.calling_state().await, CallingState::Dialing);

    let token = SignalingToken("out-1".to_string());
    tx.send(SignalingEvent::CallEstablished {
        token: token.clone(),
        flags: NegotiationFlags {
            fast_start: true,
            h245_tunneling: true,
        },
    })
    .unwrap();
    tx.send(SignalingEvent::CallCleared {
        token,
        cause: ClearCause::RemoteUser,
    })
    .unwrap();

    // Closing the queue is shutdown; run drains everything first
    drop(tx);
    run.await.unwrap();

    assert_eq!(endpoint.calling_state().await, CallingState::Idle);
    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.direction, CallDirection::Outgoing);
    assert_eq!(info.state, ConnectionState::Cleared);
    assert_eq!(info.end_reason, Some(CallEndReason::RemoteHangup));
    assert!(info.was_answered());

    let stats = endpoint.stats().await;
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.established_calls, 1);
    assert_eq!(stats.cleared_calls, 1);
}

#[tokio::test]
async fn incoming_call_answered_and_cleared_through_the_queue() {
    let (endpoint, driver, _) = setup();
    let (tx, rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(endpoint.clone().run(rx));

    tx.send(SignalingEvent::IncomingCall {
        offer: alice_offer("in-1"),
    })
    .unwrap();

    // Wait for the offer to land as the pending call
    let pending = loop {
        if let Some(info) = endpoint.active_call().await {
            break info;
        }
        tokio::task::yield_now().await;
    };
    assert_eq!(pending.state, ConnectionState::Pending);

    // The user picks up
    endpoint.connect("").await.unwrap();
    assert_eq!(endpoint.calling_state().await, CallingState::InCall);

    let token = SignalingToken("in-1".to_string());
    tx.send(SignalingEvent::CallEstablished {
        token: token.clone(),
        flags: NegotiationFlags::default(),
    })
    .unwrap();
    tx.send(SignalingEvent::CallCleared {
        token: token.clone(),
        cause: ClearCause::RemoteUser,
    })
    .unwrap();
    drop(tx);
    run.await.unwrap();

    let info = endpoint.get_call(&pending.call_id).await.unwrap();
    assert_eq!(info.state, ConnectionState::Cleared);
    assert!(info.was_answered());
    assert!(driver.commands().contains(&Command::Answer(token)));
}

#[tokio::test]
async fn transport_loss_classifies_the_end_reason() {
    use softphone_core::signaling::TransportFault;

    let (endpoint, _, _) = setup();
    let (tx, rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(endpoint.clone().run(rx));

    let call_id = endpoint.connect("bob").await.unwrap();
    let token = SignalingToken("out-1".to_string());
    tx.send(SignalingEvent::CallEstablished {
        token: token.clone(),
        flags: NegotiationFlags::default(),
    })
    .unwrap();
    tx.send(SignalingEvent::CallCleared {
        token,
        cause: ClearCause::Transport(TransportFault::ConnectionLost),
    })
    .unwrap();
    drop(tx);
    run.await.unwrap();

    let info = endpoint.get_call(&call_id).await.unwrap();
    assert_eq!(info.end_reason, Some(CallEndReason::ConnectionLost));
    assert_eq!(
        info.end_reason_text(),
        "The connection to the remote party was lost"
    );
}
