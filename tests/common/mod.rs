//! Shared fixtures for the integration tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use softphone_core::config::{EndpointConfig, InMemoryConfigStore};
use softphone_core::error::EndpointResult;
use softphone_core::signaling::{IncomingCallOffer, RejectReason, SignalingDriver, SignalingToken};
use softphone_core::Endpoint;

/// Commands recorded by the scripted driver
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Command {
    Dial(String),
    Answer(SignalingToken),
    Reject(SignalingToken, RejectReason),
    Hangup(SignalingToken),
    Tradeoff(SignalingToken, u32),
}

/// Signaling driver that records commands and resolves destinations locally
pub struct ScriptedDriver {
    commands: Mutex<Vec<Command>>,
    dial_counter: AtomicU64,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            dial_counter: AtomicU64::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl SignalingDriver for ScriptedDriver {
    async fn dial(&self, destination: &str) -> EndpointResult<SignalingToken> {
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
        Ok(format!("h323:{}@gatekeeper.example.com", destination))
    }
}

/// Endpoint wired to a scripted driver and an in-memory settings store
pub fn setup() -> (Arc<Endpoint>, Arc<ScriptedDriver>, Arc<InMemoryConfigStore>) {
    // RUST_LOG-controlled output for failing tests; repeated init is a no-op
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryConfigStore::new());
    let driver = ScriptedDriver::new();
    let endpoint = Endpoint::new(EndpointConfig::new(), store.clone(), driver.clone());
    (endpoint, driver, store)
}

/// An inbound offer from Alice
#[allow(dead_code)]
pub fn alice_offer(token: &str) -> IncomingCallOffer {
    IncomingCallOffer {
        token: SignalingToken(token.to_string()),
        remote_uri: "h323:alice@example.com".to_string(),
        remote_display_name: Some("Alice (Example Corp)".to_string()),
        remote_application: None,
    }
}
