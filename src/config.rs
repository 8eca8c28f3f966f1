//! Configuration collaborator and endpoint settings
//!
//! The durable key-value store the application persists its settings in is
//! external to this crate (a GSettings-like service); the core talks to it
//! through the [`ConfigStore`] trait. An in-memory implementation is provided
//! for tests and embedding.
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_core::config::{ConfigStore, InMemoryConfigStore, CallPolicy, keys};
//!
//! let store = InMemoryConfigStore::new();
//! store.set_bool(keys::AUTO_ANSWER, true);
//!
//! let policy = CallPolicy::from_store(&store);
//! assert!(policy.auto_answer);
//! assert!(!policy.do_not_disturb);
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::media::Capability;

/// Well-known configuration keys consumed by the core
pub mod keys {
    /// Incoming calls are answered immediately when set
    pub const AUTO_ANSWER: &str = "call-options/auto-answer";
    /// Incoming calls are denied immediately when set; takes precedence
    /// over auto-answer
    pub const DO_NOT_DISTURB: &str = "call-options/do-not-disturb";
    /// Requested receive video quality (1-31, lower is better); absent means
    /// no tradeoff request is sent
    pub const VIDEO_RECEIVE_QUALITY: &str = "video-settings/received-quality";
    /// Serialized call-history blob
    pub const CALL_HISTORY: &str = "call-history/entries";
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Boolean flag
    Bool(bool),
    /// Integer setting
    Int(i64),
    /// String setting
    Str(String),
    /// String-list setting
    List(Vec<String>),
}

/// Notification of a configuration key change
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// The key that changed
    pub key: String,
    /// The new value
    pub value: ConfigValue,
}

/// Key-value configuration store the core reads policy from
///
/// The backing technology and key schema beyond [`keys`] are out of scope;
/// the core only requires typed get/set and change notification.
pub trait ConfigStore: Send + Sync {
    /// Read a boolean key
    fn get_bool(&self, key: &str) -> Option<bool>;
    /// Write a boolean key
    fn set_bool(&self, key: &str, value: bool);
    /// Read an integer key
    fn get_int(&self, key: &str) -> Option<i64>;
    /// Write an integer key
    fn set_int(&self, key: &str, value: i64);
    /// Read a string key
    fn get_string(&self, key: &str) -> Option<String>;
    /// Write a string key
    fn set_string(&self, key: &str, value: &str);
    /// Read a string-list key
    fn get_string_list(&self, key: &str) -> Option<Vec<String>>;
    /// Write a string-list key
    fn set_string_list(&self, key: &str, value: Vec<String>);
    /// Subscribe to change notifications for all keys
    ///
    /// Receivers filter on [`ConfigChange::key`].
    fn watch(&self) -> broadcast::Receiver<ConfigChange>;
}

/// In-memory [`ConfigStore`] implementation
///
/// Used by the test suites and by embedders that do not need durability.
pub struct InMemoryConfigStore {
    values: DashMap<String, ConfigValue>,
    change_tx: broadcast::Sender<ConfigChange>,
}

impl InMemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(64);
        Self {
            values: DashMap::new(),
            change_tx,
        }
    }

    fn put(&self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value.clone());
        // No receivers is fine; settings may change before anyone watches.
        let _ = self.change_tx.send(ConfigChange {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key).map(|v| v.clone()) {
            Some(ConfigValue::Bool(b)) => Some(b),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.put(key, ConfigValue::Bool(value));
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key).map(|v| v.clone()) {
            Some(ConfigValue::Int(i)) => Some(i),
            _ => None,
        }
    }

    fn set_int(&self, key: &str, value: i64) {
        self.put(key, ConfigValue::Int(value));
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key).map(|v| v.clone()) {
            Some(ConfigValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        self.put(key, ConfigValue::Str(value.to_string()));
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.values.get(key).map(|v| v.clone()) {
            Some(ConfigValue::List(l)) => Some(l),
            _ => None,
        }
    }

    fn set_string_list(&self, key: &str, value: Vec<String>) {
        self.put(key, ConfigValue::List(value));
    }

    fn watch(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }
}

/// Snapshot of the incoming-call policy flags
///
/// Taken from the configuration store when a connection is created, so one
/// call's answer decision is not affected by settings changed mid-flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallPolicy {
    /// Answer incoming calls immediately
    pub auto_answer: bool,
    /// Deny incoming calls immediately; takes precedence over auto-answer
    pub do_not_disturb: bool,
    /// Receive video quality target, if configured
    pub video_receive_quality: Option<u32>,
}

impl CallPolicy {
    /// Read the current policy flags from a configuration store
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        Self {
            auto_answer: store.get_bool(keys::AUTO_ANSWER).unwrap_or(false),
            do_not_disturb: store.get_bool(keys::DO_NOT_DISTURB).unwrap_or(false),
            video_receive_quality: store
                .get_int(keys::VIDEO_RECEIVE_QUALITY)
                .and_then(|v| u32::try_from(v).ok()),
        }
    }
}

/// Static endpoint configuration
///
/// Identity and capability settings fixed at construction, as opposed to the
/// per-call policy flags read from the [`ConfigStore`].
///
/// # Examples
///
/// ```rust
/// use softphone_core::config::EndpointConfig;
///
/// let config = EndpointConfig::new()
///     .with_display_name("Alice")
///     .with_user_agent("Softphone/1.0")
///     .with_max_history_entries(50);
///
/// assert_eq!(config.display_name, "Alice");
/// assert_eq!(config.max_history_entries, 50);
/// ```
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Local display name sent to remote parties
    pub display_name: String,
    /// Application identification string
    pub user_agent: String,
    /// Ordered capability table advertised during negotiation
    pub capabilities: Vec<Capability>,
    /// Maximum number of retained call-history entries
    pub max_history_entries: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            user_agent: "softphone-core/0.1".to_string(),
            capabilities: Capability::default_set(),
            max_history_entries: crate::history::MAX_HISTORY_ENTRIES,
        }
    }
}

impl EndpointConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the application identification string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Replace the capability table
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Override the call-history retention cap
    pub fn with_max_history_entries(mut self, max: usize) -> Self {
        self.max_history_entries = max;
        self
    }
}
