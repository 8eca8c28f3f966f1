//! Error types for the softphone core
//!
//! All fallible operations in this crate return [`EndpointResult`]. The error
//! taxonomy mirrors the failure model of the call engine: policy rejections and
//! device failures are expected, recoverable outcomes; contract violations are
//! typed errors that short-circuit safely instead of panicking.

use thiserror::Error;

use crate::call::CallId;

/// Result type for endpoint operations
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Errors that can occur in the call engine
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    /// No call exists with the given identifier
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// The call exists but is not in a state that permits the operation
    #[error("Invalid call state: expected {expected}, call is {actual}")]
    InvalidCallState { expected: String, actual: String },

    /// An outbound call could not be set up
    #[error("Call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    /// Incoming call rejected by local policy (do-not-disturb, busy)
    #[error("Call rejected by policy: {reason}")]
    PolicyRejection { reason: String },

    /// Network-level failure talking to the signaling stack
    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    /// Directory lookup or destination resolution failed
    #[error("Directory lookup failed for {destination}: {reason}")]
    DirectoryLookupFailed { destination: String, reason: String },

    /// A media device could not be opened or configured
    #[error("Media device error: {reason}")]
    MediaDeviceError { reason: String },

    /// Configuration error
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl EndpointError {
    /// Create a call setup error
    pub fn call_setup(reason: impl Into<String>) -> Self {
        Self::CallSetupFailed {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
        }
    }

    /// Create a media device error
    pub fn media_device(reason: impl Into<String>) -> Self {
        Self::MediaDeviceError {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether a retry of the failed operation may succeed
    ///
    /// Used by [`retry_with_backoff`](crate::endpoint::recovery::retry_with_backoff)
    /// to decide between retrying and failing fast. Only transport-level failures
    /// are retried; policy and contract errors never are.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::DirectoryLookupFailed { .. } | Self::Timeout { .. }
        )
    }

    /// Coarse error category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::CallNotFound { .. } | Self::InvalidCallState { .. } => "call-state",
            Self::CallSetupFailed { .. } => "setup",
            Self::PolicyRejection { .. } => "policy",
            Self::NetworkError { .. } | Self::Timeout { .. } => "transport",
            Self::DirectoryLookupFailed { .. } => "directory",
            Self::MediaDeviceError { .. } => "media-device",
            Self::InvalidConfiguration { .. } => "config",
            Self::InternalError { .. } => "internal",
        }
    }
}
