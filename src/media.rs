//! Media channel and capability types
//!
//! Logical channels are the negotiated unidirectional media streams within a
//! call; a connection tracks at most one transmitted channel per kind. The
//! actual capture, encoding and transport of media belongs to the wrapped
//! protocol stack; these types only carry the bookkeeping the lifecycle
//! layer needs.

use serde::{Deserialize, Serialize};

/// Kind of media a logical channel carries
///
/// The discriminants match the wire-level channel numbering (0 = audio,
/// 1 = video).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelKind {
    /// Audio stream
    Audio = 0,
    /// Video stream
    Video = 1,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Direction of a logical channel relative to this endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDirection {
    /// Channel transmitting local media to the remote party
    Transmit,
    /// Channel receiving remote media
    Receive,
}

/// Where a transmitted channel's media comes from
///
/// When a capture device fails to open, the call proceeds degraded with a
/// placeholder source rather than aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSource {
    /// A real capture device, identified by its device name
    Device(String),
    /// Placeholder substituted after a device failure (silence / test pattern)
    Placeholder,
}

/// A negotiated unidirectional media stream within a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalChannel {
    /// Media kind
    pub kind: ChannelKind,
    /// Stream direction
    pub direction: ChannelDirection,
    /// Name of the negotiated capability/format (e.g. "G.711-uLaw", "H.261")
    pub capability: String,
    /// Media source feeding the channel (transmit side only meaningful)
    pub source: MediaSource,
    /// Whether transmission on this channel is currently paused
    pub paused: bool,
}

impl LogicalChannel {
    /// Create a channel descriptor for a freshly opened channel
    pub fn new(
        kind: ChannelKind,
        direction: ChannelDirection,
        capability: impl Into<String>,
        source: MediaSource,
    ) -> Self {
        Self {
            kind,
            direction,
            capability: capability.into(),
            source,
            paused: false,
        }
    }
}

/// A codec/format descriptor this endpoint advertises as supported
///
/// The endpoint owns an ordered capability table; order expresses preference
/// during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability/format name (e.g. "G.711-uLaw", "G.722", "H.261")
    pub name: String,
    /// Kind of media the capability applies to
    pub kind: ChannelKind,
}

impl Capability {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Default capability table for a stock endpoint
    ///
    /// Ordered by preference; used when the application supplies none.
    pub fn default_set() -> Vec<Capability> {
        vec![
            Capability::new("G.711-uLaw", ChannelKind::Audio),
            Capability::new("G.711-ALaw", ChannelKind::Audio),
            Capability::new("GSM-06.10", ChannelKind::Audio),
            Capability::new("H.261", ChannelKind::Video),
        ]
    }
}
