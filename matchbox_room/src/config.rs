//! Configuration types for rooms, peers and data channels

use serde::{Deserialize, Serialize};

/// Options for a single remote peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerOptions {
    /// Start negotiating as soon as the session is created (default: true)
    ///
    /// Private streams and channels can only be added when this is `false`.
    pub auto_connect: bool,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

/// Options for a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomOptions {
    /// Applied to every peer session the room creates (default: true)
    pub auto_connect: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

impl RoomOptions {
    /// Options handed to each peer session created by the room
    pub fn peer_options(&self) -> PeerOptions {
        PeerOptions {
            auto_connect: self.auto_connect,
        }
    }
}

/// Data channel creation options
///
/// This is also what gets announced to the remote peer for each channel name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelOptions {
    /// Deliver messages in order (default: true)
    pub ordered: bool,

    /// Give up on a message after this many milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_packet_life_time: Option<u16>,

    /// Give up on a message after this many retransmits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retransmits: Option<u16>,

    /// Sub-protocol name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Channel is negotiated out of band by the application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiated: Option<bool>,

    /// Fixed stream id for negotiated channels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u16>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            protocol: None,
            negotiated: None,
            id: None,
        }
    }
}

impl ChannelOptions {
    /// Unordered channel that drops messages after `max_retransmits` attempts
    pub fn unreliable(max_retransmits: u16) -> Self {
        Self {
            ordered: false,
            max_retransmits: Some(max_retransmits),
            ..Self::default()
        }
    }
}
