//! Wire types exchanged with a remote peer over signaling

use crate::config::ChannelOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Signaling message kind carrying a transport payload plus descriptors
pub const KIND_SIGNALING: &str = "signaling";
/// Signaling message kind carrying an ICE candidate
pub const KIND_ICE_CANDIDATE: &str = "ice_candidate";
/// Signaling message kind carrying an application message
pub const KIND_MESSAGE: &str = "message";

/// Status a peer publishes through signaling
pub type Status = serde_json::Value;

/// Peer identifier assigned by the signaling session
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        PeerId(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        PeerId(id)
    }
}

/// Stream descriptor: stream name -> transport stream id
pub type StreamDescriptor = BTreeMap<String, String>;

/// Channel descriptor: channel name -> creation options
pub type ChannelDescriptor = BTreeMap<String, ChannelOptions>;

/// Payload of a `signaling` message
///
/// The transport's own fields (SDP, type, ...) travel flattened next to the
/// sender's current stream and channel descriptors.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingPayload {
    #[serde(default)]
    pub streams: StreamDescriptor,

    #[serde(default)]
    pub channels: ChannelDescriptor,

    #[serde(flatten)]
    pub transport: serde_json::Map<String, serde_json::Value>,
}

impl SignalingPayload {
    /// Wrap a transport payload without descriptors
    ///
    /// Non-object payloads are carried under a `data` field.
    pub fn from_transport(payload: serde_json::Value) -> Self {
        let transport = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        Self {
            transport,
            ..Self::default()
        }
    }

    /// The transport-specific remainder
    pub fn transport_payload(&self) -> serde_json::Value {
        serde_json::Value::Object(self.transport.clone())
    }
}

/// ICE candidate relayed between transport sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}
