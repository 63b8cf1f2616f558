//! Interface to the signaling link carrying presence and per-peer messages

use crate::error::Result;
use crate::protocol::{IceCandidate, PeerId, Status};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Signaling channel to a single remote peer
pub trait SignalingPeer: Send + Sync {
    /// Send a message of `kind` (see the `KIND_*` constants) to the peer
    fn send(&self, kind: &str, payload: serde_json::Value) -> Result<()>;

    /// Status the peer published when it was discovered
    fn status(&self) -> Status;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerSignalingEvent>;
}

/// Notifications from a per-peer signaling channel
#[derive(Debug, Clone)]
pub enum PeerSignalingEvent {
    /// Signaling payload carrying descriptors and transport fields
    Signaling(serde_json::Value),
    IceCandidate(IceCandidate),
    StatusChanged(Status),
    /// Application message
    Message(serde_json::Value),
    Left,
}

/// A peer announced by the room-level signaling session
#[derive(Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    /// We were in the room first, so we make the offer
    pub first: bool,
    pub signaling: Arc<dyn SignalingPeer>,
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("first", &self.first)
            .finish_non_exhaustive()
    }
}

/// Notifications from the room-level signaling session
#[derive(Debug, Clone)]
pub enum RoomSignalingEvent {
    PeerJoined(PeerHandle),
    Closed,
}

/// Room-level signaling session
#[async_trait]
pub trait RoomSignaling: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Publish our status to every peer in the room
    fn set_status(&self, status: Status) -> Result<()>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomSignalingEvent>;
}
