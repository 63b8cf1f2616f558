//! Interface to the peer-connection primitive doing ICE, SDP and encryption

use crate::config::ChannelOptions;
use crate::error::Result;
use crate::protocol::IceCandidate;
use crate::resource::{DataChannel, Stream};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notifications from a transport session, delivered in emit order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The remote added a stream
    StreamAdded(Stream),
    /// A data channel opened by either side is ready
    DataChannelReady(DataChannel),
    /// Outgoing signaling payload for the remote transport
    Signaling(serde_json::Value),
    /// Local ICE candidate for the remote transport
    IceCandidate(IceCandidate),
    Connected,
    Closed,
}

/// One transport session with one remote peer
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_stream(&self, stream: &Stream) -> Result<()>;

    fn add_data_channel(&self, name: &str, options: &ChannelOptions) -> Result<()>;

    /// Start negotiation; settles once the transport reports success or failure
    async fn connect(&self) -> Result<()>;

    fn close(&self);

    fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Feed a transport payload received from the remote
    async fn signaling_input(&self, payload: serde_json::Value) -> Result<()>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;
}

/// How a transport session should be set up for a joined peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerConnectionConfig {
    /// This side creates the offer
    pub offering: bool,
}

/// Creates a transport session for each peer that joins a room
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, config: PeerConnectionConfig) -> Result<Arc<dyn PeerConnection>>;
}

impl<F> PeerConnectionFactory for F
where
    F: Fn(PeerConnectionConfig) -> Result<Arc<dyn PeerConnection>> + Send + Sync,
{
    fn create(&self, config: PeerConnectionConfig) -> Result<Arc<dyn PeerConnection>> {
        (self)(config)
    }
}
