//! Named streams and data channels between WebRTC peers in a room
//!
//! This crate is the negotiation layer that sits between a signaling link
//! and a peer-connection primitive. Both are external: the transport does
//! ICE, SDP and encryption, signaling delivers presence and per-peer
//! messages. What is handled here is matching names across the two.
//!
//! - A [`Room`] joins through [`RoomSignaling`] and creates one
//!   [`RemotePeer`] for every peer that shows up.
//! - A [`RemotePeer`] adds our streams and channels to its transport
//!   session, announces them by name over signaling and resolves the
//!   remote's resources by the names the remote announced.
//! - [`RemotePeer::stream`] and [`RemotePeer::channel`] return futures that
//!   settle whenever the named resource arrives, no matter whether the
//!   announcement or the transport object came first.
//!
//! # Signaling payloads
//!
//! Transport payloads travel as `signaling` messages with the sender's
//! descriptors attached:
//!
//! ```json
//! {
//!   "streams": { "camera": "<stream id>" },
//!   "channels": { "chat": { "ordered": true } },
//!   "type": "offer",
//!   "sdp": "..."
//! }
//! ```
//!
//! ICE candidates travel as `ice_candidate` messages and application
//! messages as `message`.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use matchbox_room::*;
//! # async fn example(
//! #     signaling: Arc<dyn RoomSignaling>,
//! #     factory: Arc<dyn PeerConnectionFactory>,
//! #     camera: Stream,
//! # ) -> Result<()> {
//! let local = Arc::new(LocalPeer::new());
//! local.add_stream(Some("camera"), camera.into())?;
//! local.add_data_channel(Some("chat"), None);
//!
//! let room = Room::new(signaling, factory, local, RoomOptions::default());
//! let mut events = room.subscribe();
//! room.connect().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let RoomEvent::PeerJoined(peer) = event {
//!         let stream = peer.stream("camera").await;
//!         println!("{} sends {} tracks", peer.id(), stream.tracks().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod local;
pub mod peer;
pub mod protocol;
pub mod resource;
pub mod room;
pub mod signaling;
pub mod transport;

pub use collection::{ChannelCollection, ResourceCollection, ResourceFuture, StreamCollection};
pub use config::{ChannelOptions, PeerOptions, RoomOptions};
pub use error::{Error, Result};
pub use local::{DEFAULT_CHANNEL, DEFAULT_STREAM, LocalPeer};
pub use peer::{ConnectFuture, ConnectState, ConnectionState, PeerEvent, RemotePeer};
pub use protocol::{IceCandidate, PeerId, SignalingPayload, Status};
pub use resource::{
    DataChannel, MediaSource, MediaTrack, Resource, Stream, StreamConfig, StreamSource, TrackKind,
};
pub use room::{Room, RoomEvent, RoomState};
pub use signaling::{
    PeerHandle, PeerSignalingEvent, RoomSignaling, RoomSignalingEvent, SignalingPeer,
};
pub use transport::{PeerConnection, PeerConnectionConfig, PeerConnectionFactory, TransportEvent};
