//! Negotiation with a single remote peer
//!
//! A [`RemotePeer`] ties one transport session to one signaling channel:
//! transport output is forwarded to the remote together with our current
//! descriptors, remote descriptors and transport objects are fed into the
//! stream and channel collections, and candidates are relayed both ways.

use crate::collection::{ChannelCollection, ResourceFuture, StreamCollection};
use crate::config::{ChannelOptions, PeerOptions};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::local::{DEFAULT_CHANNEL, DEFAULT_STREAM, LocalPeer};
use crate::protocol::{
    ChannelDescriptor, KIND_ICE_CANDIDATE, KIND_MESSAGE, KIND_SIGNALING, PeerId,
    SignalingPayload, Status, StreamDescriptor,
};
use crate::resource::{DataChannel, Stream, StreamFuture, StreamSource};
use crate::signaling::{PeerHandle, PeerSignalingEvent, SignalingPeer};
use crate::transport::{PeerConnection, TransportEvent};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared outcome of [`RemotePeer::connect`]
pub type ConnectFuture = Shared<BoxFuture<'static, Result<()>>>;

/// Progress of the connect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    NotStarted,
    InProgress,
    Done,
}

/// Transport-level connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connected,
    Closed,
}

/// Notifications about a remote peer
#[derive(Debug, Clone)]
pub enum PeerEvent {
    StatusChanged(Status),
    /// Application message sent by the peer
    Message(serde_json::Value),
    /// Transport session connected
    Connected,
    /// Transport session closed
    Closed,
    /// Peer left the room; no further events follow
    Left,
}

struct ConnectSlot {
    state: ConnectState,
    future: Option<ConnectFuture>,
}

#[derive(Default)]
struct Wiring {
    transport: Option<JoinHandle<()>>,
    signaling: Option<JoinHandle<()>>,
    connect: Option<JoinHandle<()>>,
}

/// Session with one remote peer
pub struct RemotePeer {
    id: PeerId,
    offering: bool,
    options: PeerOptions,
    transport: Arc<dyn PeerConnection>,
    signaling: Arc<dyn SignalingPeer>,
    local: Arc<LocalPeer>,
    streams: StreamCollection,
    channels: ChannelCollection,
    private_streams: Mutex<HashMap<String, StreamFuture>>,
    private_channels: Mutex<HashMap<String, ChannelOptions>>,
    connect: Mutex<ConnectSlot>,
    status: Mutex<Status>,
    connection_state: Mutex<ConnectionState>,
    events: EventBus<PeerEvent>,
    wiring: Mutex<Wiring>,
}

impl RemotePeer {
    /// Create the session and start forwarding between transport and
    /// signaling
    ///
    /// With `auto_connect` the connect sequence starts right away. Must be
    /// called from within a tokio runtime.
    pub fn new(
        handle: PeerHandle,
        transport: Arc<dyn PeerConnection>,
        local: Arc<LocalPeer>,
        options: PeerOptions,
    ) -> Arc<Self> {
        let peer = Self::build(handle, transport, local, options);
        peer.start();
        peer
    }

    /// Create without wiring, so callers can subscribe before any event
    pub(crate) fn build(
        handle: PeerHandle,
        transport: Arc<dyn PeerConnection>,
        local: Arc<LocalPeer>,
        options: PeerOptions,
    ) -> Arc<Self> {
        let status = handle.signaling.status();
        Arc::new(Self {
            id: handle.id,
            offering: handle.first,
            options,
            transport,
            signaling: handle.signaling,
            local,
            streams: StreamCollection::new("stream"),
            channels: ChannelCollection::new("channel"),
            private_streams: Mutex::new(HashMap::new()),
            private_channels: Mutex::new(HashMap::new()),
            connect: Mutex::new(ConnectSlot {
                state: ConnectState::NotStarted,
                future: None,
            }),
            status: Mutex::new(status),
            connection_state: Mutex::new(ConnectionState::New),
            events: EventBus::new(),
            wiring: Mutex::new(Wiring::default()),
        })
    }

    pub(crate) fn start(self: &Arc<Self>) {
        let mut transport_rx = self.transport.subscribe();
        let weak = Arc::downgrade(self);
        let transport_task = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                let Some(peer) = weak.upgrade() else { break };
                peer.on_transport_event(event);
            }
        });

        let mut signaling_rx = self.signaling.subscribe();
        let weak = Arc::downgrade(self);
        let signaling_task = tokio::spawn(async move {
            while let Some(event) = signaling_rx.recv().await {
                let Some(peer) = weak.upgrade() else { break };
                if peer.on_signaling_event(event).await.is_break() {
                    break;
                }
            }
        });

        {
            let mut wiring = self.wiring.lock();
            wiring.transport = Some(transport_task);
            wiring.signaling = Some(signaling_task);
        }

        debug!(peer = %self.id, offering = self.offering, "peer wired");

        if self.options.auto_connect {
            let _ = self.connect();
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Whether our side makes the offer
    pub fn offering(&self) -> bool {
        self.offering
    }

    pub fn options(&self) -> PeerOptions {
        self.options
    }

    /// Last status published by the peer
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    pub fn connect_state(&self) -> ConnectState {
        self.connect.lock().state
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.lock()
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Stream the peer sends under `name`
    pub fn stream(&self, name: &str) -> ResourceFuture<Stream> {
        self.streams.get(name)
    }

    /// Data channel the peer opened under `name`
    pub fn channel(&self, name: &str) -> ResourceFuture<DataChannel> {
        self.channels.get(name)
    }

    /// Streams received from the peer
    pub fn streams(&self) -> &StreamCollection {
        &self.streams
    }

    /// Channels received from the peer
    pub fn channels(&self) -> &ChannelCollection {
        &self.channels
    }

    /// Send an application message through signaling
    pub fn message(&self, payload: serde_json::Value) -> Result<()> {
        self.signaling.send(KIND_MESSAGE, payload)
    }

    /// Add a stream offered only to this peer
    ///
    /// Only allowed when the session was created with `auto_connect: false`
    /// and before [`connect`](Self::connect) is called; the stream is
    /// applied when the connect sequence runs.
    pub fn add_stream(&self, name: Option<&str>, source: StreamSource) -> Result<()> {
        self.ensure_manual_connect("add_stream")?;
        let future = source.into_future(self.local.media_source())?;
        let name = name.unwrap_or(DEFAULT_STREAM).to_string();

        let slot = self.connect.lock();
        ensure_not_started(slot.state, "add_stream")?;
        self.private_streams.lock().insert(name, future);
        Ok(())
    }

    /// Add a data channel offered only to this peer; options default to
    /// an ordered channel
    pub fn add_data_channel(
        &self,
        name: Option<&str>,
        options: Option<ChannelOptions>,
    ) -> Result<()> {
        self.ensure_manual_connect("add_data_channel")?;
        let name = name.unwrap_or(DEFAULT_CHANNEL).to_string();

        let slot = self.connect.lock();
        ensure_not_started(slot.state, "add_data_channel")?;
        self.private_channels
            .lock()
            .insert(name, options.unwrap_or_default());
        Ok(())
    }

    /// Options registered for a private channel
    pub fn private_channel(&self, name: &str) -> Option<ChannelOptions> {
        self.private_channels.lock().get(name).cloned()
    }

    fn ensure_manual_connect(&self, op: &str) -> Result<()> {
        if self.options.auto_connect {
            return Err(Error::usage(format!(
                "{op} requires a peer created with auto_connect disabled"
            )));
        }
        Ok(())
    }

    /// Gather local resources, hand them to the transport and connect
    ///
    /// Runs at most once per session; every call returns the same shared
    /// outcome. The resources offered are the ones registered when the
    /// first call is made. Fails if the session is closed before the
    /// transport is reached.
    pub fn connect(self: &Arc<Self>) -> ConnectFuture {
        let mut slot = self.connect.lock();
        if let Some(future) = &slot.future {
            return future.clone();
        }

        let mut streams: BTreeMap<String, StreamFuture> =
            self.local.streams().into_iter().collect();
        streams.extend(self.private_streams.lock().clone());
        let mut channels: BTreeMap<String, ChannelOptions> =
            self.local.channels().into_iter().collect();
        channels.extend(self.private_channels.lock().clone());
        debug!(peer = %self.id, count = streams.len(), "waiting for local streams");

        let weak = Arc::downgrade(self);
        let id = self.id.clone();
        let future = async move {
            let result = Self::run_connect(&weak, streams, channels).await;
            if let Some(peer) = weak.upgrade() {
                peer.connect.lock().state = ConnectState::Done;
            }
            match &result {
                Ok(()) => info!(peer = %id, "connected"),
                Err(err) => warn!(peer = %id, %err, "connect failed"),
            }
            result
        }
        .boxed()
        .shared();

        slot.state = ConnectState::InProgress;
        slot.future = Some(future.clone());
        drop(slot);

        // keep the sequence going even if every caller drops its handle
        let task = tokio::spawn(future.clone().map(|_| ()));
        self.wiring.lock().connect = Some(task);
        future
    }

    async fn run_connect(
        peer: &Weak<Self>,
        streams: BTreeMap<String, StreamFuture>,
        channels: BTreeMap<String, ChannelOptions>,
    ) -> Result<()> {
        let resolved = future::try_join_all(
            streams
                .into_iter()
                .map(|(name, stream)| async move { stream.await.map(|stream| (name, stream)) }),
        )
        .await?;

        let transport = {
            let peer = peer
                .upgrade()
                .ok_or_else(|| Error::Transport("peer dropped".into()))?;

            let mut stream_descriptor = StreamDescriptor::new();
            for (name, stream) in resolved {
                peer.ensure_open()?;
                peer.transport.add_stream(&stream)?;
                stream_descriptor.insert(name, stream.id().to_string());
            }
            peer.streams.set_local(stream_descriptor);

            let mut channel_descriptor = ChannelDescriptor::new();
            for (name, options) in channels {
                peer.ensure_open()?;
                peer.transport.add_data_channel(&name, &options)?;
                channel_descriptor.insert(name, options);
            }
            peer.channels.set_local(channel_descriptor);

            peer.ensure_open()?;
            debug!(peer = %peer.id, "local resources added, connecting transport");
            Arc::clone(&peer.transport)
        };
        transport.connect().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.connection_state() == ConnectionState::Closed {
            return Err(Error::Transport("peer closed".into()));
        }
        Ok(())
    }

    /// Close the transport session and stop a pending connect sequence
    ///
    /// Signaling keeps running so the peer's departure is still reported.
    pub fn close(&self) {
        {
            let mut wiring = self.wiring.lock();
            for task in [wiring.transport.take(), wiring.connect.take()]
                .into_iter()
                .flatten()
            {
                task.abort();
            }
        }
        self.transport.close();
        self.set_connection_state(ConnectionState::Closed);
    }

    fn set_connection_state(&self, state: ConnectionState) {
        {
            let mut current = self.connection_state.lock();
            if *current == state || *current == ConnectionState::Closed {
                return;
            }
            *current = state;
        }
        match state {
            ConnectionState::Connected => self.events.emit(PeerEvent::Connected),
            ConnectionState::Closed => self.events.emit(PeerEvent::Closed),
            ConnectionState::New => {}
        }
    }

    fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StreamAdded(stream) => {
                if let Err(err) = self.streams.resolve(stream) {
                    warn!(peer = %self.id, %err, "ignoring stream");
                }
            }
            TransportEvent::DataChannelReady(channel) => {
                if let Err(err) = self.channels.resolve(channel) {
                    warn!(peer = %self.id, %err, "ignoring data channel");
                }
            }
            TransportEvent::Signaling(payload) => {
                let mut outgoing = SignalingPayload::from_transport(payload);
                outgoing.streams = self.streams.local();
                outgoing.channels = self.channels.local();
                self.send(KIND_SIGNALING, serde_json::to_value(&outgoing));
            }
            TransportEvent::IceCandidate(candidate) => {
                self.send(KIND_ICE_CANDIDATE, serde_json::to_value(&candidate));
            }
            TransportEvent::Connected => self.set_connection_state(ConnectionState::Connected),
            TransportEvent::Closed => self.set_connection_state(ConnectionState::Closed),
        }
    }

    fn send(&self, kind: &str, payload: serde_json::Result<serde_json::Value>) {
        let result = payload
            .map_err(Error::from)
            .and_then(|payload| self.signaling.send(kind, payload));
        match result {
            Ok(()) => debug!(peer = %self.id, kind, "relayed to signaling"),
            Err(err) => warn!(peer = %self.id, kind, %err, "failed to relay to signaling"),
        }
    }

    async fn on_signaling_event(&self, event: PeerSignalingEvent) -> ControlFlow<()> {
        match event {
            PeerSignalingEvent::Signaling(value) => {
                let payload: SignalingPayload = match serde_json::from_value(value) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(peer = %self.id, %err, "malformed signaling payload");
                        return ControlFlow::Continue(());
                    }
                };
                debug!(
                    peer = %self.id,
                    streams = payload.streams.len(),
                    channels = payload.channels.len(),
                    "remote descriptors"
                );
                self.streams.update(&payload.streams);
                self.channels.set_remote(&payload.channels);
                if let Err(err) = self
                    .transport
                    .signaling_input(payload.transport_payload())
                    .await
                {
                    warn!(peer = %self.id, %err, "transport rejected signaling input");
                }
            }
            PeerSignalingEvent::IceCandidate(candidate) => {
                if let Err(err) = self.transport.add_ice_candidate(candidate) {
                    warn!(peer = %self.id, %err, "transport rejected candidate");
                }
            }
            PeerSignalingEvent::StatusChanged(status) => {
                *self.status.lock() = status.clone();
                self.events.emit(PeerEvent::StatusChanged(status));
            }
            PeerSignalingEvent::Message(message) => {
                self.events.emit(PeerEvent::Message(message));
            }
            PeerSignalingEvent::Left => {
                info!(peer = %self.id, "peer left");
                self.close();
                self.events.emit(PeerEvent::Left);
                self.events.close();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl fmt::Debug for RemotePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePeer")
            .field("id", &self.id)
            .field("offering", &self.offering)
            .field("connect_state", &self.connect_state())
            .field("connection_state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Drop for RemotePeer {
    fn drop(&mut self) {
        let wiring = self.wiring.get_mut();
        for task in [
            wiring.transport.take(),
            wiring.signaling.take(),
            wiring.connect.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

fn ensure_not_started(state: ConnectState, op: &str) -> Result<()> {
    if state != ConnectState::NotStarted {
        return Err(Error::usage(format!("{op} is not allowed once connect has been called")));
    }
    Ok(())
}
