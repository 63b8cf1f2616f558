//! Room membership and the lifecycle of every peer session in it
//!
//! The room owns the room-level signaling session. Each peer it announces
//! gets a fresh transport session and [`RemotePeer`]; the peer's
//! notifications are re-emitted at room level and the entry is dropped
//! again when the peer leaves.

use crate::config::RoomOptions;
use crate::error::Result;
use crate::events::EventBus;
use crate::local::LocalPeer;
use crate::peer::{ConnectFuture, PeerEvent, RemotePeer};
use crate::protocol::{PeerId, Status};
use crate::signaling::{PeerHandle, RoomSignaling, RoomSignalingEvent};
use crate::transport::{PeerConnectionConfig, PeerConnectionFactory};
use futures::future::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Aggregate room state
///
/// Moves forward only: `Idle -> Connecting -> Connected`, then `Closed`
/// when signaling closes a connected room, or `Failed` when joining fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Idle,
    Connecting,
    Connected,
    Closed,
    Failed,
}

/// Notifications about the room and its peers
#[derive(Debug, Clone)]
pub enum RoomEvent {
    PeerJoined(Arc<RemotePeer>),
    /// A current peer left; replaced or cleared sessions are not reported
    PeerLeft(Arc<RemotePeer>),
    PeerStatusChanged(Arc<RemotePeer>, Status),
    PeerMessage(Arc<RemotePeer>, serde_json::Value),
    /// Current peer ids after a join or leave
    PeersChanged(Vec<PeerId>),
    StateChanged(RoomState),
    Closed,
}

/// A signaling room and the peer sessions discovered through it
pub struct Room {
    signaling: Arc<dyn RoomSignaling>,
    factory: Arc<dyn PeerConnectionFactory>,
    local: Arc<LocalPeer>,
    options: RoomOptions,
    state: Mutex<RoomState>,
    peers: Mutex<HashMap<PeerId, Arc<RemotePeer>>>,
    connect: Mutex<Option<ConnectFuture>>,
    events: EventBus<RoomEvent>,
    wiring: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    /// Create a room and start listening to its signaling session
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        signaling: Arc<dyn RoomSignaling>,
        factory: Arc<dyn PeerConnectionFactory>,
        local: Arc<LocalPeer>,
        options: RoomOptions,
    ) -> Arc<Self> {
        let room = Arc::new(Self {
            signaling,
            factory,
            local,
            options,
            state: Mutex::new(RoomState::Idle),
            peers: Mutex::new(HashMap::new()),
            connect: Mutex::new(None),
            events: EventBus::new(),
            wiring: Mutex::new(None),
        });

        let mut signaling_rx = room.signaling.subscribe();
        let weak = Arc::downgrade(&room);
        let task = tokio::spawn(async move {
            while let Some(event) = signaling_rx.recv().await {
                let Some(room) = weak.upgrade() else { break };
                if room.on_signaling_event(event).is_break() {
                    break;
                }
            }
        });
        *room.wiring.lock() = Some(task);

        room
    }

    pub fn state(&self) -> RoomState {
        *self.state.lock()
    }

    pub fn options(&self) -> RoomOptions {
        self.options
    }

    /// Resources offered to every peer
    pub fn local(&self) -> &Arc<LocalPeer> {
        &self.local
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn peers(&self) -> Vec<Arc<RemotePeer>> {
        self.peers.lock().values().cloned().collect()
    }

    pub fn peer(&self, id: &PeerId) -> Option<Arc<RemotePeer>> {
        self.peers.lock().get(id).cloned()
    }

    /// Join the room
    ///
    /// Runs at most once; every call returns the same shared outcome. A
    /// signaling failure moves the room to [`RoomState::Failed`].
    pub fn connect(self: &Arc<Self>) -> ConnectFuture {
        let mut slot = self.connect.lock();
        if let Some(future) = &*slot {
            return future.clone();
        }

        self.transition(RoomState::Idle, RoomState::Connecting);
        let room = Arc::clone(self);
        let future = async move {
            match room.signaling.connect().await {
                Ok(()) => {
                    room.transition(RoomState::Connecting, RoomState::Connected);
                    Ok(())
                }
                Err(err) => {
                    warn!(%err, "joining room failed");
                    room.transition(RoomState::Connecting, RoomState::Failed);
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(future.clone());
        drop(slot);

        tokio::spawn(future.clone().map(|_| ()));
        future
    }

    /// Leave the room by closing the signaling session
    ///
    /// Peer sessions close themselves once signaling reports them gone.
    pub async fn leave(&self) -> Result<()> {
        info!("leaving room");
        self.signaling.close().await
    }

    /// Same as [`leave`](Self::leave)
    pub async fn destroy(&self) -> Result<()> {
        self.leave().await
    }

    /// Publish our status to every peer
    pub fn set_status(&self, status: Status) -> Result<()> {
        self.signaling.set_status(status)
    }

    fn transition(&self, from: RoomState, to: RoomState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != from {
                return false;
            }
            *state = to;
        }
        info!(?from, ?to, "room state changed");
        self.events.emit(RoomEvent::StateChanged(to));
        true
    }

    fn on_signaling_event(self: &Arc<Self>, event: RoomSignalingEvent) -> ControlFlow<()> {
        match event {
            RoomSignalingEvent::PeerJoined(handle) => {
                self.on_peer_joined(handle);
                ControlFlow::Continue(())
            }
            RoomSignalingEvent::Closed => {
                let peers = std::mem::take(&mut *self.peers.lock());
                info!(peers = peers.len(), "signaling closed");
                self.events.emit(RoomEvent::Closed);
                self.transition(RoomState::Connected, RoomState::Closed);
                ControlFlow::Break(())
            }
        }
    }

    fn on_peer_joined(self: &Arc<Self>, handle: PeerHandle) {
        let id = handle.id.clone();
        let config = PeerConnectionConfig {
            offering: handle.first,
        };
        let transport = match self.factory.create(config) {
            Ok(transport) => transport,
            Err(err) => {
                warn!(peer = %id, %err, "could not create transport session, skipping peer");
                return;
            }
        };

        let peer = RemotePeer::build(
            handle,
            transport,
            Arc::clone(&self.local),
            self.options.peer_options(),
        );
        self.forward_peer_events(&peer);

        let previous = self.peers.lock().insert(id.clone(), Arc::clone(&peer));
        if let Some(previous) = previous {
            warn!(peer = %id, "peer joined again, replacing its session");
            previous.close();
        }

        peer.start();
        info!(peer = %id, offering = peer.offering(), "peer joined");
        self.events.emit(RoomEvent::PeerJoined(peer));
        self.emit_peers_changed();
    }

    fn forward_peer_events(self: &Arc<Self>, peer: &Arc<RemotePeer>) {
        let mut peer_rx = peer.subscribe();
        let weak = Arc::downgrade(self);
        // holds the session until it reports leaving
        let peer = Arc::clone(peer);
        tokio::spawn(async move {
            while let Some(event) = peer_rx.recv().await {
                let Some(room) = weak.upgrade() else { break };
                match event {
                    PeerEvent::StatusChanged(status) => room
                        .events
                        .emit(RoomEvent::PeerStatusChanged(Arc::clone(&peer), status)),
                    PeerEvent::Message(message) => room
                        .events
                        .emit(RoomEvent::PeerMessage(Arc::clone(&peer), message)),
                    PeerEvent::Left => room.on_peer_left(&peer),
                    other @ (PeerEvent::Connected | PeerEvent::Closed) => {
                        debug!(peer = %peer.id(), event = ?other, "peer transport");
                    }
                }
            }
        });
    }

    fn on_peer_left(&self, peer: &Arc<RemotePeer>) {
        let removed = {
            let mut peers = self.peers.lock();
            match peers.get(peer.id()) {
                Some(current) if Arc::ptr_eq(current, peer) => peers.remove(peer.id()).is_some(),
                _ => false,
            }
        };
        if !removed {
            debug!(peer = %peer.id(), "replaced session left");
            return;
        }
        info!(peer = %peer.id(), "peer left");
        self.events.emit(RoomEvent::PeerLeft(Arc::clone(peer)));
        self.emit_peers_changed();
    }

    fn emit_peers_changed(&self) {
        let mut ids: Vec<PeerId> = self.peers.lock().keys().cloned().collect();
        ids.sort();
        self.events.emit(RoomEvent::PeersChanged(ids));
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(task) = self.wiring.get_mut().take() {
            task.abort();
        }
    }
}
