//! Stub transport and signaling sessions that record every call

#![allow(dead_code)]

use async_trait::async_trait;
use matchbox_room::events::EventBus;
use matchbox_room::{
    ChannelOptions, Error, IceCandidate, PeerConnection, PeerConnectionConfig,
    PeerConnectionFactory, PeerHandle, PeerId, PeerSignalingEvent, Result, RoomSignaling,
    RoomSignalingEvent, SignalingPeer, Status, Stream, TransportEvent,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchbox_room=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Await `future`, failing the test if it takes longer than [`WAIT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

/// Whether `future` is still pending after a short grace period
pub async fn stays_pending<F: Future>(future: F) -> bool {
    tokio::time::timeout(Duration::from_millis(50), future)
        .await
        .is_err()
}

/// Poll `condition` until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Next event matching `pick`, skipping others
pub async fn next_matching<E, T>(
    rx: &mut mpsc::UnboundedReceiver<E>,
    mut pick: impl FnMut(E) -> Option<T>,
) -> T {
    within(async {
        loop {
            let event = rx.recv().await.expect("event stream ended");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    })
    .await
}

#[derive(Default)]
pub struct StubTransport {
    pub added_streams: Mutex<Vec<String>>,
    pub added_channels: Mutex<Vec<(String, ChannelOptions)>>,
    pub connect_calls: Mutex<usize>,
    pub close_calls: Mutex<usize>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub signaling_inputs: Mutex<Vec<serde_json::Value>>,
    pub fail_connect: Mutex<Option<Error>>,
    bus: EventBus<TransportEvent>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: Error) -> Arc<Self> {
        let transport = Self::default();
        *transport.fail_connect.lock() = Some(err);
        Arc::new(transport)
    }

    pub fn emit(&self, event: TransportEvent) {
        self.bus.emit(event);
    }

    pub fn connects(&self) -> usize {
        *self.connect_calls.lock()
    }

    pub fn closes(&self) -> usize {
        *self.close_calls.lock()
    }
}

#[async_trait]
impl PeerConnection for StubTransport {
    fn add_stream(&self, stream: &Stream) -> Result<()> {
        self.added_streams.lock().push(stream.id().to_string());
        Ok(())
    }

    fn add_data_channel(&self, name: &str, options: &ChannelOptions) -> Result<()> {
        self.added_channels
            .lock()
            .push((name.to_string(), options.clone()));
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        *self.connect_calls.lock() += 1;
        match self.fail_connect.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&self) {
        *self.close_calls.lock() += 1;
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn signaling_input(&self, payload: serde_json::Value) -> Result<()> {
        self.signaling_inputs.lock().push(payload);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.bus.subscribe()
    }
}

#[derive(Default)]
pub struct StubSignalingPeer {
    pub sent: Mutex<Vec<(String, serde_json::Value)>>,
    pub initial_status: Status,
    bus: EventBus<PeerSignalingEvent>,
}

impl StubSignalingPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_status(status: Status) -> Arc<Self> {
        Arc::new(Self {
            initial_status: status,
            ..Self::default()
        })
    }

    pub fn emit(&self, event: PeerSignalingEvent) {
        self.bus.emit(event);
    }

    pub fn sent_of(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn handle(self: &Arc<Self>, id: &str, first: bool) -> PeerHandle {
        PeerHandle {
            id: PeerId::from(id),
            first,
            signaling: self.clone(),
        }
    }
}

impl SignalingPeer for StubSignalingPeer {
    fn send(&self, kind: &str, payload: serde_json::Value) -> Result<()> {
        self.sent.lock().push((kind.to_string(), payload));
        Ok(())
    }

    fn status(&self) -> Status {
        self.initial_status.clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerSignalingEvent> {
        self.bus.subscribe()
    }
}

#[derive(Default)]
pub struct StubRoomSignaling {
    pub connect_calls: Mutex<usize>,
    pub close_calls: Mutex<usize>,
    pub statuses: Mutex<Vec<Status>>,
    pub fail_connect: Mutex<Option<Error>>,
    bus: EventBus<RoomSignalingEvent>,
}

impl StubRoomSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: Error) -> Arc<Self> {
        let signaling = Self::default();
        *signaling.fail_connect.lock() = Some(err);
        Arc::new(signaling)
    }

    pub fn emit(&self, event: RoomSignalingEvent) {
        self.bus.emit(event);
    }

    pub fn connects(&self) -> usize {
        *self.connect_calls.lock()
    }
}

#[async_trait]
impl RoomSignaling for StubRoomSignaling {
    async fn connect(&self) -> Result<()> {
        *self.connect_calls.lock() += 1;
        match self.fail_connect.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        *self.close_calls.lock() += 1;
        self.bus.emit(RoomSignalingEvent::Closed);
        Ok(())
    }

    fn set_status(&self, status: Status) -> Result<()> {
        self.statuses.lock().push(status);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomSignalingEvent> {
        self.bus.subscribe()
    }
}

/// Hands out a fresh [`StubTransport`] per peer and keeps them for inspection
#[derive(Default)]
pub struct StubFactory {
    pub created: Mutex<Vec<(PeerConnectionConfig, Arc<StubTransport>)>>,
    /// Number of upcoming `create` calls that fail
    pub fail_next: Mutex<usize>,
}

impl StubFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(&self, index: usize) -> Arc<StubTransport> {
        self.created.lock()[index].1.clone()
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }
}

impl PeerConnectionFactory for StubFactory {
    fn create(&self, config: PeerConnectionConfig) -> Result<Arc<dyn PeerConnection>> {
        {
            let mut fail_next = self.fail_next.lock();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(Error::Transport("no ice servers".into()));
            }
        }
        let transport = StubTransport::new();
        self.created.lock().push((config, transport.clone()));
        Ok(transport)
    }
}
