//! Streams, data channels and the ways a local stream can be supplied

use crate::config::ChannelOptions;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An object delivered by the transport that can be matched against a name
///
/// The transport reports a key for each arriving object; the remote peer
/// announces `name -> announcement` pairs over signaling. Both sides of the
/// match are reduced to the same key space here.
pub trait Resource: Clone + Send + Sync + 'static {
    /// What the remote announces for each name
    type Announcement: Clone + fmt::Debug + Send + Sync + 'static;

    /// Key reported by the transport for this object
    fn key(&self) -> String;

    /// Key an announced `name -> announcement` pair refers to
    fn announced_key(name: &str, announcement: &Self::Announcement) -> String;
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single track inside a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }
}

#[derive(Debug)]
struct StreamInner {
    id: String,
    tracks: Vec<MediaTrack>,
}

/// Handle to a media stream
///
/// Clones share identity; two handles refer to the same stream when
/// [`Stream::ptr_eq`] holds.
#[derive(Debug, Clone)]
pub struct Stream(Arc<StreamInner>);

impl Stream {
    /// New stream with a fresh id
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), tracks)
    }

    /// Stream with an id assigned by the transport
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self(Arc::new(StreamInner {
            id: id.into(),
            tracks,
        }))
    }

    /// Transport-level stream id, announced to the remote as the stream key
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.0.tracks
    }

    pub fn has_audio(&self) -> bool {
        self.0.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.0.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Resource for Stream {
    type Announcement = String;

    fn key(&self) -> String {
        self.0.id.clone()
    }

    fn announced_key(_name: &str, stream_id: &String) -> String {
        stream_id.clone()
    }
}

#[derive(Debug)]
struct ChannelInner {
    label: String,
    options: ChannelOptions,
}

/// Handle to a data channel opened by the transport
#[derive(Debug, Clone)]
pub struct DataChannel(Arc<ChannelInner>);

impl DataChannel {
    pub fn new(label: impl Into<String>, options: ChannelOptions) -> Self {
        Self(Arc::new(ChannelInner {
            label: label.into(),
            options,
        }))
    }

    /// Channel label, which is the name it was created under
    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.0.options
    }

    pub fn ptr_eq(&self, other: &DataChannel) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Resource for DataChannel {
    type Announcement = ChannelOptions;

    fn key(&self) -> String {
        self.0.label.clone()
    }

    fn announced_key(name: &str, _options: &ChannelOptions) -> String {
        name.to_string()
    }
}

/// Constraints for capturing a new local stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub audio: bool,
    pub video: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Builds local streams from a capture configuration
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(&self, config: StreamConfig) -> Result<Stream>;
}

/// A local stream that may not exist yet
pub type StreamFuture = Shared<BoxFuture<'static, Result<Stream>>>;

/// The three ways a local stream can be handed over
pub enum StreamSource {
    /// Already constructed
    Ready(Stream),
    /// Constructed elsewhere, available later
    Pending(BoxFuture<'static, Result<Stream>>),
    /// Construct from a configuration through the local [`MediaSource`]
    Capture(StreamConfig),
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Ready(stream) => f.debug_tuple("Ready").field(&stream.id()).finish(),
            StreamSource::Pending(_) => f.write_str("Pending"),
            StreamSource::Capture(config) => f.debug_tuple("Capture").field(config).finish(),
        }
    }
}

impl From<Stream> for StreamSource {
    fn from(stream: Stream) -> Self {
        StreamSource::Ready(stream)
    }
}

impl From<StreamConfig> for StreamSource {
    fn from(config: StreamConfig) -> Self {
        StreamSource::Capture(config)
    }
}

impl StreamSource {
    /// Normalize into a shareable future
    ///
    /// Fails immediately when a capture is requested without a media source.
    pub(crate) fn into_future(self, media: Option<Arc<dyn MediaSource>>) -> Result<StreamFuture> {
        let future = match self {
            StreamSource::Ready(stream) => futures::future::ready(Ok(stream)).boxed(),
            StreamSource::Pending(future) => future,
            StreamSource::Capture(config) => {
                let media = media.ok_or_else(|| {
                    Error::usage("cannot capture a stream without a media source")
                })?;
                async move { media.capture(config).await }.boxed()
            }
        };
        Ok(future.shared())
    }
}
