//! Resources offered to every remote peer

use crate::config::ChannelOptions;
use crate::error::Result;
use crate::resource::{MediaSource, StreamFuture, StreamSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Name used when a stream is added without one
pub const DEFAULT_STREAM: &str = "stream";
/// Name used when a data channel is added without one
pub const DEFAULT_CHANNEL: &str = "data";

/// Streams and channels shared by all peer sessions of a room
///
/// Each session merges these with its own private resources when it
/// connects; private entries win on name collisions.
#[derive(Default)]
pub struct LocalPeer {
    streams: Mutex<HashMap<String, StreamFuture>>,
    channels: Mutex<HashMap<String, ChannelOptions>>,
    media: Option<Arc<dyn MediaSource>>,
}

impl LocalPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local peer able to capture streams from `media`
    pub fn with_media_source(media: Arc<dyn MediaSource>) -> Self {
        Self {
            media: Some(media),
            ..Self::default()
        }
    }

    pub fn media_source(&self) -> Option<Arc<dyn MediaSource>> {
        self.media.clone()
    }

    /// Offer a stream to every peer that connects after this call
    pub fn add_stream(&self, name: Option<&str>, source: StreamSource) -> Result<()> {
        let future = source.into_future(self.media.clone())?;
        let name = name.unwrap_or(DEFAULT_STREAM).to_string();
        self.streams.lock().insert(name, future);
        Ok(())
    }

    /// Offer a data channel to every peer that connects after this call
    pub fn add_data_channel(&self, name: Option<&str>, options: Option<ChannelOptions>) {
        let name = name.unwrap_or(DEFAULT_CHANNEL).to_string();
        self.channels
            .lock()
            .insert(name, options.unwrap_or_default());
    }

    pub(crate) fn streams(&self) -> HashMap<String, StreamFuture> {
        self.streams.lock().clone()
    }

    pub(crate) fn channels(&self) -> HashMap<String, ChannelOptions> {
        self.channels.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Stream;

    #[test]
    fn defaults_names_and_options() {
        let local = LocalPeer::new();
        local
            .add_stream(None, Stream::with_id("s1", vec![]).into())
            .unwrap();
        local.add_data_channel(None, None);
        local.add_data_channel(Some("game"), Some(ChannelOptions::unreliable(0)));

        assert!(local.streams().contains_key(DEFAULT_STREAM));
        let channels = local.channels();
        assert_eq!(channels[DEFAULT_CHANNEL], ChannelOptions::default());
        assert!(!channels["game"].ordered);
    }

    #[test]
    fn capture_needs_media_source() {
        let local = LocalPeer::new();
        let err = local
            .add_stream(Some("camera"), crate::resource::StreamConfig::default().into())
            .unwrap_err();
        assert!(err.is_usage_error());
        assert!(local.streams().is_empty());
    }
}
