//! Name-addressed resources that may be requested before they arrive
//!
//! The transport delivers streams and channels keyed by an opaque id, while
//! the remote peer announces over signaling which name each id stands for.
//! The two arrive on independent channels in no particular order, so a
//! collection accepts either first and hands out futures keyed by name.

use crate::error::{Error, Result};
use crate::resource::{DataChannel, Resource, Stream};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Eventual value of a named resource
///
/// Settles once the name resolves and stays pending otherwise.
pub type ResourceFuture<R> = Shared<BoxFuture<'static, R>>;

/// Named streams of one remote peer
pub type StreamCollection = ResourceCollection<Stream>;

/// Named data channels of one remote peer
pub type ChannelCollection = ResourceCollection<DataChannel>;

struct Slot<R> {
    sender: Option<oneshot::Sender<R>>,
    future: ResourceFuture<R>,
    value: Option<R>,
}

impl<R: Resource> Slot<R> {
    fn pending() -> Self {
        let (sender, receiver) = oneshot::channel();
        let future = async move {
            match receiver.await {
                Ok(value) => value,
                // collection went away before the name resolved
                Err(_) => futures::future::pending().await,
            }
        }
        .boxed()
        .shared();
        Self {
            sender: Some(sender),
            future,
            value: None,
        }
    }
}

struct Inner<R: Resource> {
    slots: HashMap<String, Slot<R>>,
    /// transport key -> name, from the remote's announcements
    remote: HashMap<String, String>,
    local: BTreeMap<String, R::Announcement>,
    /// arrived before the remote announced their key
    queued: Vec<R>,
}

impl<R: Resource> Inner<R> {
    fn settle(&mut self, name: &str, value: R) -> Result<()> {
        let slot = self
            .slots
            .entry(name.to_string())
            .or_insert_with(Slot::pending);
        let Some(sender) = slot.sender.take() else {
            return Err(Error::DuplicateResolution {
                name: name.to_string(),
            });
        };
        slot.value = Some(value.clone());
        // the slot keeps its own receiver alive through `future`
        let _ = sender.send(value);
        Ok(())
    }
}

/// Maps names to eventual resources delivered by the transport
pub struct ResourceCollection<R: Resource> {
    kind: &'static str,
    inner: Mutex<Inner<R>>,
}

impl<R: Resource> ResourceCollection<R> {
    /// Empty collection; `kind` only labels log output
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                remote: HashMap::new(),
                local: BTreeMap::new(),
                queued: Vec::new(),
            }),
        }
    }

    /// Eventual value for `name`
    ///
    /// Every call for the same name shares one underlying entry, before and
    /// after resolution.
    pub fn get(&self, name: &str) -> ResourceFuture<R> {
        let mut inner = self.inner.lock();
        inner
            .slots
            .entry(name.to_string())
            .or_insert_with(Slot::pending)
            .future
            .clone()
    }

    /// Feed an object delivered by the transport
    ///
    /// Objects whose key the remote has not announced yet are queued until
    /// [`update`](Self::update) introduces it. Resolving a name twice is an
    /// error and leaves the first value in place.
    pub fn resolve(&self, value: R) -> Result<()> {
        let key = value.key();
        let mut inner = self.inner.lock();
        match inner.remote.get(&key).cloned() {
            Some(name) => {
                debug!(kind = self.kind, %name, %key, "resolved");
                inner.settle(&name, value)
            }
            None => {
                debug!(kind = self.kind, %key, "queued until announced");
                inner.queued.push(value);
                Ok(())
            }
        }
    }

    /// Merge newly announced `name -> announcement` pairs from the remote
    /// and match any queued objects against them
    pub fn update(&self, descriptor: &BTreeMap<String, R::Announcement>) {
        let mut inner = self.inner.lock();
        for (name, announcement) in descriptor {
            let key = R::announced_key(name, announcement);
            inner.remote.insert(key, name.clone());
        }

        for value in std::mem::take(&mut inner.queued) {
            let key = value.key();
            match inner.remote.get(&key).cloned() {
                Some(name) => {
                    debug!(kind = self.kind, %name, %key, "resolved queued");
                    if let Err(err) = inner.settle(&name, value) {
                        warn!(kind = self.kind, %key, %err, "dropping duplicate delivery");
                    }
                }
                None => inner.queued.push(value),
            }
        }
    }

    /// Same as [`update`](Self::update); the channel-side name for it
    pub fn set_remote(&self, descriptor: &BTreeMap<String, R::Announcement>) {
        self.update(descriptor);
    }

    /// Record what we announced for our own resources
    ///
    /// Bookkeeping only, resolution is driven by the remote's announcements.
    pub fn set_local(&self, descriptor: BTreeMap<String, R::Announcement>) {
        self.inner.lock().local = descriptor;
    }

    /// Last descriptor passed to [`set_local`](Self::set_local)
    pub fn local(&self) -> BTreeMap<String, R::Announcement> {
        self.inner.lock().local.clone()
    }

    /// Resolved value for `name`, if any
    pub fn value(&self, name: &str) -> Option<R> {
        self.inner
            .lock()
            .slots
            .get(name)
            .and_then(|slot| slot.value.clone())
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Number of delivered objects still waiting for an announcement
    pub fn queued(&self) -> usize {
        self.inner.lock().queued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelOptions;

    fn descriptor(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, key)| (name.to_string(), key.to_string()))
            .collect()
    }

    #[test]
    fn get_before_announce_and_delivery() {
        let streams = StreamCollection::new("stream");
        let pending = streams.get("video");
        assert!(pending.clone().now_or_never().is_none());

        streams.update(&descriptor(&[("video", "s1")]));
        assert!(pending.clone().now_or_never().is_none());

        let stream = Stream::with_id("s1", vec![]);
        streams.resolve(stream.clone()).unwrap();
        assert!(pending.now_or_never().unwrap().ptr_eq(&stream));
    }

    #[test]
    fn delivery_before_announce_is_queued() {
        let streams = StreamCollection::new("stream");
        let stream = Stream::with_id("s1", vec![]);
        streams.resolve(stream.clone()).unwrap();
        assert_eq!(streams.queued(), 1);
        assert!(!streams.is_resolved("video"));

        let pending = streams.get("video");
        streams.update(&descriptor(&[("other", "s2")]));
        assert_eq!(streams.queued(), 1);

        streams.update(&descriptor(&[("video", "s1")]));
        assert_eq!(streams.queued(), 0);
        assert!(pending.now_or_never().unwrap().ptr_eq(&stream));
    }

    #[test]
    fn get_after_resolution_returns_cached_value() {
        let streams = StreamCollection::new("stream");
        let stream = Stream::with_id("s1", vec![]);
        streams.update(&descriptor(&[("video", "s1")]));
        streams.resolve(stream.clone()).unwrap();

        // nobody was waiting, the value is kept for later lookups
        assert!(streams.value("video").unwrap().ptr_eq(&stream));
        for _ in 0..3 {
            let got = streams.get("video").now_or_never().unwrap();
            assert!(got.ptr_eq(&stream));
        }
    }

    #[test]
    fn all_waiters_see_the_same_value() {
        let streams = StreamCollection::new("stream");
        let waiters: Vec<_> = (0..5).map(|_| streams.get("video")).collect();
        streams.update(&descriptor(&[("video", "s1")]));
        let stream = Stream::with_id("s1", vec![]);
        streams.resolve(stream.clone()).unwrap();

        for waiter in waiters {
            assert!(waiter.now_or_never().unwrap().ptr_eq(&stream));
        }
    }

    #[test]
    fn second_resolution_is_rejected() {
        let streams = StreamCollection::new("stream");
        streams.update(&descriptor(&[("video", "s1")]));
        let first = Stream::with_id("s1", vec![]);
        streams.resolve(first.clone()).unwrap();

        let err = streams
            .resolve(Stream::with_id("s1", vec![]))
            .unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateResolution {
                name: "video".into()
            }
        );
        assert!(streams.get("video").now_or_never().unwrap().ptr_eq(&first));
    }

    #[test]
    fn duplicate_in_queue_is_dropped() {
        let streams = StreamCollection::new("stream");
        let first = Stream::with_id("s1", vec![]);
        streams.resolve(first.clone()).unwrap();
        streams.resolve(Stream::with_id("s1", vec![])).unwrap();
        streams.update(&descriptor(&[("video", "s1")]));

        assert_eq!(streams.queued(), 0);
        assert!(streams.value("video").unwrap().ptr_eq(&first));
    }

    #[test]
    fn channels_match_by_label() {
        let channels = ChannelCollection::new("channel");
        let chat = channels.get("chat");
        let channel = DataChannel::new("chat", ChannelOptions::default());
        channels.resolve(channel.clone()).unwrap();
        assert!(chat.clone().now_or_never().is_none());

        let mut remote = BTreeMap::new();
        remote.insert("chat".to_string(), ChannelOptions::default());
        channels.set_remote(&remote);
        assert!(chat.now_or_never().unwrap().ptr_eq(&channel));
    }

    #[test]
    fn local_descriptor_does_not_resolve() {
        let streams = StreamCollection::new("stream");
        streams.set_local(descriptor(&[("video", "s1")]));
        streams.resolve(Stream::with_id("s1", vec![])).unwrap();

        assert_eq!(streams.local(), descriptor(&[("video", "s1")]));
        assert_eq!(streams.queued(), 1);
        assert!(!streams.is_resolved("video"));
    }
}
