//! In-process push channel.
//!
//! `LocalHub` plays the server: it fans frames out to every connection that
//! joined a group. `LocalChannel` is one client connection to a hub, with
//! its own link state. Dropping the link on one connection leaves the
//! others untouched, so several actors can share a hub in tests.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chorus_common::PushEvent;
use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

const DEFAULT_CAPACITY: usize = 256;

/// Everything a channel stream can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Disconnected,
    Message { kind: String, body: String },
    /// The receiver fell behind and `skipped` frames were lost. Whatever
    /// they carried is missing from the stream.
    Gap { skipped: u64 },
}

pub type SignalStream = Pin<Box<dyn Stream<Item = ChannelSignal> + Send>>;

#[derive(Debug, Clone)]
enum Target {
    /// Group frame, addressed to the connections that were joined and
    /// linked when it was published.
    Group {
        group: String,
        recipients: Arc<HashSet<u64>>,
    },
    Connection(u64),
}

#[derive(Debug, Clone)]
struct Frame {
    target: Target,
    signal: ChannelSignal,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// LocalHub
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HubInner {
    sender: broadcast::Sender<Frame>,
    /// Group id -> joined connection ids.
    members: Mutex<HashMap<String, HashSet<u64>>>,
    /// Connection ids whose link is up.
    online: Mutex<HashSet<u64>>,
    next_connection: AtomicU64,
}

/// Server side of the in-process channel. Clones share one hub.
#[derive(Debug, Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                sender,
                members: Mutex::new(HashMap::new()),
                online: Mutex::new(HashSet::new()),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client connection. It starts disconnected.
    pub fn channel(&self) -> LocalChannel {
        let id = self.inner.next_connection.fetch_add(1, Ordering::SeqCst);
        LocalChannel {
            hub: self.clone(),
            id,
        }
    }

    /// Number of connections currently joined to `group_id`.
    pub fn members_of(&self, group_id: &str) -> usize {
        lock(&self.inner.members)
            .get(group_id)
            .map_or(0, HashSet::len)
    }

    /// Push a raw frame to a group. It reaches the connections joined to
    /// the group with their link up at this moment. Returns how many.
    pub fn publish(&self, group_id: &str, kind: &str, body: impl Into<String>) -> usize {
        let recipients: HashSet<u64> = {
            let members = lock(&self.inner.members);
            let online = lock(&self.inner.online);
            members
                .get(group_id)
                .map(|joined| joined.intersection(&online).copied().collect())
                .unwrap_or_default()
        };
        let count = recipients.len();
        if count == 0 {
            debug!(group_id, kind, "No live members, frame dropped");
            return 0;
        }

        self.send(
            Target::Group {
                group: group_id.to_string(),
                recipients: Arc::new(recipients),
            },
            ChannelSignal::Message {
                kind: kind.to_string(),
                body: body.into(),
            },
        );
        count
    }

    /// Encode and push a typed event.
    pub fn publish_event(&self, group_id: &str, event: &PushEvent) -> Result<usize> {
        let (kind, body) = event.encode()?;
        Ok(self.publish(group_id, kind.as_str(), body))
    }

    fn send(&self, target: Target, signal: ChannelSignal) {
        // No open streams is not an error for a push channel.
        let _ = self.inner.sender.send(Frame { target, signal });
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LocalChannel
// ---------------------------------------------------------------------------

/// One client connection to a `LocalHub`. Clones share the connection.
#[derive(Debug, Clone)]
pub struct LocalChannel {
    hub: LocalHub,
    id: u64,
}

impl LocalChannel {
    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.hub.inner.online).contains(&self.id)
    }

    /// Bring the link up. This connection's streams see `Connected`.
    pub fn connect(&self) {
        if lock(&self.hub.inner.online).insert(self.id) {
            debug!(connection = self.id, "Local channel connected");
            self.hub
                .send(Target::Connection(self.id), ChannelSignal::Connected);
        }
    }

    /// Drop the link. Streams see `Disconnected` and stay open, so a later
    /// `connect` reaches them again. Frames published while the link is
    /// down never reach this connection; frames already in flight still do.
    pub fn disconnect(&self) {
        if lock(&self.hub.inner.online).remove(&self.id) {
            debug!(connection = self.id, "Local channel disconnected");
            self.hub
                .send(Target::Connection(self.id), ChannelSignal::Disconnected);
        }
    }

    /// Join `group_id` and return the stream of frames for this connection.
    pub fn join(&self, group_id: &str) -> Result<SignalStream> {
        if !self.is_connected() {
            return Err(ClientError::Channel(format!(
                "cannot join {group_id}: channel is not connected"
            )));
        }

        let mut rx = self.hub.inner.sender.subscribe();
        lock(&self.hub.inner.members)
            .entry(group_id.to_string())
            .or_default()
            .insert(self.id);
        debug!(connection = self.id, group_id, "Joined group");

        let id = self.id;
        let group = group_id.to_string();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(Frame { target: Target::Connection(to), signal }) => {
                        if to == id {
                            yield signal;
                        }
                    }
                    Ok(Frame { target: Target::Group { group: g, recipients }, signal }) => {
                        if g == group && recipients.contains(&id) {
                            yield signal;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(group_id = %group, skipped, "Channel receiver lagged, frames dropped");
                        yield ChannelSignal::Gap { skipped };
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    /// Leave `group_id`. Leaving a group that was never joined is a no-op.
    pub fn leave(&self, group_id: &str) {
        let mut members = lock(&self.hub.inner.members);
        let Some(joined) = members.get_mut(group_id) else {
            return;
        };
        if !joined.remove(&self.id) {
            return;
        }
        if joined.is_empty() {
            members.remove(group_id);
        }
        debug!(connection = self.id, group_id, "Left group");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn message(kind: &str) -> ChannelSignal {
        ChannelSignal::Message {
            kind: kind.into(),
            body: "{}".into(),
        }
    }

    #[tokio::test]
    async fn join_requires_connection() {
        let channel = LocalHub::new().channel();
        assert!(matches!(channel.join("g"), Err(ClientError::Channel(_))));
    }

    #[tokio::test]
    async fn frames_reach_only_their_group() {
        let hub = LocalHub::new();
        let channel = hub.channel();
        channel.connect();
        let mut a = channel.join("a").unwrap();
        let mut b = channel.join("b").unwrap();

        hub.publish("a", "created", "{}");
        hub.publish("b", "removed", "{}");

        assert_eq!(a.next().await, Some(message("created")));
        assert_eq!(b.next().await, Some(message("removed")));
    }

    #[tokio::test]
    async fn link_signals_stay_on_their_connection() {
        let hub = LocalHub::new();
        let first = hub.channel();
        let second = hub.channel();
        first.connect();
        second.connect();
        let mut first_stream = first.join("g").unwrap();
        let mut second_stream = second.join("g").unwrap();

        first.disconnect();
        first.connect();
        hub.publish("g", "liked", "{}");

        assert_eq!(first_stream.next().await, Some(ChannelSignal::Disconnected));
        assert_eq!(first_stream.next().await, Some(ChannelSignal::Connected));
        assert_eq!(first_stream.next().await, Some(message("liked")));
        // The other connection never saw the link flap.
        assert_eq!(second_stream.next().await, Some(message("liked")));
    }

    #[tokio::test]
    async fn left_group_gets_no_frames() {
        let hub = LocalHub::new();
        let channel = hub.channel();
        channel.connect();
        let mut stream = channel.join("g").unwrap();

        channel.leave("g");
        hub.publish("g", "created", "{}");
        channel.disconnect();

        assert_eq!(stream.next().await, Some(ChannelSignal::Disconnected));
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let hub = LocalHub::new();
        let channel = hub.channel();
        channel.connect();
        let _stream = channel.join("g").unwrap();
        assert_eq!(hub.members_of("g"), 1);

        channel.leave("g");
        channel.leave("g");
        assert_eq!(hub.members_of("g"), 0);
    }

    #[tokio::test]
    async fn frame_published_while_linked_survives_a_later_disconnect() {
        let hub = LocalHub::new();
        let channel = hub.channel();
        channel.connect();
        let mut stream = channel.join("g").unwrap();

        assert_eq!(hub.publish("g", "created", "{}"), 1);
        channel.disconnect();

        assert_eq!(stream.next().await, Some(message("created")));
        assert_eq!(stream.next().await, Some(ChannelSignal::Disconnected));
    }

    #[tokio::test]
    async fn frame_published_while_unlinked_is_not_replayed() {
        let hub = LocalHub::new();
        let channel = hub.channel();
        channel.connect();
        let mut stream = channel.join("g").unwrap();

        channel.disconnect();
        assert_eq!(hub.publish("g", "created", "{}"), 0);
        channel.connect();
        hub.publish("g", "liked", "{}");

        assert_eq!(stream.next().await, Some(ChannelSignal::Disconnected));
        assert_eq!(stream.next().await, Some(ChannelSignal::Connected));
        assert_eq!(stream.next().await, Some(message("liked")));
    }

    #[tokio::test]
    async fn lagging_stream_reports_the_gap() {
        let hub = LocalHub::with_capacity(1);
        let channel = hub.channel();
        channel.connect();
        let mut stream = channel.join("g").unwrap();

        hub.publish("g", "created", "{}");
        hub.publish("g", "removed", "{}");
        hub.publish("g", "liked", "{}");

        assert_eq!(stream.next().await, Some(ChannelSignal::Gap { skipped: 2 }));
        assert_eq!(stream.next().await, Some(message("liked")));
    }
}
