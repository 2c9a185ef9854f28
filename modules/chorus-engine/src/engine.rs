//! The reconciliation engine.
//!
//! Two sources write to the feed: the results of this actor's own commands
//! and push events from everyone in the group. Both go through the same
//! reducer. Push events this actor caused are dropped, because the command
//! path already applied them.

use std::sync::Arc;

use chorus_client::{ChannelSignal, ClientError};
use chorus_common::{ActorIdentity, BusyMode, Config, Post, PushEvent};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::state::{ConnectivityStatus, FeedMutation, FeedState};
use crate::traits::FeedApi;

/// Engine-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Push channel group this feed belongs to.
    pub group_id: String,
    pub busy_mode: BusyMode,
}

impl EngineConfig {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            busy_mode: BusyMode::default(),
        }
    }

    pub fn with_busy_mode(mut self, busy_mode: BusyMode) -> Self {
        self.busy_mode = busy_mode;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.group_id).with_busy_mode(config.busy_mode)
    }
}

/// Outcome of handing one push event to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The feed changed.
    Applied,
    /// The event reports this actor's own action and was dropped.
    Echo,
    /// Nothing to do: unknown id, or the feed already matched.
    Unchanged,
}

pub struct FeedEngine<A> {
    api: A,
    identity: ActorIdentity,
    config: EngineConfig,
    state: watch::Sender<FeedState>,
}

impl<A: FeedApi> FeedEngine<A> {
    pub fn new(api: A, identity: ActorIdentity, config: EngineConfig) -> Self {
        let (state, _) = watch::channel(FeedState::new(config.busy_mode));
        Self {
            api,
            identity,
            config,
            state,
        }
    }

    /// Convenience for sharing with a subscription.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observe the feed. The receiver is notified once per visible change.
    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Current state. Cheap: the post list is shared, not copied.
    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn posts(&self) -> Arc<Vec<Post>> {
        self.state.borrow().snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_busy()
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.state.borrow().status()
    }

    // --- Commands ---

    /// Replace the feed with the server's list. Returns how many posts it
    /// holds afterwards.
    pub async fn load(&self) -> Result<usize> {
        let busy = self.begin_command();
        let posts = self
            .api
            .list()
            .await
            .map_err(|e| command_failed("load", None, e))?;

        busy.finish(Some(FeedMutation::ReplaceAll(posts)));
        let count = self.state.borrow().len();
        info!(count, "Loaded feed");
        Ok(count)
    }

    /// Create a post and put it at the top of the feed.
    pub async fn create_post(&self, comment: &str) -> Result<Post> {
        if comment.trim().is_empty() {
            return Err(EngineError::EmptyComment);
        }

        let busy = self.begin_command();
        let post = self
            .api
            .create(comment)
            .await
            .map_err(|e| command_failed("create", None, e))?;

        busy.finish(Some(FeedMutation::InsertFront(post.clone())));
        debug!(post_id = %post.id, "Created post");
        Ok(post)
    }

    /// Like a post and swap in the server's updated copy. The request is
    /// sent even when the id is not in the local feed; the server decides.
    pub async fn like_post(&self, id: &str) -> Result<Post> {
        if !self.state.borrow().contains(id) {
            debug!(post_id = id, "Liking a post missing from the local feed");
        }

        let busy = self.begin_command();
        let post = self
            .api
            .like(id)
            .await
            .map_err(|e| command_failed("like", Some(id), e))?;

        let applied = busy.finish(Some(FeedMutation::ReplaceById(post.clone())));
        debug!(post_id = %post.id, likes = post.like_count(), applied, "Liked post");
        Ok(post)
    }

    /// Delete a post, then drop it from the feed. Deleting an id the feed
    /// doesn't hold still succeeds.
    pub async fn delete_post(&self, id: &str) -> Result<()> {
        let busy = self.begin_command();
        self.api
            .remove(id)
            .await
            .map_err(|e| command_failed("delete", Some(id), e))?;

        let applied = busy.finish(Some(FeedMutation::RemoveById(id.to_string())));
        debug!(post_id = id, applied, "Deleted post");
        Ok(())
    }

    // --- Push events ---

    /// Apply one push event unless this actor caused it.
    pub fn ingest(&self, event: PushEvent) -> Ingest {
        let kind = event.kind();

        if self.identity.is_author_of(event.meta()) {
            debug!(%kind, post_id = event.post_id(), "Dropped echo of own action");
            return Ingest::Echo;
        }

        let post_id = event.post_id().to_string();
        let mutation = match event {
            PushEvent::Created { post, .. } => FeedMutation::InsertFront(post),
            PushEvent::Removed { id, .. } => FeedMutation::RemoveById(id),
            PushEvent::Liked { post, .. } => FeedMutation::ReplaceById(post),
        };

        if self.apply(mutation) {
            debug!(%kind, post_id = %post_id, "Applied push event");
            Ingest::Applied
        } else {
            debug!(%kind, post_id = %post_id, "Push event changed nothing");
            Ingest::Unchanged
        }
    }

    /// Decode a raw `(kind, body)` frame and ingest it. A frame that doesn't
    /// decode leaves the feed untouched.
    pub fn ingest_frame(&self, kind: &str, body: &str) -> Result<Ingest> {
        let event = PushEvent::decode(kind, body)?;
        Ok(self.ingest(event))
    }

    /// React to one signal from the push channel.
    pub fn handle_signal(&self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected => {
                self.set_status(ConnectivityStatus::Online);
            }
            ChannelSignal::Disconnected => {
                self.set_status(ConnectivityStatus::Offline);
            }
            ChannelSignal::Message { kind, body } => {
                if let Err(e) = self.ingest_frame(&kind, &body) {
                    warn!(kind = %kind, error = %e, "Dropped push frame");
                }
            }
            ChannelSignal::Gap { skipped } => {
                if self.apply(FeedMutation::MarkStale) {
                    warn!(skipped, "Push events lost, feed is stale until reloaded");
                }
            }
        }
    }

    pub fn set_status(&self, status: ConnectivityStatus) -> bool {
        let changed = self.apply(FeedMutation::SetStatus(status));
        if changed {
            info!(status = status.label(), "Connectivity changed");
        }
        changed
    }

    fn apply(&self, mutation: FeedMutation) -> bool {
        self.state.send_if_modified(|state| state.reduce(mutation))
    }

    fn begin_command(&self) -> BusyGuard<'_> {
        self.apply(FeedMutation::CommandIssued);
        BusyGuard {
            state: &self.state,
            armed: true,
        }
    }
}

fn command_failed(command: &'static str, post_id: Option<&str>, err: ClientError) -> EngineError {
    warn!(command, post_id = post_id.unwrap_or("-"), error = %err, "Feed command failed");
    EngineError::from(err)
}

/// Marks one command in flight. `finish` applies the command's result and
/// resolves it in a single write; dropping the guard unfinished (error or
/// cancelled future) only resolves it.
struct BusyGuard<'a> {
    state: &'a watch::Sender<FeedState>,
    armed: bool,
}

impl BusyGuard<'_> {
    /// Returns whether the mutation changed the feed.
    fn finish(mut self, mutation: Option<FeedMutation>) -> bool {
        self.armed = false;
        let mut applied = false;
        self.state.send_if_modified(|state| {
            applied = mutation.map_or(false, |m| state.reduce(m));
            let busy_changed = state.reduce(FeedMutation::CommandResolved);
            applied || busy_changed
        });
        applied
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .send_if_modified(|state| state.reduce(FeedMutation::CommandResolved));
        }
    }
}
