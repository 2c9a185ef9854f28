//! Feed state and the pure reducer that every write goes through.

use std::collections::HashSet;
use std::sync::Arc;

use chorus_common::{BusyMode, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityStatus {
    Online,
    #[default]
    Offline,
}

impl ConnectivityStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityStatus::Online)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectivityStatus::Online => "Online",
            ConnectivityStatus::Offline => "Offline",
        }
    }
}

/// Every change the feed state can undergo.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMutation {
    /// Swap in a freshly listed feed. Later duplicates of an id are dropped.
    ReplaceAll(Vec<Post>),
    /// Put a new post at the top. A post whose id is already present is
    /// replaced where it stands instead, so ids stay unique.
    InsertFront(Post),
    RemoveById(String),
    /// Wholesale replace of the post sharing this id. Unknown ids are a no-op.
    ReplaceById(Post),
    SetStatus(ConnectivityStatus),
    /// Push events were lost; the feed may lag the server until the next
    /// `ReplaceAll`.
    MarkStale,
    CommandIssued,
    CommandResolved,
}

/// What observers see: the ordered posts, the busy indicator, the link
/// status and whether the feed missed events. Cheap to clone; the post list is shared until the next write.
#[derive(Debug, Clone)]
pub struct FeedState {
    posts: Arc<Vec<Post>>,
    busy: bool,
    in_flight: usize,
    busy_mode: BusyMode,
    status: ConnectivityStatus,
    stale: bool,
}

impl FeedState {
    pub fn new(busy_mode: BusyMode) -> Self {
        Self {
            posts: Arc::new(Vec::new()),
            busy: false,
            in_flight: 0,
            busy_mode,
            status: ConnectivityStatus::default(),
            stale: false,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Shared handle to the current list. Never mutated in place, so it
    /// stays valid as a snapshot after later writes.
    pub fn snapshot(&self) -> Arc<Vec<Post>> {
        self.posts.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Commands issued and not yet resolved. Tracked in both busy modes.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn busy_mode(&self) -> BusyMode {
        self.busy_mode
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status
    }

    /// True after the push channel dropped events, until the next load.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Apply one mutation. Returns whether anything an observer can see
    /// changed, which decides if watchers are notified.
    pub fn reduce(&mut self, mutation: FeedMutation) -> bool {
        match mutation {
            FeedMutation::ReplaceAll(posts) => {
                let mut seen = HashSet::new();
                let posts: Vec<Post> = posts
                    .into_iter()
                    .filter(|p| seen.insert(p.id.clone()))
                    .collect();
                let was_stale = std::mem::replace(&mut self.stale, false);
                if *self.posts == posts {
                    return was_stale;
                }
                self.posts = Arc::new(posts);
                true
            }
            FeedMutation::InsertFront(post) => {
                if self.contains(&post.id) {
                    return self.replace(post);
                }
                let mut posts = Vec::with_capacity(self.posts.len() + 1);
                posts.push(post);
                posts.extend(self.posts.iter().cloned());
                self.posts = Arc::new(posts);
                true
            }
            FeedMutation::RemoveById(id) => {
                if !self.contains(&id) {
                    return false;
                }
                let posts = self.posts.iter().filter(|p| p.id != id).cloned().collect();
                self.posts = Arc::new(posts);
                true
            }
            FeedMutation::ReplaceById(post) => self.replace(post),
            FeedMutation::SetStatus(status) => {
                let changed = self.status != status;
                self.status = status;
                changed
            }
            FeedMutation::MarkStale => !std::mem::replace(&mut self.stale, true),
            FeedMutation::CommandIssued => {
                self.in_flight += 1;
                self.set_busy(true)
            }
            FeedMutation::CommandResolved => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let busy = match self.busy_mode {
                    BusyMode::Legacy => false,
                    BusyMode::Counted => self.in_flight > 0,
                };
                self.set_busy(busy)
            }
        }
    }

    fn replace(&mut self, post: Post) -> bool {
        match self.posts.iter().position(|p| p.id == post.id) {
            Some(idx) if self.posts[idx] != post => {
                let mut posts = self.posts.as_ref().clone();
                posts[idx] = post;
                self.posts = Arc::new(posts);
                true
            }
            _ => false,
        }
    }

    fn set_busy(&mut self, busy: bool) -> bool {
        let changed = self.busy != busy;
        self.busy = busy;
        changed
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(BusyMode::default())
    }
}
