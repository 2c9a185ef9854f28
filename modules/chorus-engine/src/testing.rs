// Test mocks for the feed engine.
//
// MockFeedApi (FeedApi) is a small stateful posts server: it keeps its own
// list, assigns ids, applies likes, and can be told to fail the next call
// of an operation or to hold every call until released.
//
// Plus helpers for building posts and identities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chorus_client::{ClientError, Result};
use chorus_common::{ActorIdentity, AuthorMeta, Post};
use tokio::sync::Semaphore;

use crate::traits::FeedApi;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub const LOCAL_FIRST: &str = "Ada";
pub const LOCAL_LAST: &str = "Byron";

/// The actor the engine under test runs as.
pub fn local_actor() -> ActorIdentity {
    ActorIdentity::new(LOCAL_FIRST, LOCAL_LAST)
}

pub fn local_meta() -> AuthorMeta {
    AuthorMeta::new(LOCAL_FIRST, LOCAL_LAST)
}

/// Someone else in the group.
pub fn remote_meta() -> AuthorMeta {
    AuthorMeta::new("Grace", "Hopper")
}

/// A post authored by the remote actor.
pub fn post(id: &str) -> Post {
    post_by(id, "Grace", "Hopper")
}

pub fn post_by(id: &str, first_name: &str, last_name: &str) -> Post {
    Post {
        id: id.to_string(),
        comment: format!("comment {id}"),
        created: 1_540_000_000,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        avatar_url: format!("https://example.com/{}.png", first_name.to_lowercase()),
        likes: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// MockFeedApi
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Like,
    Remove,
}

/// Failure to inject into the next call of an operation.
#[derive(Debug, Clone)]
pub enum Failure {
    Status(u16),
    Network,
    Malformed,
}

impl Failure {
    fn into_error(self) -> ClientError {
        match self {
            Failure::Status(status) => ClientError::Api {
                status,
                message: format!("mock status {status}"),
            },
            Failure::Network => ClientError::Network("mock connection refused".into()),
            Failure::Malformed => ClientError::Parse("missing field `firstName`".into()),
        }
    }
}

pub struct MockFeedApi {
    posts: Mutex<Vec<Post>>,
    author: (String, String),
    liker: String,
    next_id: AtomicU32,
    failures: Mutex<HashMap<Op, Failure>>,
    calls: Mutex<Vec<(Op, String)>>,
    gate: Option<Semaphore>,
}

impl MockFeedApi {
    pub fn new() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            author: (LOCAL_FIRST.to_string(), LOCAL_LAST.to_string()),
            liker: "ada".to_string(),
            next_id: AtomicU32::new(1),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Seed the server-side list.
    pub fn with_posts(self, posts: Vec<Post>) -> Self {
        *lock(&self.posts) = posts;
        self
    }

    /// Id the next created post gets; later ones count up from it.
    pub fn with_next_id(self, id: u32) -> Self {
        self.next_id.store(id, Ordering::SeqCst);
        self
    }

    /// Identifier added to `likes` by a like call.
    pub fn with_liker(mut self, liker: &str) -> Self {
        self.liker = liker.to_string();
        self
    }

    /// Hold every call until `release` hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(calls);
        }
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: Op, failure: Failure) {
        lock(&self.failures).insert(op, failure);
    }

    /// Every call received so far, with its argument.
    pub fn calls(&self) -> Vec<(Op, String)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        lock(&self.calls).iter().filter(|(o, _)| *o == op).count()
    }

    pub fn server_posts(&self) -> Vec<Post> {
        lock(&self.posts).clone()
    }

    async fn enter(&self, op: Op, arg: &str) -> Result<()> {
        lock(&self.calls).push((op, arg.to_string()));
        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        match lock(&self.failures).remove(&op) {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

impl Default for MockFeedApi {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl FeedApi for MockFeedApi {
    async fn list(&self) -> Result<Vec<Post>> {
        self.enter(Op::List, "").await?;
        Ok(self.server_posts())
    }

    async fn create(&self, comment: &str) -> Result<Post> {
        self.enter(Op::Create, comment).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let mut created = post_by(&id, &self.author.0, &self.author.1);
        created.comment = comment.to_string();
        lock(&self.posts).insert(0, created.clone());
        Ok(created)
    }

    async fn like(&self, id: &str) -> Result<Post> {
        self.enter(Op::Like, id).await?;
        let mut posts = lock(&self.posts);
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("post {id} not found"),
            })?;
        if !post.is_liked_by(&self.liker) {
            post.likes.push(self.liker.clone());
        }
        Ok(post.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.enter(Op::Remove, id).await?;
        lock(&self.posts).retain(|p| p.id != id);
        Ok(())
    }
}
