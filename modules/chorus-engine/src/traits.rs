// Trait seams for the engine's two transports.
//
// FeedApi covers the request/response posts API, PushChannel the push
// channel. FeedClient and LocalChannel implement them here; tests swap in
// MockFeedApi from `testing`.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_client::{FeedClient, LocalChannel, Result, SignalStream};
use chorus_common::Post;

// ---------------------------------------------------------------------------
// FeedApi
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Post>>;

    async fn create(&self, comment: &str) -> Result<Post>;

    /// Returns the post with the caller's like applied.
    async fn like(&self, id: &str) -> Result<Post>;

    async fn remove(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl FeedApi for FeedClient {
    async fn list(&self) -> Result<Vec<Post>> {
        FeedClient::list(self).await
    }

    async fn create(&self, comment: &str) -> Result<Post> {
        FeedClient::create(self, comment).await
    }

    async fn like(&self, id: &str) -> Result<Post> {
        FeedClient::like(self, id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        FeedClient::remove(self, id).await
    }
}

#[async_trait]
impl<A: FeedApi + ?Sized> FeedApi for Arc<A> {
    async fn list(&self) -> Result<Vec<Post>> {
        (**self).list().await
    }

    async fn create(&self, comment: &str) -> Result<Post> {
        (**self).create(comment).await
    }

    async fn like(&self, id: &str) -> Result<Post> {
        (**self).like(id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        (**self).remove(id).await
    }
}

// ---------------------------------------------------------------------------
// PushChannel
// ---------------------------------------------------------------------------

/// A push channel client the engine owns for the lifetime of a
/// subscription: connect, subscribe to one group, later unsubscribe and
/// disconnect.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Join a group. The stream carries link signals and the group's frames.
    async fn subscribe(&self, group_id: &str) -> Result<SignalStream>;

    /// Leave a group. Must succeed when the group was never joined.
    async fn unsubscribe(&self, group_id: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl PushChannel for LocalChannel {
    async fn connect(&self) -> Result<()> {
        LocalChannel::connect(self);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        LocalChannel::is_connected(self)
    }

    async fn subscribe(&self, group_id: &str) -> Result<SignalStream> {
        self.join(group_id)
    }

    async fn unsubscribe(&self, group_id: &str) -> Result<()> {
        self.leave(group_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        LocalChannel::disconnect(self);
        Ok(())
    }
}
