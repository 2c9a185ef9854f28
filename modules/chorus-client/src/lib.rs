pub mod channel;
pub mod error;

pub use channel::{ChannelSignal, LocalChannel, LocalHub, SignalStream};
pub use error::{ClientError, Result};

use std::time::Duration;

use chorus_common::{ApiResponse, Config, Post};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    comment: &'a str,
}

/// REST client for the posts collection.
///
/// `base_url` points at the collection itself (`GET {base_url}` lists,
/// `PUT {base_url}/{id}` likes). Mutating calls carry the raw token in the
/// `Authorization` header.
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl FeedClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_timeout(
            &config.api_url,
            &config.api_token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Fetch the whole feed, newest first as the server orders it.
    pub async fn list(&self) -> Result<Vec<Post>> {
        let resp = self.client.get(&self.base_url).send().await?;

        let posts: Vec<Post> = Self::decode_data(resp).await?;
        for post in &posts {
            post.validate()?;
        }
        tracing::debug!(count = posts.len(), "Fetched posts");
        Ok(posts)
    }

    /// Create a post and return it as the server stored it.
    pub async fn create(&self, comment: &str) -> Result<Post> {
        let resp = self
            .client
            .post(&self.base_url)
            .header(AUTHORIZATION, &self.token)
            .json(&CreatePost { comment })
            .send()
            .await?;

        let post: Post = Self::decode_data(resp).await?;
        post.validate()?;
        tracing::debug!(post_id = %post.id, "Created post");
        Ok(post)
    }

    /// Toggle the caller's like on a post. Returns the updated post.
    pub async fn like(&self, id: &str) -> Result<Post> {
        let url = format!("{}/{}", self.base_url, id);
        let resp = self
            .client
            .put(&url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        let post: Post = Self::decode_data(resp).await?;
        post.validate()?;
        tracing::debug!(post_id = %post.id, likes = post.like_count(), "Liked post");
        Ok(post)
    }

    /// Delete a post. Any success status counts; the body is ignored.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, id);
        let resp = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        Self::ensure_success(resp).await?;
        tracing::debug!(post_id = id, "Removed post");
        Ok(())
    }

    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// Unwrap the `{ data }` envelope. Body is read as text first so a
    /// malformed payload surfaces as `Parse`, not `Network`.
    async fn decode_data<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let resp = Self::ensure_success(resp).await?;
        let body = resp.text().await?;
        let api_resp: ApiResponse<T> = serde_json::from_str(&body)?;
        Ok(api_resp.data)
    }
}
