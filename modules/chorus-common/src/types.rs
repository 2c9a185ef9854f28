use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

// --- Posts ---

/// A single feed entry as served by the posts API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub comment: String,
    /// Unix seconds.
    pub created: i64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "avatar")]
    pub avatar_url: String,
    /// Identifiers of the actors who liked this post. Order carries no meaning.
    pub likes: Vec<String>,
}

impl Post {
    /// Serde already rejects missing fields; this catches the ones that
    /// decode fine but can't be keyed on.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.id.trim().is_empty() {
            return Err(PayloadError::MissingField("id"));
        }
        Ok(())
    }

    /// Decode a bare post from JSON and validate it.
    pub fn from_json(body: &str) -> Result<Self, PayloadError> {
        let post: Post = serde_json::from_str(body)?;
        post.validate()?;
        Ok(post)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    /// Timestamp as the feed renders it, e.g. "March 4 9:05:12 pm".
    pub fn created_label(&self) -> Option<String> {
        self.created_at()
            .map(|ts| ts.format("%B %-d %-I:%M:%S %P").to_string())
    }

    pub fn author_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Only the author gets a delete control for a post.
    ///
    /// Posts carry no author id, so this compares the name pair only. Two
    /// actors sharing a name both match here even when `is_author_of`
    /// tells their events apart by stable id.
    pub fn is_authored_by(&self, actor: &ActorIdentity) -> bool {
        self.first_name == actor.first_name && self.last_name == actor.last_name
    }

    pub fn is_liked_by(&self, liker: &str) -> bool {
        self.likes.iter().any(|l| l == liker)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }
}

/// Minimal projection used where only the key matters (removals).
#[derive(Debug, Clone, Deserialize)]
struct PostRef {
    id: String,
}

/// `{ "data": ... }` envelope used by every API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

// --- Identity ---

/// The local actor. Used for echo comparison and the status bar, never
/// stored in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

impl ActorIdentity {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// True when `meta` describes an action this actor took.
    ///
    /// Stable ids win when both sides have one. Otherwise the name pair is
    /// compared, so two actors sharing a full name see each other's events
    /// as echoes.
    pub fn is_author_of(&self, meta: &AuthorMeta) -> bool {
        match (&self.id, &meta.author_id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => {
                self.first_name == meta.author_first_name
                    && self.last_name == meta.author_last_name
            }
        }
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

/// Originating actor attached to every push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorMeta {
    pub author_first_name: String,
    pub author_last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

impl AuthorMeta {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            author_first_name: first_name.into(),
            author_last_name: last_name.into(),
            author_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.author_id = Some(id.into());
        self
    }
}

impl From<&ActorIdentity> for AuthorMeta {
    fn from(actor: &ActorIdentity) -> Self {
        Self {
            author_first_name: actor.first_name.clone(),
            author_last_name: actor.last_name.clone(),
            author_id: actor.id.clone(),
        }
    }
}

// --- Push events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Removed,
    Liked,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Removed, EventKind::Liked];

    /// Accepts the channel's event names plus the older short forms.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "created" | "create" => Some(EventKind::Created),
            "removed" | "remove" => Some(EventKind::Removed),
            "liked" | "like" => Some(EventKind::Liked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Removed => "removed",
            EventKind::Liked => "liked",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a push frame body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub data: T,
    pub meta: AuthorMeta,
}

/// A decoded push event from another (or the same) actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Created { post: Post, meta: AuthorMeta },
    Removed { id: String, meta: AuthorMeta },
    Liked { post: Post, meta: AuthorMeta },
}

impl PushEvent {
    /// Decode a raw `(kind, body)` frame. Fails on unknown kinds and on
    /// bodies that lack the fields the variant needs.
    pub fn decode(kind: &str, body: &str) -> Result<Self, PayloadError> {
        let kind = EventKind::parse(kind).ok_or_else(|| PayloadError::UnknownKind(kind.to_string()))?;

        match kind {
            EventKind::Created | EventKind::Liked => {
                let envelope: EventEnvelope<Post> = serde_json::from_str(body)?;
                envelope.data.validate()?;
                let EventEnvelope { data: post, meta } = envelope;
                Ok(if kind == EventKind::Created {
                    PushEvent::Created { post, meta }
                } else {
                    PushEvent::Liked { post, meta }
                })
            }
            EventKind::Removed => {
                let envelope: EventEnvelope<PostRef> = serde_json::from_str(body)?;
                if envelope.data.id.trim().is_empty() {
                    return Err(PayloadError::MissingField("id"));
                }
                Ok(PushEvent::Removed {
                    id: envelope.data.id,
                    meta: envelope.meta,
                })
            }
        }
    }

    /// Encode back into a `(kind, body)` frame.
    pub fn encode(&self) -> Result<(EventKind, String), PayloadError> {
        let body = match self {
            PushEvent::Created { post, meta } | PushEvent::Liked { post, meta } => {
                serde_json::to_string(&EventEnvelope {
                    data: post,
                    meta: meta.clone(),
                })?
            }
            PushEvent::Removed { id, meta } => serde_json::to_string(&EventEnvelope {
                data: serde_json::json!({ "id": id }),
                meta: meta.clone(),
            })?,
        };
        Ok((self.kind(), body))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::Created { .. } => EventKind::Created,
            PushEvent::Removed { .. } => EventKind::Removed,
            PushEvent::Liked { .. } => EventKind::Liked,
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            PushEvent::Created { post, .. } | PushEvent::Liked { post, .. } => &post.id,
            PushEvent::Removed { id, .. } => id,
        }
    }

    pub fn meta(&self) -> &AuthorMeta {
        match self {
            PushEvent::Created { meta, .. }
            | PushEvent::Removed { meta, .. }
            | PushEvent::Liked { meta, .. } => meta,
        }
    }
}
