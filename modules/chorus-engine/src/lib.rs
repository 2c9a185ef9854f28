//! Feed reconciliation engine.
//!
//! Keeps one ordered, duplicate-free view of a shared feed while two
//! sources change it: results of the local actor's commands (create, like,
//! delete) and push events from the rest of the group. Observers watch a
//! single `FeedState` that also carries the busy indicator and the push
//! channel's connectivity.

pub mod engine;
pub mod error;
pub mod state;
pub mod subscription;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use engine::{EngineConfig, FeedEngine, Ingest};
pub use error::{EngineError, Result};
pub use state::{ConnectivityStatus, FeedMutation, FeedState};
pub use subscription::Subscription;
pub use traits::{FeedApi, PushChannel};

pub use chorus_common::BusyMode;
