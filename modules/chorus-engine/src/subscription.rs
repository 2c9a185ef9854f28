//! Push channel subscription tied to an engine's active lifetime.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::FeedEngine;
use crate::error::Result;
use crate::state::ConnectivityStatus;
use crate::traits::{FeedApi, PushChannel};

impl<A: FeedApi + 'static> FeedEngine<A> {
    /// Connect the channel, join this feed's group and start applying its
    /// events. Events flow until the returned subscription is stopped or
    /// dropped.
    pub async fn start(self: &Arc<Self>, channel: Arc<dyn PushChannel>) -> Result<Subscription> {
        let group_id = self.config().group_id.clone();

        channel.connect().await?;
        let mut stream = match channel.subscribe(&group_id).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = channel.disconnect().await;
                return Err(e.into());
            }
        };
        if channel.is_connected() {
            self.set_status(ConnectivityStatus::Online);
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let engine = Arc::clone(self);
        let pump_group = group_id.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    signal = stream.next() => match signal {
                        Some(signal) => engine.handle_signal(signal),
                        None => {
                            warn!(group_id = %pump_group, "Push stream closed");
                            break;
                        }
                    },
                }
            }
            engine.set_status(ConnectivityStatus::Offline);
        });

        info!(group_id = %group_id, "Subscribed to feed events");
        Ok(Subscription {
            group_id,
            channel,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Live attachment to one group's push events.
///
/// `stop` leaves the group, disconnects and waits for the pump to finish.
/// Calling it again does nothing. Dropping an unstopped subscription shuts
/// the pump down and releases the channel in the background.
pub struct Subscription {
    group_id: String,
    channel: Arc<dyn PushChannel>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            debug!(group_id = %self.group_id, "Subscription already stopped");
            return Ok(());
        };

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = task.await {
            warn!(group_id = %self.group_id, error = %e, "Push pump ended abnormally");
        }

        // Disconnect even when leaving the group fails; the first error wins.
        let left = self.channel.unsubscribe(&self.group_id).await;
        let disconnected = self.channel.disconnect().await;
        if let Err(ref e) = left {
            warn!(group_id = %self.group_id, error = %e, "Unsubscribe failed");
        }
        left?;
        disconnected?;
        info!(group_id = %self.group_id, "Unsubscribed from feed events");
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            task.abort();
            return;
        };
        let channel = self.channel.clone();
        let group_id = std::mem::take(&mut self.group_id);
        runtime.spawn(async move {
            // The pump marks the feed offline on its way out.
            let _ = task.await;
            if let Err(e) = channel.unsubscribe(&group_id).await {
                warn!(group_id = %group_id, error = %e, "Unsubscribe on drop failed");
            }
            let _ = channel.disconnect().await;
        });
    }
}
