//! Applying decoded stream events to the lifecycle state.
//!
//! Runs after the webhook has already been acknowledged.

use super::Gateway;
use tracing::{debug, info, warn};
use vigil_core::{
    notification::{StreamEvent, StreamMetadata},
    traits::{ChannelActivity, ChannelDirectory},
};

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Channel is not on the allow-list; nothing changed.
    NotAllowed,
    WentLive,
    WentOffline { keepalive_stopped: bool },
}

impl Gateway {
    pub async fn handle_event(&self, event: StreamEvent) -> EventDisposition {
        let channel = event.channel();
        if !self.activity.is_channel_allowed(&channel).await {
            info!(channel = %channel, "gateway: event for channel not on allow-list, ignoring");
            return EventDisposition::NotAllowed;
        }

        match event {
            StreamEvent::Online(online) => {
                self.state.on_stream_status_change(&channel, true);
                self.activity
                    .record_metadata(&channel, StreamMetadata::from(&online))
                    .await;
                if self.config.keepalive.enabled {
                    self.keepalive.start().await;
                }
                EventDisposition::WentLive
            }
            StreamEvent::Offline(_) => {
                self.state.on_stream_status_change(&channel, false);
                self.activity.clear_cached_metadata(&channel).await;
                let keepalive_stopped = self.stop_if_idle().await;
                EventDisposition::WentOffline { keepalive_stopped }
            }
        }
    }

    /// After an offline event: stop the keep-alive once nothing is live,
    /// checking passive signals first in case an online event was missed.
    async fn stop_if_idle(&self) -> bool {
        if !self.state.is_empty() {
            debug!(active = self.state.len(), "gateway: streams still active");
            return false;
        }
        match self.reconciler.discover_when_idle().await {
            Ok(live) if live.is_empty() => {
                self.keepalive.stop().await;
                true
            }
            Ok(live) => {
                info!(live = %live.join(","), "gateway: other streams still live, keeping warm");
                false
            }
            Err(e) => {
                warn!("gateway: discovery failed, leaving shutdown to the next ping: {e}");
                false
            }
        }
    }
}
