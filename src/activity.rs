//! In-process channel directory and activity tracker.
//!
//! The allow-list comes from config. Chat activity is reported by the chat
//! side through the admin API; stream metadata is recorded on online events.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use vigil_core::{
    config::ChannelsConfig,
    notification::StreamMetadata,
    traits::{ChannelActivity, ChannelDirectory},
};

pub struct ActivityTracker {
    /// Normalized allow-list. Empty allows every channel.
    allowed: Vec<String>,
    last_message: Mutex<HashMap<String, Instant>>,
    metadata: Mutex<HashMap<String, StreamMetadata>>,
}

impl ActivityTracker {
    pub fn new(config: &ChannelsConfig) -> Self {
        Self {
            allowed: config.normalized(),
            last_message: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Note a chat message seen in `channel` just now.
    pub fn record_message(&self, channel: &str) {
        self.record_message_at(channel, Instant::now());
    }

    pub fn record_message_at(&self, channel: &str, at: Instant) {
        let channel = channel.trim().to_lowercase();
        if channel.is_empty() {
            return;
        }
        let mut seen = self.last_message.lock().unwrap_or_else(|e| e.into_inner());
        let entry = seen.entry(channel).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// Cached metadata for `channel`, if any.
    pub fn metadata(&self, channel: &str) -> Option<StreamMetadata> {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel.to_lowercase())
            .cloned()
    }

    #[cfg(test)]
    pub fn reset(&self) {
        self.last_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.metadata.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl ChannelDirectory for ActivityTracker {
    async fn is_channel_allowed(&self, login: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&login.trim().to_lowercase())
    }

    async fn monitored_channels(&self) -> Vec<String> {
        self.allowed.clone()
    }
}

#[async_trait]
impl ChannelActivity for ActivityTracker {
    async fn most_recent_message_age(&self, channel: &str) -> Option<Duration> {
        self.last_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel.to_lowercase())
            .map(|at| at.elapsed())
    }

    async fn has_cached_metadata(&self, channel: &str) -> bool {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&channel.to_lowercase())
    }

    async fn record_metadata(&self, channel: &str, metadata: StreamMetadata) {
        debug!(channel = %channel, kind = %metadata.kind, "activity: stream metadata cached");
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel.to_lowercase(), metadata);
    }

    async fn clear_cached_metadata(&self, channel: &str) {
        let removed = self
            .metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&channel.to_lowercase());
        if removed.is_some() {
            debug!(channel = %channel, "activity: stream metadata cleared");
        }
    }
}
