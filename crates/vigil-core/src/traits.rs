use crate::{error::VigilError, notification::StreamMetadata};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Opaque handle of a scheduled keep-alive task (the task-queue resource name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a delivered task name refers to this task. The queue reports
    /// either the full resource name or just the trailing task ID.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && last_segment(&self.0) == last_segment(name)
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authoritative answer to "is this channel actually live".
///
/// Implementations must not batch beyond what the remote API accepts; callers
/// already chunk their input.
#[async_trait]
pub trait LivenessSource: Send + Sync {
    /// Resolve channel logins to stable platform IDs. Unknown logins are
    /// absent from the returned map. Keys are lowercase logins.
    async fn resolve_ids(&self, logins: &[String]) -> Result<HashMap<String, String>, VigilError>;

    /// Return the subset of `ids` that is currently live.
    async fn live_ids(&self, ids: &[String]) -> Result<HashSet<String>, VigilError>;
}

/// External task queue that calls the keep-alive ping endpoint back.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Create a one-shot callback task due `delay` from now.
    async fn schedule_next_ping(&self, delay: Duration) -> Result<TaskHandle, VigilError>;

    /// Delete a scheduled task. A task that no longer exists is not an error.
    async fn delete_task(&self, handle: &TaskHandle) -> Result<(), VigilError>;
}

/// Authority over which channels the service cares about.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn is_channel_allowed(&self, login: &str) -> bool;

    /// Channels probed when every other signal says the service is idle.
    async fn monitored_channels(&self) -> Vec<String>;
}

/// Passive per-channel signals and cached stream metadata.
#[async_trait]
pub trait ChannelActivity: Send + Sync {
    /// Age of the most recent chat message seen in `channel`, if any.
    async fn most_recent_message_age(&self, channel: &str) -> Option<Duration>;

    /// Whether stream metadata is currently cached for `channel`.
    async fn has_cached_metadata(&self, channel: &str) -> bool;

    async fn record_metadata(&self, channel: &str, metadata: StreamMetadata);

    async fn clear_cached_metadata(&self, channel: &str);
}
