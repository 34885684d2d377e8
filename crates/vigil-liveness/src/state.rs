//! Lifecycle state: the process's belief about which channels are live.
//!
//! Not persisted. After a restart the set starts empty and liveness has to be
//! rediscovered from the authoritative source.

use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::info;

/// Set of lowercase channel logins believed live.
#[derive(Debug, Default)]
pub struct LifecycleState {
    active: Mutex<BTreeSet<String>>,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a live/offline transition. Idempotent; returns whether membership changed.
    pub fn on_stream_status_change(&self, channel: &str, is_live: bool) -> bool {
        let channel = channel.trim().to_lowercase();
        if channel.is_empty() {
            return false;
        }
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let changed = if is_live {
            active.insert(channel.clone())
        } else {
            active.remove(&channel)
        };
        if changed {
            info!(
                channel = %channel,
                live = is_live,
                active = active.len(),
                "lifecycle: stream status changed"
            );
        }
        changed
    }

    /// Snapshot of the active set, sorted. Stale as soon as it is returned.
    pub fn active_streams(&self) -> Vec<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&channel.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Manual clear. Returns the channels that were removed.
    pub fn clear(&self) -> Vec<String> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let removed: Vec<String> = std::mem::take(&mut *active).into_iter().collect();
        if !removed.is_empty() {
            info!("lifecycle: cleared {} active streams", removed.len());
        }
        removed
    }

    /// Back to process-start state.
    pub fn reset(&self) {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
