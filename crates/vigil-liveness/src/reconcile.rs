//! Reconciliation: cross-check the lifecycle state against the authoritative
//! source and remove phantom streams.
//!
//! Offline notifications are best-effort. A lost one leaves a channel marked
//! live forever unless something compares local belief with the platform, so
//! every keep-alive check runs a pass here first. The reconciler only ever
//! removes channels from the state.

use crate::state::LifecycleState;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vigil_core::{
    config::LivenessConfig,
    error::VigilError,
    traits::{ChannelActivity, ChannelDirectory, LivenessSource},
};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Channels that were in the state when the pass started.
    pub checked: Vec<String>,
    /// Checked channels the authoritative source reports live.
    pub live: Vec<String>,
    /// Checked channels that were not live and have been removed.
    pub phantoms: Vec<String>,
}

impl ReconcileOutcome {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

pub struct Reconciler {
    state: Arc<LifecycleState>,
    source: Arc<dyn LivenessSource>,
    directory: Arc<dyn ChannelDirectory>,
    activity: Arc<dyn ChannelActivity>,
    batch_size: usize,
    chat_recency: Duration,
    request_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        state: Arc<LifecycleState>,
        source: Arc<dyn LivenessSource>,
        directory: Arc<dyn ChannelDirectory>,
        activity: Arc<dyn ChannelActivity>,
        config: &LivenessConfig,
    ) -> Self {
        Self {
            state,
            source,
            directory,
            activity,
            batch_size: config.effective_batch_size(),
            chat_recency: config.chat_recency(),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn state(&self) -> &Arc<LifecycleState> {
        &self.state
    }

    /// Run one pass: resolve IDs, query liveness, drop phantoms.
    ///
    /// On lookup failure the state is left untouched and the error returned;
    /// a failed lookup is never evidence that a stream ended.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, VigilError> {
        let checked = self.state.active_streams();
        if checked.is_empty() {
            debug!("reconcile: no active streams, nothing to check");
            return Ok(ReconcileOutcome::default());
        }

        let live = match self.live_channels(&checked).await {
            Ok(live) => live,
            Err(e) => {
                warn!(
                    active = checked.len(),
                    "reconcile: authoritative lookup failed, keeping last known state: {e}"
                );
                return Err(e);
            }
        };

        let mut phantoms = Vec::new();
        for channel in &checked {
            if live.contains(channel) {
                continue;
            }
            warn!(channel = %channel, "reconcile: phantom stream detected, removing");
            self.state.on_stream_status_change(channel, false);
            self.activity.clear_cached_metadata(channel).await;
            phantoms.push(channel.clone());
        }

        let outcome = ReconcileOutcome {
            live: checked.iter().filter(|c| live.contains(*c)).cloned().collect(),
            checked,
            phantoms,
        };
        info!(
            checked = outcome.checked.len(),
            live = outcome.live.len(),
            phantoms = outcome.phantoms.len(),
            "reconcile: pass complete"
        );
        Ok(outcome)
    }

    /// Monitored channels with cached metadata or recent chat activity.
    pub async fn passive_signals(&self) -> Vec<String> {
        let mut signals = Vec::new();
        for channel in self.directory.monitored_channels().await {
            if self.activity.has_cached_metadata(&channel).await {
                debug!(channel = %channel, "passive signal: cached stream metadata");
                signals.push(channel);
                continue;
            }
            if let Some(age) = self.activity.most_recent_message_age(&channel).await {
                if age <= self.chat_recency {
                    debug!(channel = %channel, age_secs = age.as_secs(), "passive signal: recent chat");
                    signals.push(channel);
                }
            }
        }
        signals
    }

    /// Ask the authoritative source directly which of `channels` are live.
    pub async fn direct_check(&self, channels: &[String]) -> Result<Vec<String>, VigilError> {
        let mut logins: Vec<String> = channels.iter().map(|c| c.trim().to_lowercase()).collect();
        logins.retain(|c| !c.is_empty());
        logins.sort();
        logins.dedup();
        if logins.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.live_channels(&logins).await?.into_iter().collect())
    }

    /// Fallback discovery for an empty state.
    ///
    /// When passive signals hint at a stream the state never heard about
    /// (the online notification was lost), check those channels directly
    /// before concluding the service is idle. Returns the live channels found;
    /// returns the current state unchanged if it is not empty.
    pub async fn discover_when_idle(&self) -> Result<Vec<String>, VigilError> {
        if !self.state.is_empty() {
            return Ok(self.state.active_streams());
        }
        let candidates = self.passive_signals().await;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let live = self.direct_check(&candidates).await?;
        if live.is_empty() {
            info!(
                candidates = candidates.len(),
                "discovery: passive signals present but nothing live"
            );
        } else {
            info!(
                live = %live.join(","),
                "discovery: found live streams missing from lifecycle state"
            );
        }
        Ok(live)
    }

    /// Resolve logins to IDs and return the logins whose streams are live.
    async fn live_channels(&self, logins: &[String]) -> Result<BTreeSet<String>, VigilError> {
        let mut login_by_id: HashMap<String, String> = HashMap::new();
        for batch in logins.chunks(self.batch_size) {
            let resolved = self
                .bounded("user lookup", self.source.resolve_ids(batch))
                .await?;
            for (login, id) in resolved {
                login_by_id.insert(id, login.to_lowercase());
            }
        }
        if login_by_id.len() < logins.len() {
            debug!(
                requested = logins.len(),
                resolved = login_by_id.len(),
                "reconcile: some logins did not resolve"
            );
        }

        let ids: Vec<String> = login_by_id.keys().cloned().collect();
        let mut live = BTreeSet::new();
        for batch in ids.chunks(self.batch_size) {
            let live_ids = self
                .bounded("stream lookup", self.source.live_ids(batch))
                .await?;
            for id in live_ids {
                if let Some(login) = login_by_id.get(&id) {
                    live.insert(login.clone());
                }
            }
        }
        Ok(live)
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, VigilError>
    where
        F: Future<Output = Result<T, VigilError>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::AuthoritativeLookup(format!(
                "{what} timed out after {}s",
                self.request_timeout.as_secs_f32()
            ))),
        }
    }
}
