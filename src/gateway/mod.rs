//! Gateway: owns the lifecycle state and wires verification, reconciliation,
//! and the keep-alive actor to the HTTP surface.

mod events;

use crate::activity::ActivityTracker;
use crate::keepalive::KeepAliveActor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use vigil_core::{
    config::Config,
    error::VigilError,
    traits::{ChannelActivity, ChannelDirectory, LivenessSource, TaskScheduler},
};
use vigil_liveness::{LifecycleState, ReconcileOutcome, Reconciler, ReplayGuard, Verifier};

pub use events::EventDisposition;

/// Process-wide state, constructed once at startup.
pub struct Gateway {
    pub(crate) config: Config,
    pub(crate) state: Arc<LifecycleState>,
    pub(crate) replay: ReplayGuard,
    pub(crate) verifier: Verifier,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) keepalive: Arc<KeepAliveActor>,
    pub(crate) activity: Arc<ActivityTracker>,
    pub(crate) uptime: Instant,
}

impl Gateway {
    pub fn new(
        config: Config,
        source: Arc<dyn LivenessSource>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        let state = Arc::new(LifecycleState::new());
        let activity = Arc::new(ActivityTracker::new(&config.channels));
        let reconciler = Arc::new(Reconciler::new(
            state.clone(),
            source,
            activity.clone(),
            activity.clone(),
            &config.liveness,
        ));
        let keepalive = Arc::new(KeepAliveActor::new(
            scheduler,
            reconciler.clone(),
            activity.clone(),
            &config.keepalive,
        ));
        Self {
            replay: ReplayGuard::from_config(&config.webhook),
            verifier: Verifier::from_config(&config.webhook),
            config,
            state,
            reconciler,
            keepalive,
            activity,
            uptime: Instant::now(),
        }
    }

    /// Rediscover live streams, then serve HTTP until the process exits.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "{} gateway running | channels: {} | keepalive: {} | signatures: {}",
            self.config.vigil.name,
            if self.config.channels.allowed.is_empty() {
                "all".to_string()
            } else {
                self.config.channels.normalized().join(", ")
            },
            if self.config.keepalive.enabled {
                "enabled"
            } else {
                "disabled"
            },
            if self.verifier.is_bypassed() {
                "BYPASSED"
            } else {
                "enforced"
            },
        );

        self.rediscover().await;
        crate::api::serve(self).await
    }

    /// Seed the empty lifecycle state from the authoritative source.
    pub async fn rediscover(&self) -> Vec<String> {
        let monitored = self.activity.monitored_channels().await;
        if monitored.is_empty() {
            return Vec::new();
        }
        let live = match self.reconciler.direct_check(&monitored).await {
            Ok(live) => live,
            Err(e) => {
                warn!("startup: rediscovery failed, starting idle: {e}");
                return Vec::new();
            }
        };
        for channel in &live {
            self.state.on_stream_status_change(channel, true);
        }
        if !live.is_empty() {
            info!(live = %live.join(","), "startup: rediscovered live streams");
            if self.config.keepalive.enabled {
                self.keepalive.start().await;
            }
        }
        live
    }

    /// Manual clear of the lifecycle state, followed by a keep-alive stop.
    pub async fn clear_streams(&self) -> Vec<String> {
        let removed = self.state.clear();
        for channel in &removed {
            self.activity.clear_cached_metadata(channel).await;
        }
        self.keepalive.stop().await;
        removed
    }

    pub async fn reconcile_now(&self) -> Result<ReconcileOutcome, VigilError> {
        self.reconciler.reconcile().await
    }

    /// Restore process-start state for every in-memory component.
    #[cfg(test)]
    pub async fn reset(&self) {
        self.state.reset();
        self.replay.reset();
        self.activity.reset();
        self.keepalive.reset().await;
    }
}
