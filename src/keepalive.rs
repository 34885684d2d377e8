//! Keep-alive actor.
//!
//! While anything is live the actor keeps exactly one ping task queued on the
//! external scheduler. Each ping reconciles the lifecycle state against the
//! authoritative source and decides whether to queue the next one. Three
//! consecutive idle verdicts (configurable) stop the actor.
//!
//! `start`, `stop`, and `handle_ping` are serialised on one async mutex.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use vigil_core::{
    config::KeepAliveConfig,
    traits::{ChannelDirectory, TaskHandle, TaskScheduler},
};
use vigil_liveness::Reconciler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorStatus {
    #[default]
    Inactive,
    Active,
}

/// Read-only view of the actor, published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActorSnapshot {
    pub status: ActorStatus,
    pub consecutive_failures: u32,
    pub scheduled_task: Option<String>,
}

/// What a ping did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Actor was inactive.
    Ignored,
    /// Delivered by a task other than the one queued; a redelivery or a
    /// stray caller.
    Superseded,
    /// Something is live; counter reset and next ping queued.
    Continued,
    /// Every check failed to answer; counter untouched and next ping queued.
    Inconclusive,
    /// Idle, but under the threshold; next ping queued.
    Grace { failures: u32 },
    /// Idle at the threshold; actor stopped.
    Stopped,
}

enum Verdict {
    Live,
    Idle,
    Inconclusive,
}

#[derive(Debug, Default)]
struct Inner {
    status: ActorStatus,
    consecutive_failures: u32,
    task: Option<TaskHandle>,
}

impl Inner {
    fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            scheduled_task: self.task.as_ref().map(|t| t.to_string()),
        }
    }
}

pub struct KeepAliveActor {
    inner: Mutex<Inner>,
    scheduler: Arc<dyn TaskScheduler>,
    reconciler: Arc<Reconciler>,
    directory: Arc<dyn ChannelDirectory>,
    ping_delay: Duration,
    failure_threshold: u32,
    published: watch::Sender<ActorSnapshot>,
}

impl KeepAliveActor {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        reconciler: Arc<Reconciler>,
        directory: Arc<dyn ChannelDirectory>,
        config: &KeepAliveConfig,
    ) -> Self {
        let (published, _) = watch::channel(ActorSnapshot::default());
        Self {
            inner: Mutex::new(Inner::default()),
            scheduler,
            reconciler,
            directory,
            ping_delay: config.ping_delay(),
            failure_threshold: config.failure_threshold.max(1),
            published,
        }
    }

    /// Latest published state. Never waits on an in-flight transition.
    pub fn snapshot(&self) -> ActorSnapshot {
        self.published.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().status == ActorStatus::Active
    }

    /// Begin pinging. No-op if already active.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.status == ActorStatus::Active {
            debug!("keepalive: already active");
            return;
        }
        inner.status = ActorStatus::Active;
        inner.consecutive_failures = 0;
        info!("keepalive: started");
        self.schedule(&mut inner).await;
        self.publish(&inner);
    }

    /// Stop pinging and delete the queued task. No-op if already inactive.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
        self.publish(&inner);
    }

    /// One scheduled ping: reconcile, decide, queue the next ping or stop.
    ///
    /// `delivered` is the name of the task that sent the ping, when the queue
    /// reports it. A ping from any task but the queued one is ignored. Without
    /// a name the queued task is deleted before its replacement is created.
    pub async fn handle_ping(&self, delivered: Option<&str>) -> PingOutcome {
        let mut inner = self.inner.lock().await;
        if inner.status != ActorStatus::Active {
            info!("keepalive: ping while inactive, ignoring");
            return PingOutcome::Ignored;
        }
        if let Some(name) = delivered {
            if let Some(queued) = inner.task.as_ref().filter(|q| !q.matches(name)) {
                info!(task = %name, queued = %queued, "keepalive: ping from superseded task, ignoring");
                return PingOutcome::Superseded;
            }
            // The queued task has fired.
            inner.task = None;
        }

        let outcome = match self.evaluate().await {
            Verdict::Live => {
                inner.consecutive_failures = 0;
                self.schedule(&mut inner).await;
                PingOutcome::Continued
            }
            Verdict::Inconclusive => {
                self.schedule(&mut inner).await;
                PingOutcome::Inconclusive
            }
            Verdict::Idle => {
                inner.consecutive_failures += 1;
                let failures = inner.consecutive_failures;
                if failures < self.failure_threshold {
                    info!(
                        failures,
                        threshold = self.failure_threshold,
                        "keepalive: nothing live, keeping warm for now"
                    );
                    self.schedule(&mut inner).await;
                    PingOutcome::Grace { failures }
                } else {
                    info!(failures, "keepalive: idle on consecutive checks, stopping");
                    self.stop_locked(&mut inner).await;
                    PingOutcome::Stopped
                }
            }
        };
        self.publish(&inner);
        outcome
    }

    /// Back to process-start state. Does not touch the scheduler.
    #[cfg(test)]
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::default();
        self.publish(&inner);
    }

    async fn evaluate(&self) -> Verdict {
        match self.reconciler.reconcile().await {
            Ok(outcome) if outcome.live_count() > 0 => {
                debug!(live = %outcome.live.join(","), "keepalive: streams confirmed live");
                return Verdict::Live;
            }
            Ok(_) => {}
            Err(_) => {
                let retained = self.reconciler.state().len();
                if retained > 0 {
                    warn!(retained, "keepalive: reconcile failed, trusting last known state");
                    return Verdict::Live;
                }
            }
        }

        let signals = self.reconciler.passive_signals().await;
        if !signals.is_empty() {
            debug!(channels = %signals.join(","), "keepalive: passive signals present");
            return Verdict::Live;
        }

        let monitored = self.directory.monitored_channels().await;
        match self.reconciler.direct_check(&monitored).await {
            Ok(live) if !live.is_empty() => {
                info!(live = %live.join(","), "keepalive: direct check found live streams");
                Verdict::Live
            }
            Ok(_) => Verdict::Idle,
            Err(e) => {
                warn!("keepalive: direct check failed, not counting this ping: {e}");
                Verdict::Inconclusive
            }
        }
    }

    async fn schedule(&self, inner: &mut Inner) {
        self.discard_task(inner).await;
        match self.scheduler.schedule_next_ping(self.ping_delay).await {
            Ok(handle) => inner.task = Some(handle),
            Err(e) => {
                error!("keepalive: failed to schedule next ping: {e}");
                inner.task = None;
            }
        }
    }

    async fn stop_locked(&self, inner: &mut Inner) {
        if inner.status == ActorStatus::Inactive {
            debug!("keepalive: already inactive");
            return;
        }
        inner.status = ActorStatus::Inactive;
        inner.consecutive_failures = 0;
        self.discard_task(inner).await;
        info!("keepalive: stopped");
    }

    /// Delete the queued task, if any. At most one ping is ever outstanding.
    async fn discard_task(&self, inner: &mut Inner) {
        if let Some(task) = inner.task.take() {
            if let Err(e) = self.scheduler.delete_task(&task).await {
                warn!(task = %task, "keepalive: failed to delete queued ping: {e}");
            }
        }
    }

    fn publish(&self, inner: &Inner) {
        self.published.send_replace(inner.snapshot());
    }
}
