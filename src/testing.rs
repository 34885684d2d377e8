//! Test doubles for the outbound seams and a wired-up gateway.

use crate::activity::ActivityTracker;
use crate::gateway::Gateway;
use crate::keepalive::{KeepAliveActor, PingOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::{
    config::Config,
    error::VigilError,
    traits::{LivenessSource, TaskHandle, TaskScheduler},
};
use vigil_liveness::LifecycleState;

pub const TEST_SECRET: &str = "test-secret";

/// Authoritative source where every login resolves to `id-<login>`.
#[derive(Default)]
pub struct FakeSource {
    live: Mutex<HashSet<String>>,
    failing: AtomicBool,
    lookups: AtomicUsize,
    delay: Mutex<Duration>,
}

impl FakeSource {
    pub fn set_live(&self, logins: &[&str]) {
        *self.live.lock().unwrap() = logins.iter().map(|l| l.to_string()).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every resolve call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessSource for FakeSource {
    async fn resolve_ids(&self, logins: &[String]) -> Result<HashMap<String, String>, VigilError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(VigilError::AuthoritativeLookup("helix unavailable".into()));
        }
        Ok(logins
            .iter()
            .map(|l| (l.clone(), format!("id-{l}")))
            .collect())
    }

    async fn live_ids(&self, ids: &[String]) -> Result<HashSet<String>, VigilError> {
        let live = self.live.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| id.strip_prefix("id-").is_some_and(|l| live.contains(l)))
            .cloned()
            .collect())
    }
}

/// Scheduler that hands out `tasks/<n>` and records deletions.
#[derive(Default)]
pub struct FakeScheduler {
    scheduled: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_schedules: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FakeScheduler {
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn fail_schedules(&self, fail: bool) {
        self.fail_schedules.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskScheduler for FakeScheduler {
    async fn schedule_next_ping(&self, _delay: Duration) -> Result<TaskHandle, VigilError> {
        if self.fail_schedules.load(Ordering::SeqCst) {
            return Err(VigilError::SchedulingPermanent("queue not found".into()));
        }
        let n = self.scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskHandle::new(format!("tasks/{n}")))
    }

    async fn delete_task(&self, handle: &TaskHandle) -> Result<(), VigilError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(VigilError::SchedulingTransient("unavailable".into()));
        }
        self.deleted.lock().unwrap().push(handle.to_string());
        Ok(())
    }
}

pub fn test_config(allowed: &[&str]) -> Config {
    let mut config = Config::default();
    config.channels.allowed = allowed.iter().map(|s| s.to_string()).collect();
    config.webhook.secret = TEST_SECRET.to_string();
    config
}

/// A gateway wired to fakes, with handles to every part.
pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub state: Arc<LifecycleState>,
    pub activity: Arc<ActivityTracker>,
    pub keepalive: Arc<KeepAliveActor>,
    pub source: Arc<FakeSource>,
    pub scheduler: Arc<FakeScheduler>,
}

impl Harness {
    pub fn new(allowed: &[&str]) -> Self {
        Self::with_config(test_config(allowed))
    }

    pub fn with_config(config: Config) -> Self {
        let source = Arc::new(FakeSource::default());
        let scheduler = Arc::new(FakeScheduler::default());
        let gateway = Arc::new(Gateway::new(config, source.clone(), scheduler.clone()));
        Self {
            state: gateway.state.clone(),
            activity: gateway.activity.clone(),
            keepalive: gateway.keepalive.clone(),
            gateway,
            source,
            scheduler,
        }
    }

    /// Deliver a ping the way the queue does: from the currently queued task.
    pub async fn fire_ping(&self) -> PingOutcome {
        let queued = self.keepalive.snapshot().scheduled_task;
        self.keepalive.handle_ping(queued.as_deref()).await
    }
}
