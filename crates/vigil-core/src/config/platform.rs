use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::*;

/// Monitored channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Channel logins whose events are processed. Also the set probed by the
    /// last-chance direct liveness check.
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl ChannelsConfig {
    /// Allowed logins, lowercased and deduplicated, in config order.
    pub fn normalized(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.allowed.len());
        for login in &self.allowed {
            let login = login.trim().to_lowercase();
            if !login.is_empty() && !out.contains(&login) {
                out.push(login);
            }
        }
        out
    }
}

/// Authoritative stream API (Helix-style) credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelixConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_helix_base_url")]
    pub base_url: String,
    #[serde(default = "default_helix_auth_url")]
    pub auth_url: String,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: default_helix_base_url(),
            auth_url: default_helix_auth_url(),
        }
    }
}

/// Task queue used to schedule keep-alive pings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub queue: String,
    /// URL the scheduled task calls back (the keep-alive ping endpoint).
    #[serde(default)]
    pub target_url: String,
    /// Service account whose OIDC token authenticates the callback.
    #[serde(default)]
    pub service_account_email: String,
    #[serde(default = "default_tasks_base_url")]
    pub base_url: String,
    #[serde(default = "default_dispatch_deadline_secs")]
    pub dispatch_deadline_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Static API access token. Empty = fetch from the metadata server.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: String::new(),
            queue: String::new(),
            target_url: String::new(),
            service_account_email: String::new(),
            base_url: default_tasks_base_url(),
            dispatch_deadline_secs: default_dispatch_deadline_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            access_token: String::new(),
            metadata_url: default_metadata_url(),
        }
    }
}

impl TasksConfig {
    /// Fully-qualified queue name, e.g. `projects/p/locations/l/queues/q`.
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project, self.location, self.queue
        )
    }

    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_secs(self.dispatch_deadline_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
