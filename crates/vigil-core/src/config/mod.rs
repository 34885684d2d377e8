mod defaults;
mod platform;


pub use platform::*;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::VigilError;
use defaults::*;

/// Environment variables that override secrets from the config file.
pub const ENV_WEBHOOK_SECRET: &str = "VIGIL_WEBHOOK_SECRET";
pub const ENV_HELIX_CLIENT_SECRET: &str = "VIGIL_HELIX_CLIENT_SECRET";
pub const ENV_API_KEY: &str = "VIGIL_API_KEY";

/// Upper bound on IDs per authoritative lookup call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Top-level Vigil configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vigil: VigilConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub keepalive: KeepAliveConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub helix: HelixConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for the admin endpoints. Empty = no auth (for local-only use).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
        }
    }
}

/// Inbound webhook verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Empty = every notification fails verification.
    #[serde(default)]
    pub secret: String,
    /// Prefix of the `Message-Id`, `Message-Timestamp`, `Message-Signature`,
    /// and `Message-Type` headers.
    #[serde(default = "default_header_prefix")]
    pub header_prefix: String,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Window size above which a pruning pass runs on insert.
    #[serde(default = "default_dedup_prune_threshold")]
    pub dedup_prune_threshold: usize,
    /// Development only. Never enable in production.
    #[serde(default)]
    pub skip_signature_verification: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            header_prefix: default_header_prefix(),
            max_age_secs: default_max_age_secs(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_prune_threshold: default_dedup_prune_threshold(),
            skip_signature_verification: false,
        }
    }
}

/// Keep-alive actor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ping_delay_secs")]
    pub ping_delay_secs: u64,
    /// Consecutive negative checks before the actor stops.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Budget for one ping handling inside the ping endpoint.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_delay_secs: default_ping_delay_secs(),
            failure_threshold: default_failure_threshold(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

impl KeepAliveConfig {
    pub fn ping_delay(&self) -> Duration {
        Duration::from_secs(self.ping_delay_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

/// Reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// A chat message newer than this counts as a passive liveness signal.
    #[serde(default = "default_chat_recency_secs")]
    pub chat_recency_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            chat_recency_secs: default_chat_recency_secs(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LivenessConfig {
    pub fn chat_recency(&self) -> Duration {
        Duration::from_secs(self.chat_recency_secs)
    }

    /// Batch size clamped to what the authoritative API accepts.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Replace secrets with values from `lookup` when present and non-empty.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(secret) = pick(ENV_WEBHOOK_SECRET) {
            self.webhook.secret = secret;
        }
        if let Some(secret) = pick(ENV_HELIX_CLIENT_SECRET) {
            self.helix.client_secret = secret;
        }
        if let Some(key) = pick(ENV_API_KEY) {
            self.api.api_key = key;
        }
    }

    /// Replace secrets with values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Check settings that are legal but suspicious. Returns human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.webhook.skip_signature_verification {
            warnings.push(
                "webhook.skip_signature_verification is enabled; notifications are NOT authenticated"
                    .to_string(),
            );
        } else if self.webhook.secret.is_empty() {
            warnings.push("webhook.secret is empty; every notification will be rejected".to_string());
        }
        if !(60..=360).contains(&self.keepalive.ping_delay_secs) {
            warnings.push(format!(
                "keepalive.ping_delay_secs = {} is outside the usual 60-360 range",
                self.keepalive.ping_delay_secs
            ));
        }
        if self.keepalive.failure_threshold == 0 {
            warnings.push(
                "keepalive.failure_threshold = 0 stops on the first negative check".to_string(),
            );
        }
        if self.liveness.batch_size == 0 || self.liveness.batch_size > MAX_BATCH_SIZE {
            warnings.push(format!(
                "liveness.batch_size = {} clamped to {}",
                self.liveness.batch_size,
                self.liveness.effective_batch_size()
            ));
        }
        if self.keepalive.ping_timeout_secs >= self.tasks.dispatch_deadline_secs {
            warnings.push(format!(
                "keepalive.ping_timeout_secs = {} is not below tasks.dispatch_deadline_secs = {}; \
                 the queue will retry pings that are still running",
                self.keepalive.ping_timeout_secs, self.tasks.dispatch_deadline_secs
            ));
        }
        if self.keepalive.enabled && self.tasks.target_url.is_empty() {
            warnings.push("keepalive is enabled but tasks.target_url is empty".to_string());
        }
        warnings
    }

    /// Copy of this config with secrets masked, for display.
    pub fn redacted(&self) -> Config {
        let mut cfg = self.clone();
        for secret in [
            &mut cfg.webhook.secret,
            &mut cfg.helix.client_secret,
            &mut cfg.api.api_key,
            &mut cfg.tasks.access_token,
        ] {
            if !secret.is_empty() {
                *secret = "***".to_string();
            }
        }
        cfg
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Environment overrides
/// are applied in both cases. Callers log [`Config::validate`] warnings once
/// logging is up.
pub fn load(path: &str) -> Result<Config, VigilError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str::<Config>(&content)
            .map_err(|e| VigilError::Config(format!("failed to parse config: {}", e)))?
    } else {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    config.apply_env_overrides();
    Ok(config)
}
