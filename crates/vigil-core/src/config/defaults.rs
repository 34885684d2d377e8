//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "vigil".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_api_port() -> u16 {
    8080
}

pub fn default_header_prefix() -> String {
    "Twitch-Eventsub-".to_string()
}

pub fn default_max_age_secs() -> u64 {
    600
}

pub fn default_dedup_ttl_secs() -> u64 {
    600
}

pub fn default_dedup_prune_threshold() -> usize {
    1000
}

pub fn default_ping_delay_secs() -> u64 {
    180
}

pub fn default_failure_threshold() -> u32 {
    3
}

pub fn default_ping_timeout_secs() -> u64 {
    20
}

pub fn default_chat_recency_secs() -> u64 {
    300
}

pub fn default_batch_size() -> usize {
    100
}

pub fn default_request_timeout_secs() -> u64 {
    10
}

pub fn default_helix_base_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

pub fn default_helix_auth_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

pub fn default_tasks_base_url() -> String {
    "https://cloudtasks.googleapis.com/v2".to_string()
}

pub fn default_dispatch_deadline_secs() -> u64 {
    30
}

pub fn default_max_attempts() -> u32 {
    4
}

pub fn default_initial_backoff_ms() -> u64 {
    250
}

pub fn default_max_backoff_ms() -> u64 {
    4000
}

pub fn default_metadata_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .to_string()
}
