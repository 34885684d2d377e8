use thiserror::Error;

/// Top-level error type for Vigil.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Webhook signature missing or not matching the shared secret.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Notification was stale or already processed.
    #[error("replay or duplicate: {0}")]
    ReplayOrDuplicate(String),

    /// The authoritative liveness source could not be queried.
    #[error("authoritative lookup failed: {0}")]
    AuthoritativeLookup(String),

    /// Task-queue call failed in a way that may succeed on retry.
    #[error("task scheduling failed (transient): {0}")]
    SchedulingTransient(String),

    /// Task-queue call failed in a way that will not succeed on retry.
    #[error("task scheduling failed (permanent): {0}")]
    SchedulingPermanent(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VigilError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SchedulingTransient(_) | Self::AuthoritativeLookup(_)
        )
    }
}
