//! Bounded exponential backoff for transient failures.

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use vigil_core::{config::TasksConfig, error::VigilError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TasksConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay before retry number `attempt` (1 = first retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, VigilError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, VigilError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{what}: transient failure, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map a non-success task-queue HTTP status to the error taxonomy.
pub fn classify_status(status: StatusCode, context: &str, body: &str) -> VigilError {
    let detail = format!("{context}: HTTP {status}: {}", body.trim());
    match status {
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => VigilError::SchedulingTransient(detail),
        _ => VigilError::SchedulingPermanent(detail),
    }
}

/// Map a transport-level failure (no HTTP status) to the error taxonomy.
pub fn classify_transport(err: &reqwest::Error, context: &str) -> VigilError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        VigilError::SchedulingTransient(format!("{context}: {err}"))
    } else {
        VigilError::SchedulingPermanent(format!("{context}: {err}"))
    }
}
