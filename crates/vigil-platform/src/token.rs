//! Bearer-token caching for the outbound APIs.

use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use vigil_core::error::VigilError;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on how long a token is cached, whatever the issuer claims.
const MAX_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// OAuth-style token response shared by the identity and metadata endpoints.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// A single cached bearer token, refreshed on demand.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or call `fetch` for a new one.
    ///
    /// `fetch` yields the token and its lifetime. Concurrent callers wait on
    /// the same refresh instead of fetching twice.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, VigilError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), VigilError>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }
        let (value, lifetime) = fetch().await?;
        debug!(lifetime_secs = lifetime.as_secs(), "token: refreshed");
        let now = Instant::now();
        let ttl = lifetime.min(MAX_LIFETIME).saturating_sub(REFRESH_MARGIN);
        *guard = Some(CachedToken {
            value: value.clone(),
            refresh_at: now.checked_add(ttl).unwrap_or(now),
        });
        Ok(value)
    }

    /// Drop the cached token, e.g. after a 401.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

/// Where the task-queue client gets its API access token.
pub enum AccessTokenSource {
    /// Fixed token from config (local development).
    Static(String),
    /// Fetched from the compute metadata server and cached.
    Metadata {
        client: reqwest::Client,
        url: String,
        cache: TokenCache,
    },
}

impl AccessTokenSource {
    pub fn from_config(client: reqwest::Client, static_token: &str, metadata_url: &str) -> Self {
        if static_token.is_empty() {
            Self::Metadata {
                client,
                url: metadata_url.to_string(),
                cache: TokenCache::new(),
            }
        } else {
            Self::Static(static_token.to_string())
        }
    }

    pub async fn token(&self) -> Result<String, VigilError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata { client, url, cache } => {
                cache
                    .get_or_fetch(move || async move {
                        let resp = client
                            .get(url)
                            .header("Metadata-Flavor", "Google")
                            .send()
                            .await
                            .map_err(|e| {
                                VigilError::SchedulingTransient(format!(
                                    "metadata token request failed: {e}"
                                ))
                            })?;
                        let status = resp.status();
                        if !status.is_success() {
                            return Err(VigilError::SchedulingTransient(format!(
                                "metadata token request returned HTTP {status}"
                            )));
                        }
                        let body: TokenResponse = resp.json().await.map_err(|e| {
                            VigilError::SchedulingPermanent(format!(
                                "failed to parse metadata token: {e}"
                            ))
                        })?;
                        Ok((body.access_token, Duration::from_secs(body.expires_in)))
                    })
                    .await
            }
        }
    }

    pub async fn invalidate(&self) {
        if let Self::Metadata { cache, .. } = self {
            cache.invalidate().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cache_reuses_token_until_invalidated() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            Ok((format!("tok-{n}"), Duration::from_secs(3600)))
        };

        assert_eq!(cache.get_or_fetch(fetch).await.unwrap(), "tok-0");
        assert_eq!(cache.get_or_fetch(fetch).await.unwrap(), "tok-0");
        cache.invalidate().await;
        assert_eq!(cache.get_or_fetch(fetch).await.unwrap(), "tok-1");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refetched() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            // Shorter than the refresh margin: never served from cache.
            Ok(("tok".to_string(), Duration::from_secs(30)))
        };
        cache.get_or_fetch(fetch).await.unwrap();
        cache.get_or_fetch(fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_absurd_lifetime_is_capped() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(("tok".to_string(), Duration::from_secs(u64::MAX)))
        };
        cache.get_or_fetch(fetch).await.unwrap();
        cache.get_or_fetch(fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let cached = cache.token.lock().await.clone().unwrap();
        assert!(cached.refresh_at <= Instant::now() + MAX_LIFETIME);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let cache = TokenCache::new();
        let err = cache
            .get_or_fetch(|| async { Err(VigilError::SchedulingTransient("down".into())) })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let ok = cache
            .get_or_fetch(|| async { Ok(("fresh".to_string(), Duration::from_secs(3600))) })
            .await
            .unwrap();
        assert_eq!(ok, "fresh");
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = AccessTokenSource::from_config(reqwest::Client::new(), "dev-token", "");
        assert_eq!(source.token().await.unwrap(), "dev-token");
    }

    #[tokio::test]
    async fn test_metadata_source_sends_flavor_header() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(GET)
                .path("/token")
                .header("Metadata-Flavor", "Google");
            then.status(200).json_body(json!({
                "access_token": "ya29.meta",
                "expires_in": 3599,
                "token_type": "Bearer"
            }));
        });

        let source =
            AccessTokenSource::from_config(reqwest::Client::new(), "", &server.url("/token"));
        assert_eq!(source.token().await.unwrap(), "ya29.meta");
        assert_eq!(source.token().await.unwrap(), "ya29.meta");
        token.assert_calls(1);
    }
}
