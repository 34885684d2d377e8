//! Authoritative stream API (Helix-style).
//!
//! Two lookups: `GET /users?login=..` resolves logins to stable IDs and
//! `GET /streams?user_id=..` returns the streams that are live. Both accept
//! up to 100 repeated query parameters. Requests carry an app access token
//! from the client-credentials grant.
//! Docs: <https://dev.twitch.tv/docs/api/reference>

use crate::token::{TokenCache, TokenResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};
use vigil_core::{config::HelixConfig, error::VigilError, traits::LivenessSource};

#[derive(Debug, Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
}

#[derive(Debug, Deserialize)]
struct HelixStream {
    user_id: String,
    #[serde(rename = "type", default)]
    kind: String,
}

pub struct HelixClient {
    client: reqwest::Client,
    config: HelixConfig,
    token: TokenCache,
}

impl HelixClient {
    pub fn new(config: HelixConfig, timeout: Duration) -> Result<Self, VigilError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VigilError::Config(format!("failed to build helix client: {e}")))?;
        Ok(Self {
            client,
            config,
            token: TokenCache::new(),
        })
    }

    fn lookup_error(context: &str, detail: impl std::fmt::Display) -> VigilError {
        VigilError::AuthoritativeLookup(format!("{context}: {detail}"))
    }

    async fn app_token(&self) -> Result<String, VigilError> {
        self.token
            .get_or_fetch(move || async move {
                let resp = self
                    .client
                    .post(&self.config.auth_url)
                    .query(&[
                        ("client_id", self.config.client_id.as_str()),
                        ("client_secret", self.config.client_secret.as_str()),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await
                    .map_err(|e| Self::lookup_error("token request failed", e))?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Self::lookup_error(
                        "token request rejected",
                        format!("HTTP {status}: {body}"),
                    ));
                }
                let body: TokenResponse = resp
                    .json()
                    .await
                    .map_err(|e| Self::lookup_error("failed to parse token", e))?;
                Ok((body.access_token, Duration::from_secs(body.expires_in)))
            })
            .await
    }

    /// GET `path` with repeated `key=value` query pairs. Retries once with a
    /// fresh token on 401.
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, VigilError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let mut refreshed = false;
        loop {
            let token = self.app_token().await?;
            let resp = self
                .client
                .get(&url)
                .header("Client-Id", &self.config.client_id)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await
                .map_err(|e| Self::lookup_error(path, e))?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("helix: app token rejected, refreshing");
                self.token.invalidate().await;
                refreshed = true;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::lookup_error(path, format!("HTTP {status}: {body}")));
            }
            let page: HelixPage<T> = resp
                .json()
                .await
                .map_err(|e| Self::lookup_error(path, e))?;
            return Ok(page.data);
        }
    }
}

#[async_trait]
impl LivenessSource for HelixClient {
    async fn resolve_ids(&self, logins: &[String]) -> Result<HashMap<String, String>, VigilError> {
        if logins.is_empty() {
            return Ok(HashMap::new());
        }
        let query: Vec<(&str, &str)> = logins.iter().map(|l| ("login", l.as_str())).collect();
        let users: Vec<HelixUser> = self.get_page("users", &query).await?;
        debug!(
            requested = logins.len(),
            resolved = users.len(),
            "helix: resolved logins"
        );
        Ok(users
            .into_iter()
            .map(|u| (u.login.to_lowercase(), u.id))
            .collect())
    }

    async fn live_ids(&self, ids: &[String]) -> Result<HashSet<String>, VigilError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let first = ids.len().to_string();
        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("user_id", id.as_str())).collect();
        query.push(("first", first.as_str()));
        let streams: Vec<HelixStream> = self.get_page("streams", &query).await?;
        Ok(streams
            .into_iter()
            .filter(|s| s.kind.is_empty() || s.kind == "live")
            .map(|s| s.user_id)
            .collect())
    }
}
