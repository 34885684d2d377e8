//! Cloud Tasks client for the self-scheduled keep-alive ping.
//!
//! Creates one HTTP-target task per ping and deletes it on stop.
//! REST reference: <https://cloud.google.com/tasks/docs/reference/rest>

use crate::retry::{classify_status, classify_transport, RetryPolicy};
use crate::token::AccessTokenSource;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use vigil_core::{
    config::TasksConfig,
    error::VigilError,
    traits::{TaskHandle, TaskScheduler},
};

#[derive(Debug, Deserialize)]
struct CreatedTask {
    name: String,
}

pub struct CloudTasksClient {
    client: reqwest::Client,
    config: TasksConfig,
    tokens: AccessTokenSource,
    retry: RetryPolicy,
}

impl CloudTasksClient {
    pub fn new(config: TasksConfig, timeout: Duration) -> Result<Self, VigilError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VigilError::Config(format!("failed to build tasks client: {e}")))?;
        let tokens =
            AccessTokenSource::from_config(client.clone(), &config.access_token, &config.metadata_url);
        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            client,
            config,
            tokens,
            retry,
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Request body for a task due `delay` from now.
    fn task_body(&self, delay: Duration) -> Value {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let schedule_time = (Utc::now() + delay).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut http_request = json!({
            "httpMethod": "POST",
            "url": self.config.target_url,
            "headers": {"Content-Type": "application/json"},
        });
        if !self.config.service_account_email.is_empty() {
            http_request["oidcToken"] = json!({
                "serviceAccountEmail": self.config.service_account_email,
                "audience": self.config.target_url,
            });
        }
        json!({
            "task": {
                "scheduleTime": schedule_time,
                "dispatchDeadline": format!("{}s", self.config.dispatch_deadline().as_secs()),
                "httpRequest": http_request,
            }
        })
    }

    /// Send a request built around the current access token. Retries once
    /// with a fresh token on 401.
    async fn send_authorized(
        &self,
        context: &str,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, VigilError> {
        let mut refreshed = false;
        loop {
            let token = self.tokens.token().await?;
            let resp = build(&token)
                .send()
                .await
                .map_err(|e| classify_transport(&e, context))?;
            if resp.status() == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("tasks: access token rejected, refreshing");
                self.tokens.invalidate().await;
                refreshed = true;
                continue;
            }
            return Ok(resp);
        }
    }

    async fn create_once(&self, body: &Value) -> Result<TaskHandle, VigilError> {
        let url = format!("{}/{}/tasks", self.base(), self.config.queue_path());
        let resp = self
            .send_authorized("create task", |token| {
                self.client.post(&url).bearer_auth(token).json(body)
            })
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, "create task", &text));
        }
        let created: CreatedTask = resp.json().await.map_err(|e| {
            VigilError::SchedulingPermanent(format!("failed to parse created task: {e}"))
        })?;
        Ok(TaskHandle::new(created.name))
    }

    async fn delete_once(&self, handle: &TaskHandle) -> Result<(), VigilError> {
        let url = format!("{}/{}", self.base(), handle.as_str());
        let resp = self
            .send_authorized("delete task", |token| {
                self.client.delete(&url).bearer_auth(token)
            })
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            debug!(task = %handle, "tasks: already gone");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify_status(status, "delete task", &text))
    }
}

#[async_trait]
impl TaskScheduler for CloudTasksClient {
    async fn schedule_next_ping(&self, delay: Duration) -> Result<TaskHandle, VigilError> {
        let body = self.task_body(delay);
        let handle = self
            .retry
            .run("tasks: create", |_| self.create_once(&body))
            .await?;
        info!(task = %handle, delay_secs = delay.as_secs(), "tasks: keep-alive ping scheduled");
        Ok(handle)
    }

    async fn delete_task(&self, handle: &TaskHandle) -> Result<(), VigilError> {
        self.retry
            .run("tasks: delete", |_| self.delete_once(handle))
            .await?;
        info!(task = %handle, "tasks: keep-alive ping deleted");
        Ok(())
    }
}
