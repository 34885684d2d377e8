//! HTTP surface: the webhook receiver, the keep-alive ping endpoint, and a
//! small bearer-protected admin API.
//!
//! The webhook and ping endpoints acknowledge fast. Anything that touches the
//! network runs after the response on a spawned task.

use crate::gateway::Gateway;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vigil_core::notification::{decode_event, MessageType, NotificationHeaders, WebhookEnvelope};
use vigil_core::traits::ChannelDirectory;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    gateway: Arc<Gateway>,
    api_key: Option<String>,
}

impl ApiState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let api_key = if gateway.config.api.api_key.is_empty() {
            None
        } else {
            Some(gateway.config.api.api_key.clone())
        };
        Self { gateway, api_key }
    }
}

type ApiError = (StatusCode, Json<Value>);

/// Constant-time string comparison for the admin token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. `None` if authorized.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<ApiError> {
    let key = api_key.as_ref()?;

    let value = match headers.get(header::AUTHORIZATION).map(|h| h.to_str()) {
        Some(Ok(v)) => v,
        Some(Err(_)) => {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid Authorization header"})),
            ))
        }
        None => {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing Authorization header"})),
            ))
        }
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )),
    }
}

/// `POST /webhooks/eventsub`: platform notifications.
async fn eventsub(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let gw = &state.gateway;
    let meta = NotificationHeaders::extract(&gw.config.webhook.header_prefix, |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let message_id = meta.message_id.clone().unwrap_or_default();

    if let Err(e) = gw.verifier.check(&meta, &body) {
        warn!(message_id = %message_id, "webhook: rejected: {e}");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    match meta.kind() {
        MessageType::Notification => {}
        MessageType::WebhookCallbackVerification => {
            return match WebhookEnvelope::parse(&body).map(|env| env.challenge) {
                Ok(Some(challenge)) => {
                    info!(message_id = %message_id, "webhook: subscription verified");
                    ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
                }
                Ok(None) => {
                    warn!(message_id = %message_id, "webhook: verification without challenge");
                    StatusCode::BAD_REQUEST.into_response()
                }
                Err(e) => {
                    warn!(message_id = %message_id, "webhook: bad verification body: {e}");
                    StatusCode::BAD_REQUEST.into_response()
                }
            };
        }
        MessageType::Revocation => {
            match WebhookEnvelope::parse(&body) {
                Ok(env) => warn!(
                    subscription = %env.subscription.kind,
                    status = env.subscription.status.as_deref().unwrap_or("unknown"),
                    "webhook: subscription revoked"
                ),
                Err(e) => warn!("webhook: subscription revoked (unparseable body: {e})"),
            }
            return StatusCode::OK.into_response();
        }
        MessageType::Unknown(kind) => {
            debug!(message_id = %message_id, kind = %kind, "webhook: unknown message type, ignoring");
            return StatusCode::OK.into_response();
        }
    }

    let admission = gw
        .replay
        .should_process_event(&message_id, meta.timestamp.as_deref());
    if let Err(e) = admission.into_result(&message_id) {
        debug!("webhook: dropped: {e}");
        return StatusCode::OK.into_response();
    }

    let event = match WebhookEnvelope::parse(&body).and_then(|env| decode_event(&env)) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(message_id = %message_id, "webhook: unhandled subscription type");
            return StatusCode::OK.into_response();
        }
        Err(e) => {
            warn!(message_id = %message_id, "webhook: undecodable notification: {e}");
            return StatusCode::OK.into_response();
        }
    };

    let gateway = gw.clone();
    tokio::spawn(async move {
        let channel = event.channel();
        let live = event.is_live();
        let disposition = gateway.handle_event(event).await;
        debug!(message_id = %message_id, channel = %channel, live, ?disposition, "webhook: event applied");
    });
    StatusCode::OK.into_response()
}

/// Set by the task queue on every delivery.
const TASK_NAME_HEADER: &str = "X-CloudTasks-TaskName";

/// `POST /keepalive`: scheduled ping from the task queue. Always 200.
async fn keepalive_ping(headers: HeaderMap, State(state): State<ApiState>) -> StatusCode {
    let keepalive = state.gateway.keepalive.clone();
    let budget = state.gateway.config.keepalive.ping_timeout();
    let delivered = headers
        .get(TASK_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ping = tokio::spawn(async move { keepalive.handle_ping(delivered.as_deref()).await });

    match tokio::time::timeout(budget, ping).await {
        Ok(Ok(outcome)) => debug!(?outcome, "keepalive: ping handled"),
        Ok(Err(e)) => error!("keepalive: ping task failed: {e}"),
        Err(_) => warn!(
            budget_secs = budget.as_secs(),
            "keepalive: ping still running, acknowledging anyway"
        ),
    }
    StatusCode::OK
}

/// `GET /api/health`: uptime, keep-alive state, active streams.
async fn health(headers: HeaderMap, State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let gw = &state.gateway;
    let streams: Vec<Value> = gw
        .state
        .active_streams()
        .into_iter()
        .map(|channel| {
            let metadata = gw.activity.metadata(&channel);
            json!({"channel": channel, "metadata": metadata})
        })
        .collect();

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": gw.uptime.elapsed().as_secs(),
        "keepalive": gw.keepalive.snapshot(),
        "active_streams": streams,
        "dedup_window": gw.replay.window().len(),
    })))
}

/// `POST /api/streams/clear`: manual clear, then keep-alive stop.
async fn clear_streams(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let removed = state.gateway.clear_streams().await;
    info!(removed = removed.len(), "api: active streams cleared");
    Ok(Json(json!({"status": "cleared", "removed": removed})))
}

/// `POST /api/reconcile`: one reconciliation pass.
async fn reconcile(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    match state.gateway.reconcile_now().await {
        Ok(outcome) => Ok(Json(json!(outcome))),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string()})),
        )),
    }
}

/// `POST /api/channels/{channel}/activity`: chat message seen in `channel`.
async fn channel_activity(
    headers: HeaderMap,
    Path(channel): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let gw = &state.gateway;
    if !gw.activity.is_channel_allowed(&channel).await {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("channel '{channel}' is not monitored")})),
        ));
    }
    gw.activity.record_message(&channel);
    Ok(Json(json!({"status": "recorded", "channel": channel.to_lowercase()})))
}

/// Build the axum router with shared state.
fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/webhooks/eventsub", post(eventsub))
        .route("/keepalive", post(keepalive_ping))
        .route("/api/health", get(health))
        .route("/api/streams/clear", post(clear_streams))
        .route("/api/reconcile", post(reconcile))
        .route("/api/channels/{channel}/activity", post(channel_activity))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Serve until the listener fails. Called from `Gateway::run()`.
pub async fn serve(gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", gateway.config.api.host, gateway.config.api.port);
    if gateway.config.api.api_key.is_empty() {
        warn!("API key not set, admin endpoints are unauthenticated");
    }
    let app = build_router(ApiState::new(gateway));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("API server failed to bind to {addr}"))?;
    info!("API server listening on {addr}");

    axum::serve(listener, app).await.context("API server error")
}
