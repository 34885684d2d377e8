//! Webhook notification types and the subscription-type decode table.
//!
//! The delivering platform wraps every event in an envelope
//! `{ subscription: { type, .. }, event: { .. } }`. The subscription type is
//! looked up in [`DECODERS`] to produce a [`StreamEvent`].

use crate::error::VigilError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header names, relative to the configured prefix.
pub const HEADER_MESSAGE_ID: &str = "Message-Id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "Message-Timestamp";
pub const HEADER_MESSAGE_SIGNATURE: &str = "Message-Signature";
pub const HEADER_MESSAGE_TYPE: &str = "Message-Type";

/// Value of the message-type header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Notification,
    WebhookCallbackVerification,
    Revocation,
    Unknown(String),
}

impl MessageType {
    pub fn from_header(value: &str) -> Self {
        match value.trim() {
            "notification" => Self::Notification,
            "webhook_callback_verification" => Self::WebhookCallbackVerification,
            "revocation" => Self::Revocation,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The four delivery headers, as received.
#[derive(Debug, Clone, Default)]
pub struct NotificationHeaders {
    pub message_id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    pub message_type: Option<String>,
}

impl NotificationHeaders {
    /// Read the headers through `get`, which receives full header names.
    pub fn extract<F>(prefix: &str, get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| get(&format!("{prefix}{suffix}"));
        Self {
            message_id: read(HEADER_MESSAGE_ID),
            timestamp: read(HEADER_MESSAGE_TIMESTAMP),
            signature: read(HEADER_MESSAGE_SIGNATURE),
            message_type: read(HEADER_MESSAGE_TYPE),
        }
    }

    pub fn kind(&self) -> MessageType {
        MessageType::from_header(self.message_type.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Raw webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub subscription: Subscription,
    #[serde(default)]
    pub event: Option<Value>,
    /// Present only on verification-challenge messages.
    #[serde(default)]
    pub challenge: Option<String>,
}

impl WebhookEnvelope {
    pub fn parse(raw_body: &[u8]) -> Result<Self, VigilError> {
        Ok(serde_json::from_slice(raw_body)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamOnline {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    /// Stream kind, e.g. `live` or `playlist`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamOffline {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
}

/// A decoded platform event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Online(StreamOnline),
    Offline(StreamOffline),
}

impl StreamEvent {
    /// Lowercase channel login the event concerns.
    pub fn channel(&self) -> String {
        match self {
            Self::Online(e) => e.broadcaster_user_login.to_lowercase(),
            Self::Offline(e) => e.broadcaster_user_login.to_lowercase(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Online(_))
    }
}

/// Stream metadata cached per channel while it is believed live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub kind: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<&StreamOnline> for StreamMetadata {
    fn from(event: &StreamOnline) -> Self {
        Self {
            kind: event.kind.clone(),
            started_at: event.started_at,
        }
    }
}

type Decoder = fn(Value) -> Result<StreamEvent, serde_json::Error>;

fn decode_online(event: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value(event).map(StreamEvent::Online)
}

fn decode_offline(event: Value) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_value(event).map(StreamEvent::Offline)
}

/// Subscription type → event decoder.
pub const DECODERS: &[(&str, Decoder)] = &[
    ("stream.online", decode_online),
    ("stream.offline", decode_offline),
];

/// Decode the envelope's event. `Ok(None)` for subscription types this
/// service does not handle.
pub fn decode_event(envelope: &WebhookEnvelope) -> Result<Option<StreamEvent>, VigilError> {
    let Some((_, decode)) = DECODERS
        .iter()
        .find(|(kind, _)| *kind == envelope.subscription.kind)
    else {
        return Ok(None);
    };
    let event = envelope
        .event
        .clone()
        .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("event"))?;
    Ok(Some(decode(event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: &str, event: Value) -> WebhookEnvelope {
        serde_json::from_value(json!({
            "subscription": { "type": kind, "status": "enabled" },
            "event": event,
        }))
        .unwrap()
    }

    #[test]
    fn test_message_type_from_header() {
        assert_eq!(
            MessageType::from_header("notification"),
            MessageType::Notification
        );
        assert_eq!(
            MessageType::from_header("webhook_callback_verification"),
            MessageType::WebhookCallbackVerification
        );
        assert_eq!(
            MessageType::from_header("revocation"),
            MessageType::Revocation
        );
        assert_eq!(
            MessageType::from_header("mystery"),
            MessageType::Unknown("mystery".into())
        );
    }

    #[test]
    fn test_headers_extract_with_prefix() {
        let headers = NotificationHeaders::extract("Twitch-Eventsub-", |name| match name {
            "Twitch-Eventsub-Message-Id" => Some("abc".into()),
            "Twitch-Eventsub-Message-Type" => Some("revocation".into()),
            _ => None,
        });
        assert_eq!(headers.message_id.as_deref(), Some("abc"));
        assert!(headers.timestamp.is_none());
        assert_eq!(headers.kind(), MessageType::Revocation);
    }

    #[test]
    fn test_decode_online_normalizes_channel() {
        let env = envelope(
            "stream.online",
            json!({
                "id": "9001",
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "Alice",
                "broadcaster_user_name": "Alice",
                "type": "live",
                "started_at": "2026-10-16T10:11:12.123Z"
            }),
        );
        let event = decode_event(&env).unwrap().unwrap();
        assert!(event.is_live());
        assert_eq!(event.channel(), "alice");
        match event {
            StreamEvent::Online(online) => {
                assert_eq!(online.kind, "live");
                assert!(online.started_at.is_some());
            }
            other => panic!("expected online, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_offline() {
        let env = envelope(
            "stream.offline",
            json!({
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "alice",
                "broadcaster_user_name": "Alice"
            }),
        );
        let event = decode_event(&env).unwrap().unwrap();
        assert!(!event.is_live());
        assert_eq!(event.channel(), "alice");
    }

    #[test]
    fn test_decode_unknown_type_is_ignored() {
        let env = envelope("channel.follow", json!({"user_login": "x"}));
        assert!(decode_event(&env).unwrap().is_none());
    }

    #[test]
    fn test_decode_malformed_event_errors() {
        let env = envelope("stream.online", json!({"broadcaster_user_id": 5}));
        assert!(decode_event(&env).is_err());
    }

    #[test]
    fn test_challenge_envelope() {
        let env = WebhookEnvelope::parse(
            br#"{"challenge":"pogchamp-kappa-360noscope","subscription":{"type":"stream.online","status":"webhook_callback_verification_pending"}}"#,
        )
        .unwrap();
        assert_eq!(env.challenge.as_deref(), Some("pogchamp-kappa-360noscope"));
        assert!(env.event.is_none());
    }
}
