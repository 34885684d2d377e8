//! Webhook authenticity: HMAC-SHA256 over `message_id + timestamp + body`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use vigil_core::{config::WebhookConfig, error::VigilError, notification::NotificationHeaders};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the `sha256=<hex>` signature the platform sends for a message.
pub fn sign(secret: &str, message_id: &str, timestamp: &str, raw_body: &[u8]) -> String {
    format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac_for(secret, message_id, timestamp, raw_body).finalize().into_bytes())
    )
}

fn mac_for(secret: &str, message_id: &str, timestamp: &str, raw_body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length");
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(raw_body);
    mac
}

/// Check the header signature against the shared secret in constant time.
///
/// Fails closed: an empty secret or any missing header is `false`.
pub fn verify_signature(headers: &NotificationHeaders, raw_body: &[u8], secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let (Some(id), Some(ts), Some(sig)) = (
        headers.message_id.as_deref(),
        headers.timestamp.as_deref(),
        headers.signature.as_deref(),
    ) else {
        return false;
    };
    let Some(expected) = sig
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };
    mac_for(secret, id, ts, raw_body)
        .verify_slice(&expected)
        .is_ok()
}

/// Signature gate for the webhook endpoint.
#[derive(Debug, Clone)]
pub struct Verifier {
    secret: String,
    bypass: bool,
}

impl Verifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            bypass: false,
        }
    }

    /// Development-only verifier that admits unsigned notifications.
    pub fn insecure_bypass() -> Self {
        Self {
            secret: String::new(),
            bypass: true,
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        if config.skip_signature_verification {
            warn!("webhook signature verification is DISABLED (development bypass)");
            Self::insecure_bypass()
        } else {
            Self::new(config.secret.clone())
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn check(&self, headers: &NotificationHeaders, raw_body: &[u8]) -> Result<(), VigilError> {
        if self.bypass {
            return Ok(());
        }
        if self.secret.is_empty() {
            return Err(VigilError::SignatureInvalid("no secret configured".into()));
        }
        if headers.message_id.is_none() || headers.timestamp.is_none() || headers.signature.is_none()
        {
            return Err(VigilError::SignatureInvalid(
                "missing signature headers".into(),
            ));
        }
        if verify_signature(headers, raw_body, &self.secret) {
            Ok(())
        } else {
            Err(VigilError::SignatureInvalid("signature mismatch".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t-webhook";
    const BODY: &[u8] = br#"{"subscription":{"type":"stream.online"},"event":{}}"#;

    fn signed_headers(id: &str, ts: &str, body: &[u8]) -> NotificationHeaders {
        NotificationHeaders {
            message_id: Some(id.into()),
            timestamp: Some(ts.into()),
            signature: Some(sign(SECRET, id, ts, body)),
            message_type: Some("notification".into()),
        }
    }

    #[test]
    fn test_sign_known_vector() {
        // HMAC-SHA256(key="key", "The quick brown fox jumps over the lazy dog")
        let sig = sign(
            "key",
            "The quick brown fox ",
            "jumps over ",
            b"the lazy dog",
        );
        assert_eq!(
            sig,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        let headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        assert!(verify_signature(&headers, BODY, SECRET));
        assert!(Verifier::new(SECRET).check(&headers, BODY).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        assert!(!verify_signature(&headers, b"{}", SECRET));
    }

    #[test]
    fn test_signature_binds_message_id_and_timestamp() {
        let mut headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        headers.message_id = Some("m-2".into());
        assert!(!verify_signature(&headers, BODY, SECRET));

        let mut headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        headers.timestamp = Some("2026-10-16T10:00:01Z".into());
        assert!(!verify_signature(&headers, BODY, SECRET));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        assert!(!verify_signature(&headers, BODY, "other"));
    }

    #[test]
    fn test_fails_closed_on_missing_inputs() {
        let headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        assert!(!verify_signature(&headers, BODY, ""));

        for strip in 0..3 {
            let mut h = headers.clone();
            match strip {
                0 => h.message_id = None,
                1 => h.timestamp = None,
                _ => h.signature = None,
            }
            assert!(!verify_signature(&h, BODY, SECRET));
            assert!(matches!(
                Verifier::new(SECRET).check(&h, BODY),
                Err(VigilError::SignatureInvalid(_))
            ));
        }
    }

    #[test]
    fn test_malformed_signature_header_rejected() {
        let mut headers = signed_headers("m-1", "2026-10-16T10:00:00Z", BODY);
        let bare = headers.signature.clone().unwrap().replace("sha256=", "");
        headers.signature = Some(bare);
        assert!(!verify_signature(&headers, BODY, SECRET));

        headers.signature = Some("sha256=not-hex".into());
        assert!(!verify_signature(&headers, BODY, SECRET));
    }

    #[test]
    fn test_bypass_is_opt_in() {
        let unsigned = NotificationHeaders::default();
        assert!(Verifier::new(SECRET).check(&unsigned, BODY).is_err());
        assert!(Verifier::from_config(&WebhookConfig::default())
            .check(&unsigned, BODY)
            .is_err());

        let bypass = Verifier::insecure_bypass();
        assert!(bypass.is_bypassed());
        assert!(bypass.check(&unsigned, BODY).is_ok());
    }
}
