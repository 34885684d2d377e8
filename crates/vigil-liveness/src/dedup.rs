//! Replay guard and idempotency window for inbound notifications.
//!
//! The window remembers notification IDs for a fixed TTL. It has no timer:
//! once it grows past the prune threshold, every insert sweeps expired IDs.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use vigil_core::{config::WebhookConfig, error::VigilError};

/// Notification IDs seen recently, with their receipt time.
#[derive(Debug)]
pub struct IdempotencyWindow {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
    prune_threshold: usize,
}

impl IdempotencyWindow {
    pub fn new(ttl: std::time::Duration, prune_threshold: usize) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            prune_threshold,
        }
    }

    /// Record `id` at `now`. Returns `false` if it was already seen within the TTL.
    pub fn record_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(received) = seen.get(id) {
            if now.signed_duration_since(*received) < self.ttl {
                return false;
            }
        }
        seen.insert(id.to_string(), now);
        if seen.len() > self.prune_threshold {
            let before = seen.len();
            let ttl = self.ttl;
            seen.retain(|_, received| now.signed_duration_since(*received) < ttl);
            debug!(
                "dedup: pruned {} expired notification ids",
                before - seen.len()
            );
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every ID.
    pub fn reset(&self) {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Why a notification was or was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Message ID missing, or timestamp missing or unparseable.
    Malformed,
    /// Timestamp older than the allowed age.
    Stale,
    /// ID already processed within the window.
    Duplicate,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }

    pub fn into_result(self, message_id: &str) -> Result<(), VigilError> {
        match self {
            Self::Admit => Ok(()),
            Self::Malformed => Err(VigilError::ReplayOrDuplicate(format!(
                "{message_id}: missing message id or unparseable timestamp"
            ))),
            Self::Stale => Err(VigilError::ReplayOrDuplicate(format!(
                "{message_id}: timestamp too old"
            ))),
            Self::Duplicate => Err(VigilError::ReplayOrDuplicate(format!(
                "{message_id}: already processed"
            ))),
        }
    }
}

/// Freshness check plus deduplication, independent of signature validity.
#[derive(Debug)]
pub struct ReplayGuard {
    window: IdempotencyWindow,
    max_age: Duration,
}

impl ReplayGuard {
    pub fn new(window: IdempotencyWindow, max_age: std::time::Duration) -> Self {
        Self {
            window,
            max_age: Duration::from_std(max_age).unwrap_or_else(|_| Duration::days(36_500)),
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(
            IdempotencyWindow::new(
                std::time::Duration::from_secs(config.dedup_ttl_secs),
                config.dedup_prune_threshold,
            ),
            std::time::Duration::from_secs(config.max_age_secs),
        )
    }

    pub fn should_process_event(&self, message_id: &str, timestamp: Option<&str>) -> Admission {
        self.should_process_event_at(message_id, timestamp, Utc::now())
    }

    pub fn should_process_event_at(
        &self,
        message_id: &str,
        timestamp: Option<&str>,
        now: DateTime<Utc>,
    ) -> Admission {
        if message_id.trim().is_empty() {
            return Admission::Malformed;
        }
        let Some(sent_at) = timestamp.and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
        else {
            return Admission::Malformed;
        };
        if now.signed_duration_since(sent_at.with_timezone(&Utc)) > self.max_age {
            return Admission::Stale;
        }
        if !self.window.record_at(message_id, now) {
            return Admission::Duplicate;
        }
        Admission::Admit
    }

    pub fn window(&self) -> &IdempotencyWindow {
        &self.window
    }

    pub fn reset(&self) {
        self.window.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn guard() -> ReplayGuard {
        ReplayGuard::from_config(&WebhookConfig::default())
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_first_delivery_admitted_second_dropped() {
        let g = guard();
        let now = at("2026-10-16T12:00:00Z");
        let ts = Some("2026-10-16T11:59:58Z");
        assert_eq!(g.should_process_event_at("m-1", ts, now), Admission::Admit);
        assert_eq!(
            g.should_process_event_at("m-1", ts, now + Duration::seconds(5)),
            Admission::Duplicate
        );
        assert_eq!(g.window().len(), 1);
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let g = guard();
        let now = at("2026-10-16T12:00:00Z");
        assert_eq!(
            g.should_process_event_at("m-1", Some("2026-10-16T11:49:59Z"), now),
            Admission::Stale
        );
        // Exactly at the limit is still fresh.
        assert_eq!(
            g.should_process_event_at("m-2", Some("2026-10-16T11:50:00Z"), now),
            Admission::Admit
        );
        // Stale rejections do not consume the ID.
        assert!(g.window().len() == 1);
    }

    #[test]
    fn test_malformed_timestamp_rejected() {
        let g = guard();
        let now = Utc::now();
        assert_eq!(
            g.should_process_event_at("m-1", Some("yesterday"), now),
            Admission::Malformed
        );
        assert_eq!(
            g.should_process_event_at("m-1", None, now),
            Admission::Malformed
        );
        assert!(g.window().is_empty());
    }

    #[test]
    fn test_missing_message_id_rejected() {
        let g = guard();
        let now = at("2026-10-16T12:00:00Z");
        let ts = Some("2026-10-16T11:59:58Z");
        assert_eq!(g.should_process_event_at("", ts, now), Admission::Malformed);
        assert_eq!(g.should_process_event_at("  ", ts, now), Admission::Malformed);
        assert!(g.window().is_empty());
    }

    #[test]
    fn test_nanosecond_timestamps_parse() {
        let g = guard();
        let now = at("2026-10-16T12:00:00Z");
        assert!(g
            .should_process_event_at("m-1", Some("2026-10-16T11:59:59.123456789Z"), now)
            .is_admitted());
    }

    #[test]
    fn test_id_readmitted_after_ttl() {
        let window = IdempotencyWindow::new(StdDuration::from_secs(600), 1000);
        let t0 = at("2026-10-16T12:00:00Z");
        assert!(window.record_at("m-1", t0));
        assert!(!window.record_at("m-1", t0 + Duration::seconds(599)));
        assert!(window.record_at("m-1", t0 + Duration::seconds(600)));
    }

    #[test]
    fn test_prune_bounds_window_size() {
        let window = IdempotencyWindow::new(StdDuration::from_secs(600), 10);
        let t0 = at("2026-10-16T12:00:00Z");
        for i in 0..10 {
            assert!(window.record_at(&format!("old-{i}"), t0));
        }
        assert_eq!(window.len(), 10);

        // Crossing the threshold after the TTL sweeps every old entry.
        let later = t0 + Duration::seconds(601);
        assert!(window.record_at("new-0", later));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_prune_keeps_fresh_entries() {
        let window = IdempotencyWindow::new(StdDuration::from_secs(600), 3);
        let t0 = at("2026-10-16T12:00:00Z");
        for i in 0..5 {
            window.record_at(&format!("m-{i}"), t0 + Duration::seconds(i));
        }
        assert_eq!(window.len(), 5);
        assert!(!window.record_at("m-0", t0 + Duration::seconds(10)));
    }

    #[test]
    fn test_admission_into_result() {
        assert!(Admission::Admit.into_result("m").is_ok());
        assert!(matches!(
            Admission::Duplicate.into_result("m"),
            Err(VigilError::ReplayOrDuplicate(_))
        ));
    }

    #[test]
    fn test_reset_clears_window() {
        let g = guard();
        let now = Utc::now();
        let ts = now.to_rfc3339();
        assert!(g.should_process_event_at("m-1", Some(&ts), now).is_admitted());
        g.reset();
        assert!(g.should_process_event_at("m-1", Some(&ts), now).is_admitted());
    }
}
