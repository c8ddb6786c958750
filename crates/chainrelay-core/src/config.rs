//! Relay loop configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::RelayError;
use crate::source::FromPoint;
use crate::types::EventKind;

/// Tunables for the relay loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// How long counts accumulate before they are archived.
    #[serde(default = "default_flush_window")]
    pub flush_window_seconds: u64,
    /// Pause between two consecutive per-kind polls.
    #[serde(default = "default_poll_delay")]
    pub per_kind_poll_delay_seconds: u64,
    /// Upper bound on a single poll call.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Event kinds to poll, in rotation order.
    #[serde(default = "EventKind::defaults")]
    pub tracked_event_kinds: Vec<EventKind>,
    /// Where freshly installed filters start.
    #[serde(default)]
    pub from: FromPoint,
    /// Failed archive writes kept for retry; the oldest is dropped beyond this.
    #[serde(default = "default_max_pending")]
    pub max_pending_records: usize,
    /// Per-subscriber outgoing queue length.
    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

fn default_flush_window() -> u64 { 300 }
fn default_poll_delay() -> u64 { 3 }
fn default_poll_timeout() -> u64 { 30 }
fn default_max_pending() -> usize { 1_024 }
fn default_queue_capacity() -> usize { 256 }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_window_seconds: default_flush_window(),
            per_kind_poll_delay_seconds: default_poll_delay(),
            poll_timeout_seconds: default_poll_timeout(),
            tracked_event_kinds: EventKind::defaults(),
            from: FromPoint::Latest,
            max_pending_records: default_max_pending(),
            subscriber_queue_capacity: default_queue_capacity(),
        }
    }
}

impl RelayConfig {
    pub fn flush_window(&self) -> Duration {
        Duration::from_secs(self.flush_window_seconds)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.per_kind_poll_delay_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.flush_window_seconds == 0 {
            return Err(RelayError::Config("flush_window_seconds must be > 0".into()));
        }
        if self.poll_timeout_seconds == 0 {
            return Err(RelayError::Config("poll_timeout_seconds must be > 0".into()));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(RelayError::Config("subscriber_queue_capacity must be > 0".into()));
        }
        if self.tracked_event_kinds.is_empty() {
            return Err(RelayError::Config("tracked_event_kinds is empty".into()));
        }
        let mut seen = HashSet::new();
        for kind in &self.tracked_event_kinds {
            if !seen.insert(kind) {
                return Err(RelayError::Config(format!("event kind '{kind}' listed twice")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.flush_window(), Duration::from_secs(300));
        assert_eq!(cfg.poll_delay(), Duration::from_secs(3));
        assert_eq!(cfg.tracked_event_kinds.len(), 6);
        assert_eq!(cfg.from, FromPoint::Latest);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let cfg: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.flush_window_seconds, 300);
        assert_eq!(cfg.tracked_event_kinds, EventKind::defaults());
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = RelayConfig::default();
        cfg.flush_window_seconds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.tracked_event_kinds = vec!["Refund".into(), "Refund".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.tracked_event_kinds.clear();
        assert!(cfg.validate().is_err());
    }
}
