//! Fluent builder API for assembling a relay loop.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use chainrelay_core::{EventSource, MemoryArchive, RelayBuilder, SubscriberHub};
//! # fn source() -> Arc<dyn EventSource> { unimplemented!() }
//! let relay = RelayBuilder::new()
//!     .source(source())
//!     .archive(Arc::new(MemoryArchive::new()))
//!     .channel(Arc::new(SubscriberHub::default()))
//!     .flush_window_seconds(60)
//!     .tracked_kinds(["Transfer", "Approval"])
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::archive::Archive;
use crate::buffer::{EventBuffer, MemoryEventBuffer};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::{RelayContext, RelayLoop};
use crate::source::{EventSource, FromPoint};
use crate::subscriber::SubscriberChannel;
use crate::types::EventKind;

/// Fluent builder for `RelayLoop`.
#[derive(Default)]
pub struct RelayBuilder {
    config: RelayConfig,
    source: Option<Arc<dyn EventSource>>,
    buffer: Option<Arc<dyn EventBuffer>>,
    archive: Option<Arc<dyn Archive>>,
    channel: Option<Arc<dyn SubscriberChannel>>,
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Counter store. Defaults to a `MemoryEventBuffer` over the tracked kinds.
    pub fn buffer(mut self, buffer: Arc<dyn EventBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn SubscriberChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn flush_window_seconds(mut self, secs: u64) -> Self {
        self.config.flush_window_seconds = secs;
        self
    }

    pub fn poll_delay_seconds(mut self, secs: u64) -> Self {
        self.config.per_kind_poll_delay_seconds = secs;
        self
    }

    pub fn poll_timeout_seconds(mut self, secs: u64) -> Self {
        self.config.poll_timeout_seconds = secs;
        self
    }

    /// Set the event kinds to poll, in rotation order.
    pub fn tracked_kinds<I, K>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKind>,
    {
        self.config.tracked_event_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_from(mut self, from: FromPoint) -> Self {
        self.config.from = from;
        self
    }

    pub fn max_pending_records(mut self, n: usize) -> Self {
        self.config.max_pending_records = n;
        self
    }

    /// Validate the configuration and assemble the loop.
    pub fn build(self) -> Result<RelayLoop, RelayError> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| RelayError::Config("relay needs an event source".into()))?;
        let archive = self
            .archive
            .ok_or_else(|| RelayError::Config("relay needs an archive".into()))?;
        let channel = self
            .channel
            .ok_or_else(|| RelayError::Config("relay needs a subscriber channel".into()))?;

        let buffer = match self.buffer {
            Some(buffer) => {
                let tracked = buffer.tracked_kinds();
                if let Some(missing) = self
                    .config
                    .tracked_event_kinds
                    .iter()
                    .find(|k| !tracked.contains(k))
                {
                    return Err(RelayError::Config(format!(
                        "buffer does not track event kind '{missing}'"
                    )));
                }
                buffer
            }
            None => Arc::new(MemoryEventBuffer::new(
                self.config.tracked_event_kinds.iter().cloned(),
            )),
        };

        Ok(RelayLoop::new(
            self.config,
            RelayContext {
                source,
                buffer,
                archive,
                channel,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::source::FilterHandle;
    use crate::subscriber::SubscriberHub;
    use crate::types::EventOccurrence;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl EventSource for Silent {
        async fn open_filter(&self, kind: &EventKind, _from: FromPoint) -> Result<FilterHandle, RelayError> {
            Ok(FilterHandle::new(kind.clone(), "0x1"))
        }

        async fn poll(&self, _handle: &FilterHandle) -> Result<Vec<EventOccurrence>, RelayError> {
            Ok(vec![])
        }
    }

    fn complete() -> RelayBuilder {
        RelayBuilder::new()
            .source(Arc::new(Silent))
            .archive(Arc::new(MemoryArchive::new()))
            .channel(Arc::new(SubscriberHub::default()))
    }

    #[test]
    fn builder_defaults() {
        let relay = complete().build().unwrap();
        assert_eq!(relay.config().flush_window_seconds, 300);
        assert_eq!(relay.config().per_kind_poll_delay_seconds, 3);
        assert_eq!(relay.config().tracked_event_kinds, EventKind::defaults());
    }

    #[test]
    fn builder_custom() {
        let relay = complete()
            .flush_window_seconds(60)
            .poll_delay_seconds(1)
            .poll_timeout_seconds(10)
            .tracked_kinds(["Transfer", "Approval"])
            .start_from(FromPoint::Block(19_000_000))
            .max_pending_records(8)
            .build()
            .unwrap();

        let cfg = relay.config();
        assert_eq!(cfg.flush_window_seconds, 60);
        assert_eq!(cfg.per_kind_poll_delay_seconds, 1);
        assert_eq!(cfg.poll_timeout_seconds, 10);
        assert_eq!(cfg.tracked_event_kinds, vec![EventKind::new("Transfer"), EventKind::new("Approval")]);
        assert_eq!(cfg.from, FromPoint::Block(19_000_000));
        assert_eq!(cfg.max_pending_records, 8);
    }

    #[test]
    fn missing_components_are_config_errors() {
        let err = RelayBuilder::new().build().err().unwrap();
        assert!(matches!(err, RelayError::Config(_)));

        let err = RelayBuilder::new()
            .source(Arc::new(Silent))
            .channel(Arc::new(SubscriberHub::default()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(complete().flush_window_seconds(0).build().is_err());
    }

    #[test]
    fn buffer_must_cover_tracked_kinds() {
        let err = complete()
            .tracked_kinds(["Transfer", "Approval"])
            .buffer(Arc::new(MemoryEventBuffer::new([EventKind::new("Transfer")])))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Approval"));
    }
}
