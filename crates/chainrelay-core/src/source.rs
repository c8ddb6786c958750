//! `EventSource` trait — abstraction over pull-style chain event filters.
//!
//! A source hands out one `FilterHandle` per event kind. Each `poll` returns
//! only the occurrences that appeared since the previous poll of that handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::types::{EventKind, EventOccurrence};

/// Where a new filter starts observing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FromPoint {
    /// The current chain head. Nothing before it is replayed.
    #[default]
    Latest,
    /// A specific block number (inclusive).
    Block(u64),
}

/// Cursor-like handle tracking "new since last poll" for one event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterHandle {
    pub kind: EventKind,
    /// Source-specific filter identifier (an `eth_newFilter` id for EVM).
    pub id: String,
}

impl FilterHandle {
    pub fn new(kind: EventKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Install a filter for `kind`.
    async fn open_filter(
        &self,
        kind: &EventKind,
        from: FromPoint,
    ) -> Result<FilterHandle, RelayError>;

    /// Fetch occurrences observed since the last poll of `handle`, in the
    /// order the node reported them. Returns an empty vec when nothing new
    /// arrived; never waits for new occurrences.
    async fn poll(&self, handle: &FilterHandle) -> Result<Vec<EventOccurrence>, RelayError>;

    /// Release a filter. Best-effort; the default does nothing.
    async fn uninstall_filter(&self, _handle: &FilterHandle) -> Result<(), RelayError> {
        Ok(())
    }
}
