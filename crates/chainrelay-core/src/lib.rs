//! chainrelay-core — the event relay pipeline.
//!
//! # Architecture
//!
//! ```text
//! RelayBuilder → RelayLoop  (single worker, owns all mutable relay state)
//!                    ├── EventSource       (one filter per tracked event kind)
//!                    ├── SubscriberChannel (live fan-out, non-blocking)
//!                    ├── EventBuffer       (per-kind counters, drained at flush)
//!                    └── Archive           (one record per kind per flush window)
//! ```
//!
//! Every collaborator is a trait object handed to the loop explicitly, so the
//! whole pipeline runs in tests without a chain node, a database or a socket.

pub mod archive;
pub mod buffer;
pub mod builder;
pub mod config;
pub mod error;
pub mod relay;
pub mod source;
pub mod subscriber;
pub mod types;

pub use archive::{Archive, MemoryArchive};
pub use buffer::{EventBuffer, MemoryEventBuffer};
pub use builder::RelayBuilder;
pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::{RelayContext, RelayLoop, RelayMetrics, RelayMonitor, RelayState};
pub use source::{EventSource, FilterHandle, FromPoint};
pub use subscriber::{DeliveryReport, SubscriberChannel, SubscriberHub, SubscriberId};
pub use types::{ArchiveRecord, ArgValue, BlockRef, EventArgs, EventKind, EventOccurrence, RelayMessage};
