//! Shared types for the relay pipeline.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── EventKind ────────────────────────────────────────────────────────────────

/// The name of a contract event as it appears in the ABI (e.g. `"Transfer"`).
///
/// Used as the lookup key for filters, buffer counters and archive records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKind(String);

impl EventKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The crowdfunding contract events tracked by default, in rotation order.
    pub fn defaults() -> Vec<EventKind> {
        [
            "NewCampaignCreated",
            "NewContribution",
            "Refund",
            "GoalReached",
            "OfferReceived",
            "Transfer",
        ]
        .into_iter()
        .map(EventKind::new)
        .collect()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ─── ArgValue ─────────────────────────────────────────────────────────────────

/// A decoded event argument.
///
/// Serialises to the plain JSON scalar browsers expect: integers that fit in
/// 64 bits become JSON numbers, anything wider becomes a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Uint(u64),
    Int(i64),
    /// Unsigned integer wider than 64 bits, decimal.
    BigUint(String),
    /// Signed integer wider than 64 bits, decimal.
    BigInt(String),
    /// EVM address, EIP-55 checksummed.
    Address(String),
    Str(String),
    /// Raw bytes, `0x`-prefixed hex.
    Bytes(String),
    List(Vec<ArgValue>),
}

impl ArgValue {
    pub fn as_address(&self) -> Option<&str> {
        match self {
            ArgValue::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ArgValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Uint(v) => write!(f, "{v}"),
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::BigUint(v)
            | ArgValue::BigInt(v)
            | ArgValue::Address(v)
            | ArgValue::Str(v)
            | ArgValue::Bytes(v) => f.write_str(v),
            ArgValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Event arguments keyed by ABI parameter name, in ABI declaration order.
pub type EventArgs = IndexMap<String, ArgValue>;

// ─── EventOccurrence ──────────────────────────────────────────────────────────

/// Where an occurrence was observed on chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: String,
    pub tx_hash: String,
    pub log_index: u32,
}

/// One observed event instance. Immutable once produced by an `EventSource`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOccurrence {
    pub kind: EventKind,
    pub args: EventArgs,
    pub block: BlockRef,
}

impl EventOccurrence {
    pub fn new(kind: EventKind, args: EventArgs, block: BlockRef) -> Self {
        Self { kind, args, block }
    }

    /// The live message pushed to subscribers for this occurrence.
    pub fn to_message(&self) -> RelayMessage {
        RelayMessage {
            event_name: self.kind.clone(),
            event_args: self.args.clone(),
        }
    }
}

// ─── RelayMessage ─────────────────────────────────────────────────────────────

/// Payload sent to every connected subscriber, once per occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub event_name: EventKind,
    pub event_args: EventArgs,
}

// ─── ArchiveRecord ────────────────────────────────────────────────────────────

/// One aggregate row per event kind per flush window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Occurrences observed during the window (always ≥ 1).
    pub times: u64,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(kind: EventKind, times: u64, timestamp: DateTime<Utc>) -> Self {
        Self { kind, times, timestamp }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
