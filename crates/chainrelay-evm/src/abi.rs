//! Contract ABI handling: event topics and log decoding.
//!
//! The topic of an EVM event is the keccak256 hash of its canonical
//! signature, e.g.:
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef
//!
//! Decoded arguments are returned in ABI input order. Indexed params come from
//! `topics[1..]`, the rest from the ABI-encoded data payload.

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Event, EventParam, JsonAbi};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use chainrelay_core::{ArgValue, EventArgs, EventKind, EventOccurrence};

use crate::log::{decode_hex, encode_hex, RawLog};

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("invalid ABI JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("cannot read ABI file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("event '{0}' is not declared in the contract ABI")]
    UnknownEvent(String),

    #[error("no ABI event matches topic {0}")]
    UnknownTopic(String),

    #[error("log has no topics")]
    MissingSignature,

    #[error("indexed param '{param}' has no topic")]
    MissingTopic { param: String },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("cannot decode '{param}': {reason}")]
    Decode { param: String, reason: String },
}

/// Compute the keccak256 topic of a canonical event signature.
/// Input: `"EventName(type1,type2,...)"`. Output: lowercase `0x` hex.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    encode_hex(output)
}

/// One decodable event of the contract.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub kind: EventKind,
    pub signature: String,
    pub topic0: String,
    inputs: Vec<EventParam>,
}

impl EventSpec {
    fn from_event(event: &Event) -> Self {
        let signature = event.signature();
        Self {
            kind: EventKind::new(event.name.clone()),
            topic0: keccak256_signature(&signature),
            signature,
            inputs: event.inputs.clone(),
        }
    }

    /// Param names in ABI order.
    pub fn param_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|p| p.name.as_str()).collect()
    }
}

/// The events of one contract, addressable by name and by topic.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    events: HashMap<EventKind, EventSpec>,
    by_topic: HashMap<String, EventKind>,
}

impl ContractAbi {
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        let abi: JsonAbi = serde_json::from_str(json)?;
        let mut out = Self::default();

        for (name, overloads) in &abi.events {
            let Some(event) = overloads.iter().find(|e| !e.anonymous) else {
                tracing::debug!(event = %name, "anonymous event has no topic, not relayable");
                continue;
            };
            if overloads.len() > 1 {
                tracing::warn!(event = %name, using = %event.signature(), "overloaded event, using first declaration");
            }
            let spec = EventSpec::from_event(event);
            out.by_topic.insert(spec.topic0.clone(), spec.kind.clone());
            out.events.insert(spec.kind.clone(), spec);
        }

        Ok(out)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AbiError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| AbiError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn event(&self, kind: &EventKind) -> Option<&EventSpec> {
        self.events.get(kind)
    }

    /// Topic of `kind`, if the ABI declares it.
    pub fn topic0(&self, kind: &EventKind) -> Result<&str, AbiError> {
        self.events
            .get(kind)
            .map(|s| s.topic0.as_str())
            .ok_or_else(|| AbiError::UnknownEvent(kind.to_string()))
    }

    pub fn kind_for_topic(&self, topic: &str) -> Option<&EventKind> {
        self.by_topic.get(&topic.to_ascii_lowercase())
    }

    /// Declared event kinds, sorted by name.
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.events.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Decode a raw log into an occurrence of the event its `topics[0]` names.
    pub fn decode_log(&self, log: &RawLog) -> Result<EventOccurrence, AbiError> {
        let topic0 = log.topics.first().ok_or(AbiError::MissingSignature)?;
        let kind = self
            .kind_for_topic(topic0)
            .ok_or_else(|| AbiError::UnknownTopic(topic0.clone()))?;
        let spec = &self.events[kind];

        let mut topics = log.topics.iter().skip(1);
        let mut slots: Vec<Option<ArgValue>> = Vec::with_capacity(spec.inputs.len());
        let mut data_types = Vec::new();

        for param in &spec.inputs {
            if param.indexed {
                let topic = topics.next().ok_or_else(|| AbiError::MissingTopic {
                    param: param.name.clone(),
                })?;
                slots.push(Some(decode_topic(param, topic)?));
            } else {
                slots.push(None);
                data_types.push(resolve(param)?);
            }
        }

        let data_values = if data_types.is_empty() {
            Vec::new()
        } else {
            let data = log.data_bytes()?;
            match DynSolType::Tuple(data_types).abi_decode_params(&data) {
                Ok(DynSolValue::Tuple(values)) => values,
                Ok(other) => vec![other],
                Err(e) => {
                    return Err(AbiError::Decode {
                        param: "data".into(),
                        reason: e.to_string(),
                    })
                }
            }
        };
        let mut data_values = data_values.into_iter();

        let mut args = EventArgs::new();
        for (param, slot) in spec.inputs.iter().zip(slots) {
            let value = match slot {
                Some(v) => v,
                None => {
                    let raw = data_values.next().ok_or_else(|| AbiError::Decode {
                        param: param.name.clone(),
                        reason: "missing from data".into(),
                    })?;
                    normalize(raw)
                }
            };
            args.insert(param.name.clone(), value);
        }

        Ok(EventOccurrence::new(kind.clone(), args, log.block_ref()))
    }
}

fn resolve(param: &EventParam) -> Result<DynSolType, AbiError> {
    param.resolve().map_err(|e| AbiError::Decode {
        param: param.name.clone(),
        reason: e.to_string(),
    })
}

/// Decode a single indexed topic (always 32 bytes).
///
/// Value types are padded to 32 bytes and decode directly. Reference types
/// (string, bytes, arrays, tuples) are stored as the keccak256 of their
/// encoding; the original value is unrecoverable, so the hash is returned.
fn decode_topic(param: &EventParam, topic: &str) -> Result<ArgValue, AbiError> {
    let bytes = decode_hex(topic)?;
    let ty = resolve(param)?;

    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(ArgValue::Bytes(encode_hex(&bytes))),
        value_type => value_type
            .abi_decode(&bytes)
            .map(normalize)
            .map_err(|e| AbiError::Decode {
                param: param.name.clone(),
                reason: format!("topic decode: {e}"),
            }),
    }
}

/// Convert a decoded `DynSolValue` into a wire-ready `ArgValue`.
pub fn normalize(val: DynSolValue) -> ArgValue {
    match val {
        DynSolValue::Bool(b) => ArgValue::Bool(b),

        DynSolValue::Int(i, _bits) => match i64::try_from(i) {
            Ok(v) => ArgValue::Int(v),
            Err(_) => ArgValue::BigInt(i.to_string()),
        },

        DynSolValue::Uint(u, _bits) => match u64::try_from(u) {
            Ok(v) => ArgValue::Uint(v),
            Err(_) => ArgValue::BigUint(u.to_string()),
        },

        // Only the first `size` bytes are meaningful.
        DynSolValue::FixedBytes(word, size) => ArgValue::Bytes(encode_hex(&word[..size])),

        DynSolValue::Bytes(b) => ArgValue::Bytes(encode_hex(b)),

        DynSolValue::String(s) => ArgValue::Str(s),

        // EIP-55 checksum encoding
        DynSolValue::Address(a) => ArgValue::Address(a.to_checksum(None)),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            ArgValue::List(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Function(f) => ArgValue::Bytes(encode_hex(f.as_slice())),

        #[allow(unreachable_patterns)]
        other => ArgValue::Str(format!("{other:?}")),
    }
}
