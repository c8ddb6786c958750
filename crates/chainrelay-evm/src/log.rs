//! Raw log shape returned by `eth_getFilterChanges`.

use serde::{Deserialize, Serialize};

use chainrelay_core::BlockRef;

/// A log entry as the node returns it. Pending logs carry no block fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: Option<String>,
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            number: self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0),
            hash: self.block_hash.clone().unwrap_or_default(),
            tx_hash: self.tx_hash.clone().unwrap_or_default(),
            log_index: self.log_index.as_deref().map(parse_hex_u64).unwrap_or(0) as u32,
        }
    }

    /// The log's data payload as bytes.
    pub fn data_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        decode_hex(&self.data)
    }
}

/// Parse a `0x`-prefixed hex quantity; malformed input reads as 0.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}

/// Decode `0x`-prefixed (or bare) hex data. `"0x"` is empty.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

/// Lowercase `0x`-prefixed hex.
pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}
