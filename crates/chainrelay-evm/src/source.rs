//! `EventSource` over the node's log-filter API.
//!
//! One filter per event kind, keyed on the contract address and the kind's
//! topic:
//!
//! ```text
//! eth_newFilter        { address, topics: [topic0], fromBlock } → filter id
//! eth_getFilterChanges [filter id]                               → [log]
//! eth_uninstallFilter  [filter id]                               → bool
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use chainrelay_core::{EventKind, EventOccurrence, EventSource, FilterHandle, FromPoint, RelayError};

use crate::abi::ContractAbi;
use crate::log::RawLog;
use crate::rpc::{RpcTransport, TransportError};

pub struct EvmEventSource<T: RpcTransport> {
    transport: T,
    contract: String,
    abi: ContractAbi,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EvmEventSource<T> {
    pub fn new(transport: T, contract: impl Into<String>, abi: ContractAbi) -> Self {
        Self {
            transport,
            contract: contract.into(),
            abi,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn abi(&self) -> &ContractAbi {
        &self.abi
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    async fn call<R: DeserializeOwned + Send>(&self, method: &str, params: Vec<Value>) -> Result<R, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.transport.call(id, method, params).await
    }

    /// Probe the node with `net_version`.
    pub async fn is_connected(&self) -> bool {
        match self.call::<String>("net_version", vec![]).await {
            Ok(network) => {
                debug!(url = %self.transport.url(), network = %network, "node reachable");
                true
            }
            Err(e) => {
                warn!(url = %self.transport.url(), error = %e, "node unreachable");
                false
            }
        }
    }

    fn from_param(from: FromPoint) -> Value {
        match from {
            FromPoint::Latest => Value::String("latest".into()),
            FromPoint::Block(n) => Value::String(format!("0x{n:x}")),
        }
    }
}

#[async_trait]
impl<T: RpcTransport> EventSource for EvmEventSource<T> {
    async fn open_filter(&self, kind: &EventKind, from: FromPoint) -> Result<FilterHandle, RelayError> {
        let topic0 = self
            .abi
            .topic0(kind)
            .map_err(|e| RelayError::Config(e.to_string()))?;

        let params = json!({
            "address": self.contract,
            "topics": [topic0],
            "fromBlock": Self::from_param(from),
        });
        let id: String = self.call("eth_newFilter", vec![params]).await?;

        Ok(FilterHandle::new(kind.clone(), id))
    }

    async fn poll(&self, handle: &FilterHandle) -> Result<Vec<EventOccurrence>, RelayError> {
        let logs: Vec<RawLog> = self
            .call("eth_getFilterChanges", vec![Value::String(handle.id.clone())])
            .await
            .map_err(|e| {
                if e.is_filter_not_found() {
                    RelayError::FilterNotFound {
                        filter_id: handle.id.clone(),
                    }
                } else {
                    e.into()
                }
            })?;

        let mut occurrences = Vec::with_capacity(logs.len());
        for log in logs {
            if log.is_removed() {
                debug!(kind = %handle.kind, tx = ?log.tx_hash, "skipping log removed by reorg");
                continue;
            }
            match self.abi.decode_log(&log) {
                Ok(occurrence) => occurrences.push(occurrence),
                Err(e) => {
                    warn!(kind = %handle.kind, tx = ?log.tx_hash, error = %e, "undecodable log skipped");
                }
            }
        }
        Ok(occurrences)
    }

    async fn uninstall_filter(&self, handle: &FilterHandle) -> Result<(), RelayError> {
        let removed: bool = self
            .call("eth_uninstallFilter", vec![Value::String(handle.id.clone())])
            .await?;
        debug!(kind = %handle.kind, filter = %handle.id, removed, "filter uninstalled");
        Ok(())
    }
}
