//! `EvmEventSource` against a scripted in-process transport.

use async_trait::async_trait;
use chainrelay_core::{ArgValue, EventKind, EventSource, FilterHandle, FromPoint, RelayError};
use chainrelay_evm::{
    keccak256_signature, ContractAbi, EvmEventSource, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RpcTransport, TransportError,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const ABI: &str = include_str!("../../../config/crowdfunding.abi.json");
const CONTRACT: &str = "0x86D219D65452b013912B2af7b2E65E903fa3777d";

type Reply = Result<Value, (i64, String)>;

/// Answers each method from a per-method queue and records every request.
#[derive(Clone, Default)]
struct ScriptedTransport {
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
    down: Arc<Mutex<bool>>,
}

impl ScriptedTransport {
    fn reply(&self, method: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    fn requests(&self, method: &str) -> Vec<JsonRpcRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if *self.down.lock().unwrap() {
            return Err(TransportError::Http("connection refused".into()));
        }
        self.requests.lock().unwrap().push(req.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&req.method)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(Value::Null));
        let (result, error) = match reply {
            Ok(result) => (Some(result), None),
            Err((code, message)) => (None, Some(JsonRpcError { code, message, data: None })),
        };
        Ok(JsonRpcResponse { id: json!(req.id), result, error })
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}

fn source() -> (ScriptedTransport, EvmEventSource<ScriptedTransport>) {
    let transport = ScriptedTransport::default();
    let abi = ContractAbi::from_json(ABI).unwrap();
    (transport.clone(), EvmEventSource::new(transport, CONTRACT, abi))
}

fn padded_address(addr: &str) -> String {
    format!("0x{:0>64}", addr.trim_start_matches("0x"))
}

fn padded_uint(n: u64) -> String {
    format!("0x{:064x}", n)
}

fn refund_log(amount: u64, removed: bool) -> Value {
    json!({
        "address": CONTRACT.to_lowercase(),
        "topics": [
            keccak256_signature("Refund(address,uint256,uint256)"),
            padded_address("d8da6bf26964af9d7eed9e03e53415d37aa96045"),
            padded_uint(amount),
            padded_uint(3),
        ],
        "data": "0x",
        "blockNumber": "0x1b4",
        "blockHash": "0x01",
        "transactionHash": "0x02",
        "logIndex": "0x0",
        "removed": removed,
    })
}

#[tokio::test]
async fn open_filter_targets_contract_and_topic() {
    let (transport, source) = source();
    transport.reply("eth_newFilter", Ok(json!("0xfilter1")));
    transport.reply("eth_newFilter", Ok(json!("0xfilter2")));

    let handle = source.open_filter(&EventKind::new("Refund"), FromPoint::Latest).await.unwrap();
    assert_eq!(handle.id, "0xfilter1");
    assert_eq!(handle.kind.as_str(), "Refund");

    source
        .open_filter(&EventKind::new("Transfer"), FromPoint::Block(0x100))
        .await
        .unwrap();

    let reqs = transport.requests("eth_newFilter");
    let params = &reqs[0].params[0];
    assert_eq!(params["address"], CONTRACT);
    assert_eq!(params["topics"][0], keccak256_signature("Refund(address,uint256,uint256)"));
    assert_eq!(params["fromBlock"], "latest");
    assert_eq!(reqs[1].params[0]["fromBlock"], "0x100");
}

#[tokio::test]
async fn open_filter_for_undeclared_event_is_config_error() {
    let (_transport, source) = source();
    let err = source
        .open_filter(&EventKind::new("Withdrawal"), FromPoint::Latest)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Config(_)));
}

#[tokio::test]
async fn poll_decodes_and_skips_removed_logs() {
    let (transport, source) = source();
    transport.reply(
        "eth_getFilterChanges",
        Ok(json!([refund_log(500, false), refund_log(600, true), refund_log(700, false)])),
    );

    let handle = FilterHandle::new(EventKind::new("Refund"), "0xf");
    let occurrences = source.poll(&handle).await.unwrap();

    assert_eq!(occurrences.len(), 2);
    let first = &occurrences[0];
    assert_eq!(first.kind.as_str(), "Refund");
    assert_eq!(
        first.args.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["refunded", "amount", "campaignID"]
    );
    assert_eq!(
        first.args["refunded"],
        ArgValue::Address("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".into())
    );
    assert_eq!(first.args["amount"], ArgValue::Uint(500));
    assert_eq!(first.block.number, 436);
    assert_eq!(occurrences[1].args["amount"], ArgValue::Uint(700));

    let reqs = transport.requests("eth_getFilterChanges");
    assert_eq!(reqs[0].params[0], "0xf");
}

#[tokio::test]
async fn undecodable_log_is_skipped() {
    let (transport, source) = source();
    let mut broken = refund_log(1, false);
    broken["topics"] = json!([keccak256_signature("Refund(address,uint256,uint256)")]);
    transport.reply("eth_getFilterChanges", Ok(json!([broken, refund_log(2, false)])));

    let handle = FilterHandle::new(EventKind::new("Refund"), "0xf");
    let occurrences = source.poll(&handle).await.unwrap();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].args["amount"], ArgValue::Uint(2));
}

#[tokio::test]
async fn empty_poll_yields_nothing() {
    let (transport, source) = source();
    transport.reply("eth_getFilterChanges", Ok(json!([])));
    let handle = FilterHandle::new(EventKind::new("Refund"), "0xf");
    assert!(source.poll(&handle).await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_filter_is_reported() {
    let (transport, source) = source();
    transport.reply("eth_getFilterChanges", Err((-32000, "filter not found".into())));

    let handle = FilterHandle::new(EventKind::new("Refund"), "0xdead");
    match source.poll(&handle).await {
        Err(RelayError::FilterNotFound { filter_id }) => assert_eq!(filter_id, "0xdead"),
        other => panic!("expected FilterNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_node_is_source_unavailable() {
    let (transport, source) = source();
    *transport.down.lock().unwrap() = true;

    let handle = FilterHandle::new(EventKind::new("Refund"), "0xf");
    let err = source.poll(&handle).await.unwrap_err();
    assert!(matches!(err, RelayError::SourceUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(!source.is_connected().await);
}

#[tokio::test]
async fn connectivity_probe_and_uninstall() {
    let (transport, source) = source();
    transport.reply("net_version", Ok(json!("3")));
    transport.reply("eth_uninstallFilter", Ok(json!(true)));

    assert!(source.is_connected().await);
    let handle = FilterHandle::new(EventKind::new("Refund"), "0xf");
    source.uninstall_filter(&handle).await.unwrap();
    assert_eq!(transport.requests("eth_uninstallFilter")[0].params[0], "0xf");
}
