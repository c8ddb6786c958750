//! chainrelay-evm — EVM JSON-RPC event source for ChainRelay.
//!
//! Installs one log filter per tracked event kind on a single contract, polls
//! the filters, and decodes each log against the contract ABI into an
//! `EventOccurrence` whose arguments keep ABI order.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use chainrelay_evm::{ContractAbi, EvmEventSource, HttpTransport};
//! use std::time::Duration;
//!
//! let abi = ContractAbi::from_file("config/crowdfunding.abi.json").unwrap();
//! let transport = HttpTransport::new("http://localhost:8545", Duration::from_secs(30)).unwrap();
//! let source = EvmEventSource::new(transport, "0x86D219D65452b013912B2af7b2E65E903fa3777d", abi);
//! ```

pub mod abi;
pub mod log;
pub mod rpc;
pub mod source;

pub use abi::{keccak256_signature, AbiError, ContractAbi, EventSpec};
pub use log::RawLog;
pub use rpc::{HttpTransport, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcTransport, TransportError};
pub use source::EvmEventSource;
