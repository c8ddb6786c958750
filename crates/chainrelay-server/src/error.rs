//! Server-level error type.

use thiserror::Error;

use chainrelay_core::RelayError;
use chainrelay_evm::{AbiError, TransportError};

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("contract ABI: {0}")]
    Abi(#[from] AbiError),

    #[error("RPC transport: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("relay task failed: {0}")]
    Task(String),
}
