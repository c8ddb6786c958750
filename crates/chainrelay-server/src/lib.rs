//! chainrelay-server — WebSocket relay server for ChainRelay.
//!
//! A single relay loop polls the contract and fans events out to every
//! WebSocket subscriber through a shared `SubscriberHub`; window counts go to
//! a SQLite archive.

pub mod app;
pub mod config;
pub mod error;
pub mod tracing_setup;
pub mod ws;

pub use app::{run, serve};
pub use config::{ConfigError, ServerConfig};
pub use error::ServerError;
pub use tracing_setup::{init_tracing, LogConfig};
pub use ws::{build_router, AppState, SOCKET_PATH};
