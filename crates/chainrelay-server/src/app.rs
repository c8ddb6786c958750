//! Process wiring: one relay loop, one HTTP server, one shutdown token.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chainrelay_core::{RelayBuilder, RelayLoop, SubscriberHub};
use chainrelay_evm::{ContractAbi, EvmEventSource, HttpTransport};
use chainrelay_storage::SqliteArchive;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ws::{build_router, AppState};

/// Build every component from `config`, then serve until `cancel` fires.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> Result<(), ServerError> {
    config.validate()?;

    let abi = ContractAbi::from_file(&config.contract.abi_path)?;
    for kind in &config.relay.tracked_event_kinds {
        abi.topic0(kind)?;
    }

    let transport = HttpTransport::new(config.rpc.url.clone(), config.rpc.request_timeout())?;
    let source = EvmEventSource::new(transport, config.contract.address.clone(), abi);
    if !source.is_connected().await {
        warn!(url = %config.rpc.url, "node unreachable at startup, polls will keep retrying");
    }

    let archive = Arc::new(SqliteArchive::open(&config.archive.path).await?);
    let hub = Arc::new(SubscriberHub::new(config.relay.subscriber_queue_capacity));

    let relay = RelayBuilder::new()
        .config(config.relay.clone())
        .source(Arc::new(source))
        .archive(archive.clone())
        .channel(hub.clone())
        .build()?;

    let state = AppState {
        hub,
        monitor: relay.monitor(),
        archive,
        shutdown: cancel.clone(),
    };

    let listener = TcpListener::bind(&config.listen_addr).await?;
    serve(listener, state, relay, cancel).await
}

/// Run `relay` and the HTTP server on `listener` until `cancel` fires.
///
/// The relay's final flush completes before this returns.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut relay: RelayLoop,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let relay_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { relay.run(cancel).await })
    };

    info!(addr = %listener.local_addr()?, "relay server listening");
    let shutdown = cancel.clone();
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    // The server may also stop on its own (accept error).
    cancel.cancel();
    relay_task
        .await
        .map_err(|e| ServerError::Task(e.to_string()))?;
    served?;

    info!("relay server stopped");
    Ok(())
}
