//! HTTP surface of the relay.
//!
//! Provides:
//!   GET /ws/socket-server/  → WebSocket; one JSON text frame per relayed event
//!   GET /health             → relay state, metrics, subscriber count
//!   GET /archive?type=Kind  → archived window counts, oldest first

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use chainrelay_core::{Archive, EventKind, RelayMetrics, RelayMonitor, SubscriberChannel, SubscriberHub};

/// Path subscribers connect to.
pub const SOCKET_PATH: &str = "/ws/socket-server/";

/// Shared state for the routes.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SubscriberHub>,
    pub monitor: RelayMonitor,
    pub archive: Arc<dyn Archive>,
    /// Fired on shutdown; open sockets are closed.
    pub shutdown: CancellationToken,
}

/// Build the Axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(ws_handler))
        .route("/health", get(health))
        .route("/archive", get(archive_records))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state.hub, state.shutdown))
}

/// Pump relayed messages into one socket until either side goes away.
async fn serve_subscriber(socket: WebSocket, hub: Arc<SubscriberHub>, shutdown: CancellationToken) {
    let (id, mut rx) = hub.register();
    info!(subscriber = %id, total = hub.subscriber_count(), "subscriber connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outgoing = rx.recv() => {
                let Some(message) = outgoing else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(subscriber = %id, error = %e, "cannot serialise relay message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(subscriber = %id, error = %e, "send failed");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Subscribers only listen.
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(&id);
    info!(subscriber = %id, total = hub.subscriber_count(), "subscriber disconnected");
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub state: String,
    pub subscribers: usize,
    pub metrics: RelayMetrics,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        state: state.monitor.state().to_string(),
        subscribers: state.hub.subscriber_count(),
        metrics: state.monitor.metrics(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

async fn archive_records(State(state): State<AppState>, Query(query): Query<ArchiveQuery>) -> impl IntoResponse {
    let kind = query.kind.map(EventKind::new);
    match state.archive.records(kind.as_ref()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "archive read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
