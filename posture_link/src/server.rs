// THEORY:
// The device-side HTTP surface. One WebSocket route carries both directions of the
// remote collaborator's traffic: every posture update goes out to each client as a
// JSON text frame, and every text frame a client sends is read as an inbound
// configuration/identity message. Two small REST routes serve the latest snapshot
// and the calibration trigger; `/healthz` is for supervisors.
//
// Slow clients never hold anything up: the update fan-out is a broadcast channel,
// and a client that falls behind skips ahead instead of blocking the publisher.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use posture_vision::Shutdown;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::{ControlHandle, LinkBus, ServerConfig};

#[derive(Clone)]
struct AppState {
    bus: LinkBus,
    control: ControlHandle,
}

pub fn router(bus: LinkBus, control: ControlHandle) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/ws", get(ws_handler))
        .route("/latest", get(latest))
        .route("/control/calibrate", post(calibrate))
        .with_state(AppState { bus, control })
}

/// Binds the listener and serves until `shutdown` fires.
pub async fn start_server(
    bus: LinkBus,
    cfg: ServerConfig,
    control: ControlHandle,
    shutdown: Shutdown,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .map_err(|source| LinkError::Bind {
            addr: cfg.bind_addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;
    info!("posture link listening on http://{local_addr}");

    let app = router(bus, control);
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;
        if let Err(err) = result {
            warn!("server stopped with error: {err}");
        }
        debug!("server exited");
    });
    Ok(server)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_conn(socket, state.bus))
}

async fn ws_conn(socket: WebSocket, bus: LinkBus) {
    let mut updates = bus.updates_tx.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();
    info!("websocket client connected");

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket client lagging, skipping updates");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = bus.submit_inbound(&text) {
                        warn!("ignoring inbound message: {err}");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!("websocket receive failed: {err}");
                    break;
                }
            },
        }
    }
    info!("websocket client disconnected");
}

async fn latest(State(state): State<AppState>) -> Response {
    match state.control.context.latest_update() {
        Some(update) => Json(update).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn calibrate(State(state): State<AppState>) -> StatusCode {
    match state.control.request_calibration() {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
