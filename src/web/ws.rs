//! Dashboard WebSocket fan-out.
//!
//! On connect the client receives an `initial` frame with stats and open
//! positions, then `{type, data}` frames for every bus event. Lagging
//! clients skip events instead of slowing the publishers.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::handlers::AppState;

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    debug!("dashboard websocket client connected");

    let stats = state.repo.trading_stats().await.unwrap_or_default();
    let positions = state.repo.open_positions().await.unwrap_or_default();
    let initial = serde_json::json!({
        "type": "initial",
        "stats": stats,
        "positions": positions,
    });
    if socket
        .send(Message::Text(initial.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut events = state.bus.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(frame) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // client frames (pings, chatter) are ignored
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    debug!("dashboard websocket client disconnected");
}
