//! User-data stream reader.
//!
//! One long-lived task per active account: obtains a listen key over signed
//! REST, opens the WebSocket, forwards parsed frames into the tracker's
//! channel and refreshes the listen key every 30 minutes. Reconnection is
//! deliberately left to process restart.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use crate::domain::entities::stream::StreamEvent;

use super::types::parse_stream_event;
use super::{BinanceClient, BinanceError};

const KEEPALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30 * 60);

/// Spawn the reader task for one account.
pub fn spawn(
    client: Arc<BinanceClient>,
    account_id: i64,
    tx: mpsc::Sender<StreamEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run(client, account_id, tx).await {
            error!(account_id, "user data stream terminated: {e}");
        }
    })
}

async fn run(
    client: Arc<BinanceClient>,
    account_id: i64,
    tx: mpsc::Sender<StreamEvent>,
) -> Result<(), BinanceError> {
    let listen_key = client.start_user_stream().await?;
    let url = format!("{}/ws/{}", client.ws_base_url(), listen_key);

    let (ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| BinanceError::WebSocket(e.to_string()))?;
    info!(account_id, "connected to user data stream");

    let (mut write, mut read) = ws.split();
    let keepalive = spawn_keepalive(client.clone(), account_id, listen_key);

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Unparseable frames are heartbeats or unknown event kinds.
                if let Some(event) = parse_stream_event(text.as_str()) {
                    if tx.send(event).await.is_err() {
                        debug!(account_id, "stream consumer gone, closing reader");
                        break;
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                if let Err(e) = write.send(Message::Pong(payload)).await {
                    warn!(account_id, "failed to answer ping: {e}");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(account_id, "user data stream closed by exchange");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(account_id, "websocket read error: {e}");
                break;
            }
        }
    }

    keepalive.abort();
    Ok(())
}

fn spawn_keepalive(
    client: Arc<BinanceClient>,
    account_id: i64,
    listen_key: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            match client.keepalive_user_stream(&listen_key).await {
                Ok(()) => debug!(account_id, "listen key refreshed"),
                Err(e) => {
                    error!(account_id, "listen key refresh failed: {e}");
                    return;
                }
            }
        }
    })
}
