// =============================================================================
// WebSocket Handler — Push-based state updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate StateSnapshot on connect.
//   2. A fresh snapshot on the next 500 ms tick whenever the state version
//      (settings + pipeline) has moved since the last push.
//
// Ping frames are answered with Pong.  Text frames are treated as refresh
// requests and answered with a snapshot.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::app_state::{AppState, StateSnapshot};

/// Poll period for version changes.
const PUSH_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Wire envelope
// =============================================================================

#[derive(Serialize)]
struct WsEnvelope {
    seq: u64,
    #[serde(flatten)]
    snapshot: StateSnapshot,
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted; upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two concurrent branches via `tokio::select!`:
///   1. **Push**: every 500 ms, send a new snapshot if the version changed.
///   2. **Recv**: Ping/Pong, Close and refresh requests from the client.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut last_sent_version = state.current_state_version();
    if let Err(e) = send_snapshot(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }

    let mut push_interval = interval(PUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    if let Err(e) = send_snapshot(&mut sender, &state).await {
                        debug!(error = %e, "WebSocket send failed; disconnecting");
                        break;
                    }
                    last_sent_version = current_version;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "WebSocket snapshot requested");
                        if let Err(e) = send_snapshot(&mut sender, &state).await {
                            debug!(error = %e, "WebSocket send failed; disconnecting");
                            break;
                        }
                        last_sent_version = state.current_state_version();
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong; disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error; disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

/// Serialize and send the current StateSnapshot.
async fn send_snapshot<S>(sender: &mut S, state: &AppState) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let envelope = WsEnvelope {
        seq: state.next_ws_sequence(),
        snapshot: state.build_snapshot(),
    };

    match serde_json::to_string(&envelope) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(
                version = envelope.snapshot.state_version,
                seq = envelope.seq,
                "WebSocket snapshot sent"
            );
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; keep the socket.
            warn!(error = %e, "failed to serialize snapshot");
            Ok(())
        }
    }
}
