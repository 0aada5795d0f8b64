//! WebSocket transport: every socket on `/ws` is one connection, every text
//! or binary frame one inbound chunk.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{sink::SinkExt, stream::StreamExt};
use session_mux::{Connection, ConnectionId};
use std::sync::atomic::Ordering;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::AppState;

/// Core-side handle for one socket; closing it ends the socket's read loop
struct WsConnection {
    id: ConnectionId,
    close_tx: Option<oneshot::Sender<()>>,
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = ConnectionId(state.next_connection_id.fetch_add(1, Ordering::SeqCst));
    let (close_tx, mut close_rx) = oneshot::channel();
    let connection = WsConnection {
        id,
        close_tx: Some(close_tx),
    };

    state.metrics.connection_opened();

    let session_id = match state.mux.on_accept(Box::new(connection)) {
        Ok(session_id) => session_id,
        Err(e) => {
            warn!("Connection {} refused: {}", id, e);
            state.metrics.connection_closed();
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Fires when the session closes us, or drops us on teardown
            _ = &mut close_rx => {
                info!(session = %session_id, "Closing connection {}", id);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let payload = Bytes::from(text);
                    state.metrics.chunk_received(payload.len());
                    state.mux.on_inbound_data(session_id, payload);
                }
                Some(Ok(Message::Binary(data))) => {
                    state.metrics.chunk_received(data.len());
                    state.mux.on_inbound_data(session_id, data);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session = %session_id, "Connection {} ended by peer", id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %session_id, "Connection {} errored: {}", id, e);
                    break;
                }
            },
        }
    }

    state.mux.on_connection_closed(session_id);
    state.metrics.connection_closed();
}
