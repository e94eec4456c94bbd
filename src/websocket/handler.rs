//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::hub::{ConnectionHub, ConnectionId};
use super::messages::{ClientCommand, ServerFrame};
use crate::api::AppState;

/// How long a closing connection may take to flush its queued frames
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
///
/// This is the entry point for WebSocket connections.
/// It upgrades the HTTP connection to WebSocket and starts message handling.
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(peer = ?peer, error = %rejection, "WebSocket handshake rejected");
            return rejection.into_response();
        }
    };

    let hub = Arc::clone(&state.hub);
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(peer = ?peer, error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| handle_socket(socket, hub, peer))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>, peer: Option<SocketAddr>) {
    let (mut sender, mut receiver) = socket.split();

    // Single writer per connection: acks and broadcasts share this queue
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection_id = match hub.register(tx.clone(), peer).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(peer = ?peer, error = %e, "Refusing WebSocket connection");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Task to forward queued frames to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sender.send(frame.into_message()).await {
                // A failed sink does not recover; treat the channel as closed
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket write failed"
                );
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let hub_for_recv = Arc::clone(&hub);

    // Task to receive frames from the WebSocket and handle them in order
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, connection_id, &tx, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {}
        _ = hub.closing() => {
            tracing::debug!(connection_id = %connection_id, "Closing connection for shutdown");
            recv_task.abort();
            let _ = recv_task.await;
        }
    }

    // Cleanup: drop the hub's sender so the writer drains and closes
    hub.unregister(connection_id).await;

    if !send_task.is_finished()
        && tokio::time::timeout(CLOSE_TIMEOUT, &mut send_task)
            .await
            .is_err()
    {
        tracing::debug!(connection_id = %connection_id, "Writer did not finish, aborting");
        send_task.abort();
    }
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(
    hub: &ConnectionHub,
    connection_id: ConnectionId,
    ack: &mpsc::UnboundedSender<ServerFrame>,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            handle_command(hub, connection_id, &text).await;
            queue_ack(connection_id, ack, ServerFrame::Acknowledged(text));
            true
        }
        Message::Binary(bytes) => {
            // Only UTF-8 payloads can name a topic
            if let Ok(text) = std::str::from_utf8(&bytes) {
                handle_command(hub, connection_id, text).await;
            }
            queue_ack(connection_id, ack, ServerFrame::AcknowledgedBinary(bytes));
            true
        }
        Message::Ping(_) => {
            // Axum handles ping/pong automatically
            true
        }
        Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Apply the side effect of one inbound frame, if any
async fn handle_command(hub: &ConnectionHub, connection_id: ConnectionId, frame: &str) {
    tracing::debug!(connection_id = %connection_id, frame = %frame, "Received frame");

    if let ClientCommand::Subscribe(topic) = ClientCommand::parse(frame) {
        hub.subscribe(connection_id, topic).await;
    }
}

fn queue_ack(
    connection_id: ConnectionId,
    ack: &mpsc::UnboundedSender<ServerFrame>,
    frame: ServerFrame,
) {
    if ack.send(frame).is_err() {
        tracing::debug!(
            connection_id = %connection_id,
            "Acknowledgement dropped, writer closed"
        );
    }
}
