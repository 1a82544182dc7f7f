//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::ClientId,
    ui::state::AppState,
    usecase::{ConnectError, ConnectRequest, Connection, ConnectionToken, DispatchError},
};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Identifier from a previous session, if any
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Create a channel for this client to receive messages
    let (tx, rx) = mpsc::unbounded_channel();

    let request = ConnectRequest {
        endpoint: state.endpoint,
        uuid: query.uuid,
        username: query.username,
    };

    // The confirmation frames are queued into `tx` before the upgrade completes.
    // A live connection with the same ID is replaced and its socket is closed.
    let connection = match state.connect_participant_usecase.execute(request, tx).await {
        Ok(connection) => connection,
        Err(e @ (ConnectError::UsernameRequired(_) | ConnectError::InvalidValue(_))) => {
            tracing::warn!("Rejecting connection: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
        Err(ConnectError::Repository(e)) => {
            tracing::error!("Failed to connect participant: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let Connection { client, token } = connection;
    let failed_state = state.clone();
    let failed_id = client.id.clone();
    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!("WebSocket upgrade for '{}' failed: {}", failed_id, e);
            tokio::spawn(async move {
                failed_state
                    .disconnect_participant_usecase
                    .execute(&failed_id, token)
                    .await;
            });
        })
        .on_upgrade(move |socket| handle_socket(socket, state, client.id, token, rx)))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// When every sender of the channel is dropped (the client was removed from
/// the registry), the queued messages are flushed and a close frame is sent.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    client_id: ClientId,
    token: ConnectionToken,
    rx: mpsc::UnboundedReceiver<String>,
) {
    let (sender, mut receiver) = socket.split();

    let mut send_task = pusher_loop(rx, sender);

    let recv_state = state.clone();
    let recv_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error from '{}': {}", recv_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received from '{}': {}", recv_id, text.as_str());
                    match recv_state.router.dispatch(&recv_id, text.as_str()).await {
                        Ok(_) => {}
                        Err(
                            e @ (DispatchError::Unauthorized { .. }
                            | DispatchError::Malformed(_)),
                        ) => {
                            tracing::warn!("Dropped frame from '{}': {}", recv_id, e);
                        }
                        Err(e) => {
                            tracing::error!("Failed to handle frame from '{}': {}", recv_id, e);
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", recv_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // A replaced connection leaves the new entry in place
    state
        .disconnect_participant_usecase
        .execute(&client_id, token)
        .await;
}
