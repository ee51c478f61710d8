//! Realtime Socket Handler
//!
//! Authenticates the upgrade request (`/ws?token=<jwt>`) and manages the
//! connection lifecycle.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::ConnectionHub;
use super::messages::{ClientMessage, ServerMessage};
use crate::api::{ApiError, AppState};
use crate::auth::AuthError;

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    pub token: Option<String>,
}

/// GET /ws
///
/// Upgrades to a WebSocket once the token query parameter verifies.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SocketParams>,
) -> Response {
    if !state.config.realtime.enabled {
        return ApiError::ServiceUnavailable("Realtime is disabled".to_string()).into_response();
    }

    let user = match params
        .token
        .as_deref()
        .ok_or(AuthError::MissingToken)
        .and_then(|token| state.auth.verify_realtime(token))
    {
        Ok(user) => user,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, user.user_id))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register(&user_id, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, user_id = %user_id, "Failed to register WebSocket connection");
            let error_msg = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Some(msg) = encode(&error_msg) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let connected = ServerMessage::Connected {
        connection_id: connection_id.clone(),
        user_id,
    };
    let sent = match encode(&connected) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !sent {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id).await;
        return;
    }

    let conn_id_for_send = connection_id.clone();

    // Forward hub messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else { continue };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket frame
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(hub: &ConnectionHub, connection_id: &str, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(hub, connection_id, client_msg).await,
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Invalid client message");
                    let error_msg = ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = hub.send_to(connection_id, error_msg).await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let error_msg = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Handle a parsed client message
async fn handle_client_message(hub: &ConnectionHub, connection_id: &str, message: ClientMessage) {
    let response = match message {
        ClientMessage::Subscribe { topics } => hub
            .subscribe(connection_id, topics)
            .await
            .map(|topics| ServerMessage::Subscribed { topics }),
        ClientMessage::Unsubscribe { topics } => hub
            .unsubscribe(connection_id, topics)
            .await
            .map(|topics| ServerMessage::Unsubscribed { topics }),
        ClientMessage::Ping => Ok(ServerMessage::Pong),
    };

    let reply = response.unwrap_or_else(|e| {
        tracing::error!(connection_id = %connection_id, error = %e, "Subscription error");
        ServerMessage::Error {
            message: e.to_string(),
        }
    });
    let _ = hub.send_to(connection_id, reply).await;
}
