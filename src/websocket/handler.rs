use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::models::{ClientMessage, RelayError, ServerMessage};
use crate::relay::hub::WorkspaceHub;
use crate::relay::session::{Outbound, OutboundReceiver, Session, CLOSE_NO_ACCESS};
use crate::services::auth_service::{self, AuthedUser};
use crate::websocket::{
    msg_activity_handler::handle_activity_message, msg_cursor_handler::handle_cursor_message,
    msg_document_handler::handle_document_message, msg_ping_handler::handle_ping_message,
    msg_sync_handler::handle_sync_message, msg_typing_handler::handle_typing_message,
};
use crate::AppState;

/// WebSocket handler for a workspace-scoped connection
pub async fn workspace_ws_handler(
    Path(workspace_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt for workspace {}", workspace_id);

    // The token travels as a query parameter on the upgrade request.
    // Authorization happens before the session ever touches the registry.
    let token = params.get("token").cloned().unwrap_or_default();
    match auth_service::authorize_workspace(&token, &workspace_id).await {
        Ok(user) => ws.on_upgrade(move |socket| {
            handle_workspace_socket(socket, workspace_id, user, app_state)
        }),
        Err(err) => {
            warn!("Rejecting connection to workspace {}: {}", workspace_id, err);
            let code = err.close_code();
            let reason = rejection_reason(&err);
            ws.on_upgrade(move |socket| reject_socket(socket, code, reason))
        }
    }
}

/// WebSocket handler for a user-scoped notification connection
pub async fn user_ws_handler(
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New notification socket attempt for user {}", user_id);

    let token = params.get("token").cloned().unwrap_or_default();
    match auth_service::authenticate_token(&token).await {
        Ok(user) if user.user_id == user_id => {
            ws.on_upgrade(move |socket| handle_user_socket(socket, user, app_state))
        }
        Ok(user) => {
            warn!(
                "User {} attempted to open notification socket for user {}",
                user.user_id, user_id
            );
            ws.on_upgrade(move |socket| {
                reject_socket(socket, CLOSE_NO_ACCESS, "token does not match user")
            })
        }
        Err(err) => {
            warn!("Rejecting notification socket for user {}: {}", user_id, err);
            let code = err.close_code();
            let reason = rejection_reason(&err);
            ws.on_upgrade(move |socket| reject_socket(socket, code, reason))
        }
    }
}

fn rejection_reason(err: &RelayError) -> &'static str {
    match err {
        RelayError::Auth(_) => "invalid or expired token",
        RelayError::Forbidden { .. } => "workspace access denied",
        _ => "connection rejected",
    }
}

/// Send a close frame with a distinguishing code and nothing else
async fn reject_socket(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
        .await;
}

/// Handle an admitted workspace connection
async fn handle_workspace_socket(
    socket: WebSocket,
    workspace_id: String,
    user: AuthedUser,
    app_state: Arc<AppState>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let hub = app_state.registry.hub(&workspace_id).await;
    let admission = hub.connect(&user.user_id, &user.username, tx).await;
    let session = admission.session.clone();

    info!(
        "WebSocket connection established for user {} in workspace {} (session {})",
        user.user_id, workspace_id, session.session_id
    );

    // Writer task: drains the session's outbound channel into the socket.
    // Everything this connection ever sends goes through here, so a slow
    // socket only ever delays itself.
    let mut write_task = tokio::spawn(async move {
        let mut rx: OutboundReceiver = rx;
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize outbound message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
            }
        }
    });

    // Greet the new session: identity, the current roster, then anything
    // queued while the user was briefly away (original arrival order)
    session.send(ServerMessage::ConnectionEstablished {
        user_id: session.user_id.clone(),
        workspace_id: workspace_id.clone(),
        cursor_color: session.cursor_color.clone(),
    });
    session.send(ServerMessage::WorkspaceUsers(admission.roster));
    for queued in admission.queued {
        session.send(queued);
    }

    // Reader task: parse and dispatch inbound messages
    let reader_hub = hub.clone();
    let reader_session = session.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            match message {
                Message::Text(text) => {
                    dispatch_client_message(&text, &reader_hub, &reader_session).await;
                }
                Message::Close(_) => break,
                // Transport-level ping/pong is handled by axum itself
                _ => continue,
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut write_task) => read_task.abort(),
        _ = (&mut read_task) => write_task.abort(),
    };

    hub.disconnect(&session.user_id, session.session_id).await;
    info!(
        "WebSocket connection terminated for user {} in workspace {}",
        session.user_id, workspace_id
    );
}

/// Handle a user-scoped notification connection. Only heartbeats come in;
/// cross-workspace notifications go out.
async fn handle_user_socket(socket: WebSocket, user: AuthedUser, app_state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    app_state.user_channels.register(&user.user_id, tx.clone()).await;
    info!("Notification socket established for user {}", user.user_id);

    let mut write_task = tokio::spawn(async move {
        let mut rx: OutboundReceiver = rx;
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize notification: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
            }
        }
    });

    let reader_tx = tx.clone();
    let reader_user_id = user.user_id.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping { timestamp }) => {
                        let _ = reader_tx.send(Outbound::Message(ServerMessage::Pong { timestamp }));
                    }
                    Ok(other) => {
                        debug!(
                            "Ignoring {:?} on notification socket for user {}",
                            other, reader_user_id
                        );
                    }
                    Err(e) => {
                        warn!(
                            "Dropping malformed message on notification socket for user {}: {}",
                            reader_user_id, e
                        );
                    }
                },
                Message::Close(_) => break,
                _ => continue,
            }
        }
    });

    tokio::select! {
        _ = (&mut write_task) => read_task.abort(),
        _ = (&mut read_task) => write_task.abort(),
    };

    app_state.user_channels.unregister(&user.user_id, &tx).await;
    info!("Notification socket terminated for user {}", user.user_id);
}

/// Decode one inbound envelope and route it to its handler. A malformed
/// message is dropped and logged; the connection stays up.
async fn dispatch_client_message(text: &str, hub: &Arc<WorkspaceHub>, session: &Session) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Dropping message from user {} in workspace {}: {}",
                session.user_id,
                session.workspace_id,
                RelayError::Protocol(e.to_string())
            );
            return;
        }
    };

    // Any decodable inbound traffic counts as liveness
    hub.touch(&session.user_id).await;

    match message {
        ClientMessage::CursorUpdate { position, selection, file_path } => {
            handle_cursor_message(hub, session, position, selection, file_path).await;
        }
        ClientMessage::DocumentUpdate { document_id, operation, base_version } => {
            handle_document_message(hub, session, document_id, base_version, operation).await;
        }
        ClientMessage::ActivityUpdate { activity, details } => {
            handle_activity_message(hub, session, activity, details).await;
        }
        ClientMessage::TypingIndicator { is_typing, location } => {
            handle_typing_message(hub, session, is_typing, location).await;
        }
        ClientMessage::Ping { timestamp } => {
            handle_ping_message(session, timestamp).await;
        }
        ClientMessage::RequestSync {} => {
            handle_sync_message(hub, session).await;
        }
    }
}
