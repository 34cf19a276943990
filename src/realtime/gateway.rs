use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::middleware::auth::{bearer_token, claims_user_id, decode_token};
use crate::services::message_service::MessageContent;
use crate::AppState;

use super::events::{room_name, ClientEvent, ServerEvent};

const OUTBOUND_QUEUE: usize = 64;
const HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    pub token: Option<String>,
}

/// Connection handshake. The credential is validated exactly once, before
/// the upgrade; the decoded identity is bound to the connection for its
/// lifetime. Browsers cannot set headers on WebSocket requests, so the
/// token is also accepted as a query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsAuthParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(params.token)
        .ok_or_else(|| Error::Unauthorized("missing_credential".to_string()))?;
    let claims = decode_token(&token)?;
    let user_id = claims_user_id(&claims)?;

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user_id)))
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE);

    // Single writer: acks and room events both go through the outbound
    // queue, so the caller's ack is enqueued before its own echo.
    let writer = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!(error = ?e, "failed to serialize realtime event");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(payload)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Room subscriptions held by this connection. Each identity may hold
    // several connections; every connection subscribes independently.
    let mut subscriptions: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&state, user_id, &text, &tx, &mut subscriptions).await;
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    for (_, handle) in subscriptions.drain() {
        handle.abort();
    }
    drop(tx);
    let _ = writer.await;
}

/// Parse one text frame and dispatch it; an unparseable payload yields a
/// frame-level `Error` event instead of dropping the connection.
pub async fn handle_frame(
    state: &AppState,
    user_id: Uuid,
    text: &str,
    tx: &mpsc::Sender<ServerEvent>,
    subscriptions: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handle_event(state, user_id, event, tx, subscriptions).await,
        Err(e) => {
            let _ = tx
                .send(ServerEvent::Error {
                    error: format!("malformed event: {}", e),
                })
                .await;
        }
    }
}

/// Dispatch one decoded client event for an authenticated connection.
/// Acknowledgements go through `tx`, the connection's outbound queue, so
/// they are enqueued ahead of any room echo the event triggers.
pub async fn handle_event(
    state: &AppState,
    user_id: Uuid,
    event: ClientEvent,
    tx: &mpsc::Sender<ServerEvent>,
    subscriptions: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            let ack = match join_room(state, user_id, conversation_id, tx, subscriptions).await {
                Ok(unread_count) => ServerEvent::JoinAck {
                    success: true,
                    room_name: Some(room_name(conversation_id)),
                    unread_count: Some(unread_count),
                    error: None,
                },
                Err(e) => ServerEvent::JoinAck {
                    success: false,
                    room_name: None,
                    unread_count: None,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(ack).await;
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            // No ack; unsubscribing twice is a no-op.
            if let Some(handle) = subscriptions.remove(&conversation_id) {
                handle.abort();
            }
        }
        ClientEvent::SendMessage {
            conversation_id,
            text,
            media_url,
            media_type,
        } => {
            let content = MessageContent {
                text,
                media_url,
                media_type,
            };
            match send_message(state, user_id, conversation_id, content).await {
                Ok(message) => {
                    let _ = tx
                        .send(ServerEvent::MessageAck {
                            success: true,
                            message: Some(message.clone()),
                            error: None,
                        })
                        .await;
                    state
                        .rooms
                        .publish(conversation_id, ServerEvent::MessageReceived { message })
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(ServerEvent::MessageAck {
                            success: false,
                            message: None,
                            error: Some(e.to_string()),
                        })
                        .await;
                }
            }
        }
        ClientEvent::MarkAsRead { conversation_id } => {
            match mark_as_read(state, user_id, conversation_id).await {
                Ok((updated_count, read_at)) => {
                    let _ = tx
                        .send(ServerEvent::ReadAck {
                            success: true,
                            updated_count: Some(updated_count),
                            error: None,
                        })
                        .await;
                    state
                        .rooms
                        .publish(
                            conversation_id,
                            ServerEvent::MessagesRead {
                                conversation_id,
                                read_by: user_id,
                                read_at,
                            },
                        )
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(ServerEvent::ReadAck {
                            success: false,
                            updated_count: None,
                            error: Some(e.to_string()),
                        })
                        .await;
                }
            }
        }
    }
}

async fn join_room(
    state: &AppState,
    user_id: Uuid,
    conversation_id: Uuid,
    tx: &mpsc::Sender<ServerEvent>,
    subscriptions: &mut HashMap<Uuid, JoinHandle<()>>,
) -> Result<i64> {
    state
        .conversation_service
        .get_for_participant(conversation_id, user_id)
        .await?;

    // Resolve the unread snapshot before subscribing: a failed join must
    // leave the connection outside the room, so every fallible step runs
    // ahead of the subscription insert.
    let unread_count = state
        .message_service
        .unread_count(conversation_id, user_id)
        .await?;

    if !subscriptions.contains_key(&conversation_id) {
        let mut receiver = state.rooms.subscribe(conversation_id).await;
        let forward = tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if forward.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, %conversation_id, "room subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        subscriptions.insert(conversation_id, handle);
    }

    Ok(unread_count)
}

/// Send protocol: validate, authorize, persist, then best-effort cache
/// refresh. A store failure at persist aborts before any broadcast; a
/// failed cache refresh is logged and the send still succeeds, since the
/// message log is the source of truth.
async fn send_message(
    state: &AppState,
    sender_id: Uuid,
    conversation_id: Uuid,
    content: MessageContent,
) -> Result<crate::models::message::Message> {
    if content.is_empty() {
        return Err(Error::BadRequest(
            "Message must contain text or media".to_string(),
        ));
    }

    state
        .conversation_service
        .get_for_participant(conversation_id, sender_id)
        .await?;

    let message = state
        .message_service
        .create(conversation_id, sender_id, content)
        .await?;

    if let Err(e) = state.conversation_service.refresh_last_message(&message).await {
        tracing::warn!(
            error = ?e,
            conversation_id = %conversation_id,
            "failed to refresh last-message cache"
        );
    }

    Ok(message)
}

async fn mark_as_read(
    state: &AppState,
    reader_id: Uuid,
    conversation_id: Uuid,
) -> Result<(u64, chrono::DateTime<chrono::Utc>)> {
    state
        .conversation_service
        .get_for_participant(conversation_id, reader_id)
        .await?;

    state
        .message_service
        .mark_as_read(conversation_id, reader_id)
        .await
}
