use axum::{
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::chat_dto::{
    ArchiveConversationPayload, ConversationListItem, ConversationListResponse,
    ConversationResponse, CreateConversationPayload, DeleteMessagePayload,
    ListConversationsQuery, MarkAsReadPayload, MessageListResponse, MessagesQuery, SearchQuery,
    SearchResponse, SearchType,
};
use crate::error::Result;
use crate::middleware::auth::{claims_user_id, Claims};
use crate::models::conversation::STATUS_ACTIVE;
use crate::realtime::events::ServerEvent;
use crate::utils::pagination::page_window;
use crate::AppState;

/// List the caller's conversations, newest activity first, with live unread
/// counts and the counterpart's profile resolved per row.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    let status = query.status.as_deref().unwrap_or(STATUS_ACTIVE);
    let (limit, offset) = page_window(query.page, query.limit);

    let (rows, total) = state
        .conversation_service
        .list(user_id, status, limit, offset)
        .await?;

    let mut conversations = Vec::with_capacity(rows.len());
    for row in rows {
        let other_user = match row.conversation.other_participant(user_id) {
            Some(other_id) => match state.profile_service.get_profile(other_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(error = ?e, user_id = %other_id, "profile lookup failed");
                    None
                }
            },
            None => None,
        };
        conversations.push(ConversationListItem {
            conversation: row.conversation,
            unread_count: row.unread_count,
            other_user,
        });
    }

    Ok(Json(ConversationListResponse {
        conversations,
        total,
    }))
}

/// Get-or-create the conversation with another user (idempotent; both
/// participants resolve to the same record regardless of who calls first).
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    let conversation = state
        .conversation_service
        .get_or_create(user_id, payload.other_user_id)
        .await?;

    Ok(Json(ConversationResponse { conversation }))
}

/// Paginated message history, chronological within each page. Participants
/// only; archived conversations stay readable.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    state
        .conversation_service
        .get_for_participant(conversation_id, user_id)
        .await?;

    let (limit, offset) = page_window(query.page, query.limit);
    let (messages, total) = state
        .message_service
        .list(conversation_id, limit, offset)
        .await?;

    Ok(Json(MessageListResponse { messages, total }))
}

/// Batch-flip the counterpart's unread messages, then notify the room so
/// connected clients reconcile their tick-marks without a refetch.
pub async fn mark_as_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<MarkAsReadPayload>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    state
        .conversation_service
        .get_for_participant(payload.conversation_id, user_id)
        .await?;

    let (_updated, read_at) = state
        .message_service
        .mark_as_read(payload.conversation_id, user_id)
        .await?;

    state
        .rooms
        .publish(
            payload.conversation_id,
            ServerEvent::MessagesRead {
                conversation_id: payload.conversation_id,
                read_by: user_id,
                read_at,
            },
        )
        .await;

    Ok(Json(json!({ "message": "messages marked as read" })))
}

/// Archive, never hard-delete. Either participant may archive.
pub async fn archive_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ArchiveConversationPayload>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    state
        .conversation_service
        .get_for_participant(payload.conversation_id, user_id)
        .await?;

    state
        .conversation_service
        .archive(payload.conversation_id)
        .await?;

    Ok(Json(json!({ "message": "conversation archived" })))
}

/// Soft-delete a message. Sender only.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<DeleteMessagePayload>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    state
        .message_service
        .soft_delete(payload.message_id, user_id)
        .await?;

    Ok(Json(json!({ "message": "message deleted" })))
}

/// Search message bodies (scoped to the caller's conversations) and/or
/// user profiles (delegated to the external profile service).
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let user_id = claims_user_id(&claims)?;
    crate::utils::validation::validate(&query)?;
    let trimmed = query.query.trim();
    if trimmed.is_empty() {
        return Err(crate::error::Error::BadRequest(
            "query must not be empty".to_string(),
        ));
    }
    let limit = i64::from(query.limit.unwrap_or(20).min(100));

    let messages = match query.search_type {
        SearchType::All | SearchType::Messages => {
            Some(state.message_service.search(user_id, trimmed, limit).await?)
        }
        SearchType::Users => None,
    };
    // For a combined search the users leg is supplementary: a profile
    // service outage degrades it to absent rather than failing the message
    // results. A users-only search still surfaces the failure.
    let users = match query.search_type {
        SearchType::All => match state.profile_service.search_users(trimmed, limit as u32).await
        {
            Ok(users) => Some(users),
            Err(e) => {
                tracing::warn!(error = ?e, "user search failed");
                None
            }
        },
        SearchType::Users => Some(
            state
                .profile_service
                .search_users(trimmed, limit as u32)
                .await?,
        ),
        SearchType::Messages => None,
    };

    Ok(Json(SearchResponse { messages, users }))
}
