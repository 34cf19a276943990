use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::services::profile_service::UserProfile;

// --- Requests ---

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationPayload {
    pub other_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveConversationPayload {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessagePayload {
    pub message_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchQuery {
    #[serde(rename = "query")]
    #[validate(length(min = 1, max = 200))]
    pub query: String,
    #[serde(rename = "type", default)]
    pub search_type: SearchType,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    All,
    Messages,
    Users,
}

// --- Responses ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
    /// Counterpart profile, resolved against the external profile service.
    /// Null when the lookup fails; the listing itself never fails on it.
    pub other_user: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationListItem>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserProfile>>,
}
