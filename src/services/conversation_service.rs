use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::conversation::{pair_key, Conversation, STATUS_ACTIVE, STATUS_ARCHIVED};
use crate::models::message::Message;

#[derive(Debug, FromRow)]
pub struct ConversationWithUnread {
    #[sqlx(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
}

#[derive(Clone)]
pub struct ConversationService {
    pool: PgPool,
}

impl ConversationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent get-or-create for a participant pair. Two callers racing on
    /// the same pair both land on the single row guarded by the unique
    /// `pair_key` index: the loser's insert hits the conflict, returns no row,
    /// and we re-fetch the winner's record.
    pub async fn get_or_create(&self, user_a: Uuid, user_b: Uuid) -> Result<Conversation> {
        if user_a == user_b {
            return Err(Error::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }
        let key = pair_key(user_a, user_b);

        let inserted = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (participant_a, participant_b, pair_key, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pair_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(&key)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conversation) = inserted {
            return Ok(conversation);
        }

        let existing = sqlx::query_as::<_, Conversation>(
            r#"SELECT * FROM conversations WHERE pair_key = $1"#,
        )
        .bind(&key)
        .fetch_one(&self.pool)
        .await?;

        Ok(existing)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"SELECT * FROM conversations WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Fetch a conversation and check the caller belongs to it. NotFound for
    /// unknown ids, Forbidden for authenticated non-participants.
    pub async fn get_for_participant(&self, id: Uuid, user_id: Uuid) -> Result<Conversation> {
        let conversation = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
        if !conversation.is_participant(user_id) {
            return Err(Error::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// Conversations the user participates in, newest activity first, with a
    /// live unread count per row. The count is deliberately computed fresh so
    /// it reflects a send made an instant earlier.
    pub async fn list(
        &self,
        user_id: Uuid,
        status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationWithUnread>, i64)> {
        let conversations = sqlx::query_as::<_, ConversationWithUnread>(
            r#"
            SELECT c.*,
                (SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = c.id
                   AND m.sender_id <> $1
                   AND m.read = FALSE
                   AND m.is_deleted = FALSE) AS unread_count
            FROM conversations c
            WHERE (c.participant_a = $1 OR c.participant_b = $1)
              AND c.status = $2
            ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM conversations c
            WHERE (c.participant_a = $1 OR c.participant_b = $1)
              AND c.status = $2
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((conversations, total.0))
    }

    pub async fn archive(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"UPDATE conversations SET status = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(id)
        .bind(STATUS_ARCHIVED)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Refresh the denormalized last-message cache after a confirmed write.
    /// Best-effort projection over the message log: the guard on
    /// `last_message_at` keeps concurrent senders from moving it backwards.
    pub async fn refresh_last_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message = $2,
                last_message_id = $3,
                last_message_at = $4,
                updated_at = NOW()
            WHERE id = $1
              AND (last_message_at IS NULL OR last_message_at <= $4)
            "#,
        )
        .bind(message.conversation_id)
        .bind(snippet(message))
        .bind(message.id)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn snippet(message: &Message) -> String {
    match message.text.as_deref() {
        Some(text) if !text.trim().is_empty() => text.chars().take(120).collect(),
        _ => "[media]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message_with_text(text: Option<&str>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            text: text.map(str::to_string),
            media_url: Some("https://cdn.example/img.png".to_string()),
            media_type: Some("image".to_string()),
            read: false,
            read_at: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snippet_truncates_long_text() {
        let long = "x".repeat(500);
        let message = message_with_text(Some(&long));
        assert_eq!(snippet(&message).chars().count(), 120);
    }

    #[test]
    fn snippet_falls_back_to_media_marker() {
        assert_eq!(snippet(&message_with_text(None)), "[media]");
        assert_eq!(snippet(&message_with_text(Some("  "))), "[media]");
    }
}
