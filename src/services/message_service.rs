use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::message::Message;

#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

impl MessageContent {
    /// A message must carry text and/or a media reference.
    pub fn is_empty(&self) -> bool {
        let text_empty = self
            .text
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(true);
        let media_empty = self
            .media_url
            .as_deref()
            .map(|u| u.trim().is_empty())
            .unwrap_or(true);
        text_empty && media_empty
    }
}

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
}

impl MessageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a message to the conversation log. The creation timestamp is
    /// server-assigned by the store and defines the order history is read in.
    pub async fn create(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: MessageContent,
    ) -> Result<Message> {
        if content.is_empty() {
            return Err(Error::BadRequest(
                "Message must contain text or media".to_string(),
            ));
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, text, media_url, media_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content.text.filter(|t| !t.trim().is_empty()))
        .bind(content.media_url.filter(|u| !u.trim().is_empty()))
        .bind(content.media_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Paginated history, soft-deleted rows excluded. Pages are cut
    /// newest-first so page 1 is always the most recent window, then each
    /// page is returned in chronological order.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64)> {
        let mut messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((messages, total.0))
    }

    /// Flip every unread message from the counterpart to read, in one batch.
    /// Idempotent: a second call matches zero rows. Returns the number of
    /// updated rows and the receipt timestamp.
    pub async fn mark_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<(u64, DateTime<Utc>)> {
        let read_at = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE, read_at = $3
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND read = FALSE
              AND is_deleted = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected(), read_at))
    }

    pub async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND read = FALSE
              AND is_deleted = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// Soft delete. Only the author may delete; the row stays for audit but
    /// drops out of history, unread counts and search.
    pub async fn soft_delete(&self, message_id: Uuid, sender_id: Uuid) -> Result<()> {
        let message = sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages WHERE id = $1 AND is_deleted = FALSE"#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Message not found".to_string()))?;

        if message.sender_id != sender_id {
            return Err(Error::Forbidden(
                "Only the sender can delete a message".to_string(),
            ));
        }

        sqlx::query(r#"UPDATE messages SET is_deleted = TRUE WHERE id = $1"#)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Full-text search over message bodies, scoped to conversations the
    /// caller participates in inside the query predicate itself rather than
    /// filtered afterwards.
    pub async fn search(&self, user_id: Uuid, query: &str, limit: i64) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT m.* FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE (c.participant_a = $1 OR c.participant_b = $1)
              AND m.is_deleted = FALSE
              AND to_tsvector('simple', COALESCE(m.text, '')) @@ plainto_tsquery('simple', $2)
            ORDER BY m.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_requires_text_or_media() {
        assert!(MessageContent::default().is_empty());
        assert!(MessageContent {
            text: Some("".to_string()),
            media_url: Some("   ".to_string()),
            media_type: None,
        }
        .is_empty());
        assert!(!MessageContent {
            text: Some("hi".to_string()),
            ..Default::default()
        }
        .is_empty());
        assert!(!MessageContent {
            media_url: Some("https://cdn.example/a.png".to_string()),
            media_type: Some("image".to_string()),
            ..Default::default()
        }
        .is_empty());
    }
}
