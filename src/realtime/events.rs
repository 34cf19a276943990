use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::Message;

/// Events a client may send over the realtime channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: Uuid,
    },
    LeaveConversation {
        conversation_id: Uuid,
    },
    SendMessage {
        conversation_id: Uuid,
        text: Option<String>,
        media_url: Option<String>,
        media_type: Option<String>,
    },
    MarkAsRead {
        conversation_id: Uuid,
    },
}

/// Events the server pushes down a connection: acknowledgements for the
/// caller plus room multicasts. Only the room variants ever travel through
/// the broadcast channels.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    JoinAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unread_count: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    MessageAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ReadAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    MessageReceived {
        message: Message,
    },
    MessagesRead {
        conversation_id: Uuid,
        read_by: Uuid,
        read_at: DateTime<Utc>,
    },
    /// Frame-level failure (unparseable payload).
    Error {
        error: String,
    },
}

pub fn room_name(conversation_id: Uuid) -> String {
    format!("conversation:{}", conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_wire_names() {
        let id = Uuid::new_v4();

        let join: ClientEvent = serde_json::from_str(&format!(
            r#"{{"event":"join-conversation","conversationId":"{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(
            join,
            ClientEvent::JoinConversation { conversation_id } if conversation_id == id
        ));

        let leave: ClientEvent = serde_json::from_str(&format!(
            r#"{{"event":"leave-conversation","conversationId":"{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(leave, ClientEvent::LeaveConversation { .. }));

        let send: ClientEvent = serde_json::from_str(&format!(
            r#"{{"event":"send-message","conversationId":"{id}","text":"hi"}}"#
        ))
        .unwrap();
        match send {
            ClientEvent::SendMessage {
                conversation_id,
                text,
                media_url,
                ..
            } => {
                assert_eq!(conversation_id, id);
                assert_eq!(text.as_deref(), Some("hi"));
                assert!(media_url.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let read: ClientEvent = serde_json::from_str(&format!(
            r#"{{"event":"mark-as-read","conversationId":"{id}"}}"#
        ))
        .unwrap();
        assert!(matches!(read, ClientEvent::MarkAsRead { .. }));
    }

    #[test]
    fn server_events_serialize_wire_names() {
        let id = Uuid::new_v4();
        let reader = Uuid::new_v4();

        let event = ServerEvent::MessagesRead {
            conversation_id: id,
            read_by: reader,
            read_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "messages-read");
        assert_eq!(value["conversationId"], id.to_string());
        assert_eq!(value["readBy"], reader.to_string());
        assert!(value.get("readAt").is_some());

        let ack = ServerEvent::JoinAck {
            success: true,
            room_name: Some(room_name(id)),
            unread_count: Some(3),
            error: None,
        };
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["event"], "join-ack");
        assert_eq!(value["roomName"], format!("conversation:{}", id));
        assert_eq!(value["unreadCount"], 3);
        assert!(value.get("error").is_none());
    }
}
