use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

const ROOM_CAPACITY: usize = 256;

/// Process-local registry of conversation rooms. A room is nothing more than
/// a broadcast channel every subscribed connection holds a receiver on;
/// membership is not persisted and is gone after a restart, so clients
/// re-join on reconnect.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, broadcast::Sender<ServerEvent>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Multicast to every current subscriber of the conversation's room.
    /// Returns how many receivers got the event; an empty room drops the
    /// event (no offline delivery fallback) and is pruned. The common path
    /// holds only the read lock, so publishers to different rooms do not
    /// serialize; the write lock is taken just to prune a dead room.
    pub async fn publish(&self, conversation_id: Uuid, event: ServerEvent) -> usize {
        {
            let rooms = self.rooms.read().await;
            let Some(sender) = rooms.get(&conversation_id) else {
                return 0;
            };
            if let Ok(delivered) = sender.send(event) {
                return delivered;
            }
        }

        // Every receiver is gone. Re-check under the write lock: a new
        // subscriber may have arrived since the read lock was released.
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(&conversation_id) {
            if sender.receiver_count() == 0 {
                rooms.remove(&conversation_id);
            }
        }
        0
    }

    #[cfg(test)]
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::ServerEvent;
    use chrono::Utc;

    fn read_event(conversation_id: Uuid) -> ServerEvent {
        ServerEvent::MessagesRead {
            conversation_id,
            read_by: Uuid::new_v4(),
            read_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();

        let mut first = registry.subscribe(conversation).await;
        let mut second = registry.subscribe(conversation).await;

        let delivered = registry.publish(conversation, read_event(conversation)).await;
        assert_eq!(delivered, 2);
        assert!(matches!(
            first.recv().await.unwrap(),
            ServerEvent::MessagesRead { .. }
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            ServerEvent::MessagesRead { .. }
        ));
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let registry = RoomRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let mut sub_a = registry.subscribe(room_a).await;
        let mut sub_b = registry.subscribe(room_b).await;

        registry.publish(room_a, read_event(room_a)).await;

        assert!(matches!(
            sub_a.recv().await.unwrap(),
            ServerEvent::MessagesRead { conversation_id, .. } if conversation_id == room_a
        ));
        assert!(sub_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_room_drops_event_and_is_pruned() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();

        assert_eq!(registry.publish(conversation, read_event(conversation)).await, 0);

        let receiver = registry.subscribe(conversation).await;
        drop(receiver);
        assert_eq!(registry.publish(conversation, read_event(conversation)).await, 0);
        assert_eq!(registry.room_count().await, 0);
    }
}
