use chrono::Utc;
use messaging_backend::models::message::Message;
use messaging_backend::realtime::events::ServerEvent;
use messaging_backend::realtime::rooms::RoomRegistry;
use uuid::Uuid;

fn message(conversation_id: Uuid, sender_id: Uuid, text: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        text: Some(text.to_string()),
        media_url: None,
        media_type: None,
        read: false,
        read_at: None,
        is_deleted: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn subscribers_observe_messages_in_publish_order() {
    let registry = RoomRegistry::new();
    let conversation = Uuid::new_v4();
    let sender = Uuid::new_v4();

    let mut subscriber = registry.subscribe(conversation).await;

    for i in 0..5 {
        registry
            .publish(
                conversation,
                ServerEvent::MessageReceived {
                    message: message(conversation, sender, &format!("m{}", i)),
                },
            )
            .await;
    }

    for i in 0..5 {
        match subscriber.recv().await.unwrap() {
            ServerEvent::MessageReceived { message } => {
                assert_eq!(message.text.as_deref(), Some(format!("m{}", i).as_str()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

#[tokio::test]
async fn multi_device_connections_each_receive_the_echo() {
    let registry = RoomRegistry::new();
    let conversation = Uuid::new_v4();
    let sender = Uuid::new_v4();

    // Same identity, two connections: both subscribe independently and both
    // receive the broadcast, sender echo included.
    let mut phone = registry.subscribe(conversation).await;
    let mut laptop = registry.subscribe(conversation).await;

    let delivered = registry
        .publish(
            conversation,
            ServerEvent::MessageReceived {
                message: message(conversation, sender, "hi"),
            },
        )
        .await;
    assert_eq!(delivered, 2);

    for subscriber in [&mut phone, &mut laptop] {
        match subscriber.recv().await.unwrap() {
            ServerEvent::MessageReceived { message } => {
                assert_eq!(message.sender_id, sender);
                assert!(!message.read);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

#[tokio::test]
async fn offline_subscriber_misses_realtime_events() {
    let registry = RoomRegistry::new();
    let conversation = Uuid::new_v4();
    let sender = Uuid::new_v4();

    // Nobody joined: the event is dropped for realtime purposes. The
    // recipient catches up through a later history fetch, not a replay.
    let delivered = registry
        .publish(
            conversation,
            ServerEvent::MessageReceived {
                message: message(conversation, sender, "missed"),
            },
        )
        .await;
    assert_eq!(delivered, 0);

    // Joining afterwards yields nothing retroactively.
    let mut late = registry.subscribe(conversation).await;
    assert!(late.try_recv().is_err());
}

#[tokio::test]
async fn read_receipt_event_reaches_the_counterpart() {
    let registry = RoomRegistry::new();
    let conversation = Uuid::new_v4();
    let reader = Uuid::new_v4();

    let mut counterpart = registry.subscribe(conversation).await;

    let read_at = Utc::now();
    registry
        .publish(
            conversation,
            ServerEvent::MessagesRead {
                conversation_id: conversation,
                read_by: reader,
                read_at,
            },
        )
        .await;

    match counterpart.recv().await.unwrap() {
        ServerEvent::MessagesRead {
            conversation_id,
            read_by,
            ..
        } => {
            assert_eq!(conversation_id, conversation);
            assert_eq!(read_by, reader);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
