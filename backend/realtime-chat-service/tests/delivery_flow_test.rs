mod common;

use common::test_app;
use realtime_chat_service::{
    models::MessageStatus,
    services::MessageDraft,
    websocket::{
        events::{
            ClientEvent, JoinChatPayload, MessageDeliveredPayload, MessageSeenPayload,
            TypingPayload,
        },
        handlers::{dispatch, AuthContext},
        Room,
    },
};
use serde_json::json;

fn auth(client: &common::Client) -> AuthContext {
    AuthContext {
        user_id: client.handle.user_id,
        connection: client.handle.clone(),
    }
}

#[tokio::test]
async fn new_message_reaches_recipient_only() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let mut b = app.connect(bob).await;
    a.drain();
    b.drain();

    let sent = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("hi bob"))
        .await
        .unwrap();

    let received = b.events("newMessage");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["id"], json!(sent.id));
    assert_eq!(received[0]["content"], "hi bob");
    assert_eq!(received[0]["status"], "sent");
    assert!(a.events("newMessage").is_empty());
}

#[tokio::test]
async fn duplicate_resend_is_not_fanned_out_twice() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut b = app.connect(bob).await;
    b.drain();

    let draft = MessageDraft {
        client_message_id: Some("retry-7".into()),
        ..MessageDraft::text("only once")
    };
    let delivery = &app.state.delivery;
    let first = delivery.send_message(conv.id, alice, draft.clone()).await.unwrap();
    let second = delivery.send_message(conv.id, alice, draft).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(b.events("newMessage").len(), 1);
}

#[tokio::test]
async fn offline_recipient_reads_history_and_sender_is_told() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;

    let first = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("are you there?"))
        .await
        .unwrap();
    let second = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("ping"))
        .await
        .unwrap();
    a.drain();

    let page = app
        .state
        .delivery
        .history(conv.id, bob, None, None)
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 2);
    assert!(page.messages.iter().all(|m| m.status == MessageStatus::Read));

    let reads = a.events("messageRead");
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0]["readBy"], json!(bob));
    assert_eq!(reads[0]["conversationId"], json!(conv.id));
    let ids = reads[0]["messageIds"].as_array().unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&json!(first.id)));
    assert!(ids.contains(&json!(second.id)));

    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 0);

    app.state
        .delivery
        .history(conv.id, bob, None, None)
        .await
        .unwrap();
    assert!(a.events("messageRead").is_empty());
}

#[tokio::test]
async fn delivered_ack_notifies_sender_once() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let b = app.connect(bob).await;
    let sent = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("ack me"))
        .await
        .unwrap();
    a.drain();

    let ack = || ClientEvent::MessageDelivered(MessageDeliveredPayload { message_id: sent.id });
    dispatch(&app.state.delivery, &auth(&b), ack()).await;
    dispatch(&app.state.delivery, &auth(&b), ack()).await;

    let updates = a.events("messageDeliveryUpdate");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["messageId"], json!(sent.id));
    assert_eq!(updates[0]["userId"], json!(bob));
    assert_eq!(updates[0]["status"], "delivered");
}

#[tokio::test]
async fn direct_message_goes_sent_delivered_read() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let mut b = app.connect(bob).await;
    a.drain();
    b.drain();

    let sent = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("dinner at 8?"))
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(b.events("newMessage").len(), 1);
    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 1);

    let ack = ClientEvent::MessageDelivered(MessageDeliveredPayload { message_id: sent.id });
    dispatch(&app.state.delivery, &auth(&b), ack).await;
    let stored = app.state.messages.get(sent.id).await.unwrap();
    assert_eq!(stored.status(&conv.participants), MessageStatus::Delivered);
    let updates = a.events("messageDeliveryUpdate");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["status"], "delivered");

    let page = app
        .state
        .delivery
        .history(conv.id, bob, None, None)
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].status, MessageStatus::Read);
    let stored = app.state.messages.get(sent.id).await.unwrap();
    assert_eq!(stored.status(&conv.participants), MessageStatus::Read);

    let reads = a.events("messageRead");
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0]["messageIds"], json!([sent.id]));
    assert_eq!(reads[0]["readBy"], json!(bob));

    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 0);
}

#[tokio::test]
async fn message_seen_sends_read_receipt() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let b = app.connect(bob).await;
    let sent = app
        .state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("look"))
        .await
        .unwrap();
    a.drain();

    let seen = ClientEvent::MessageSeen(MessageSeenPayload {
        conversation_id: conv.id,
        message_id: sent.id,
    });
    dispatch(&app.state.delivery, &auth(&b), seen.clone()).await;
    dispatch(&app.state.delivery, &auth(&b), seen).await;

    let reads = a.events("messageRead");
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0]["messageIds"], json!([sent.id]));

    let message = app.state.messages.get(sent.id).await.unwrap();
    assert!(message.is_read_by(bob));
    assert!(message.is_delivered_to(bob));
}

#[tokio::test]
async fn typing_is_relayed_to_the_room_except_typer() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let mallory = app.user("Mallory");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let mut b = app.connect(bob).await;
    let m = app.connect(mallory).await;
    a.drain();
    b.drain();

    let typing = |is_typing| {
        ClientEvent::Typing(TypingPayload {
            conversation_id: conv.id,
            is_typing,
        })
    };
    dispatch(&app.state.delivery, &auth(&a), typing(true)).await;
    dispatch(&app.state.delivery, &auth(&a), typing(false)).await;

    let frames = b.events("userTyping");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["userId"], json!(alice));
    assert_eq!(frames[0]["isTyping"], true);
    assert_eq!(frames[1]["isTyping"], false);
    assert!(a.events("userTyping").is_empty());

    dispatch(&app.state.delivery, &auth(&m), typing(true)).await;
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn join_chat_requires_membership() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let mallory = app.user("Mallory");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let m = app.connect(mallory).await;

    let join = ClientEvent::JoinChat(JoinChatPayload {
        conversation_id: conv.id,
    });
    dispatch(&app.state.delivery, &auth(&m), join).await;

    assert!(!app
        .state
        .rooms
        .is_member(Room::Conversation(conv.id), m.handle.id));
}

#[tokio::test]
async fn presence_is_announced_to_counterparties() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    app.state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;

    let b = app.connect(bob).await;
    let online = a.events("userOnline");
    assert_eq!(online.len(), 1);
    assert_eq!(online[0]["userId"], json!(bob));
    assert!(online[0].get("lastActive").is_none());
    assert!(app.state.presence.is_online(bob));

    app.state.delivery.disconnect(&b.handle).await.unwrap();
    let offline = a.events("userOffline");
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0]["userId"], json!(bob));
    assert!(offline[0]["lastActive"].is_string());
    assert!(!app.state.presence.is_online(bob));
    assert!(app.directory.last_active(bob).is_some());
}

#[tokio::test]
async fn stale_connection_close_keeps_user_online() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let old = app.connect(bob).await;
    let mut new = app.connect(bob).await;
    a.drain();

    assert!(!app
        .state
        .rooms
        .is_member(Room::Conversation(conv.id), old.handle.id));

    app.state.delivery.disconnect(&old.handle).await.unwrap();
    assert!(a.events("userOffline").is_empty());
    assert!(app.state.presence.is_online(bob));
    assert_eq!(
        app.state.presence.connection_for(bob).map(|c| c.id),
        Some(new.handle.id)
    );

    app.state
        .delivery
        .send_message(conv.id, alice, MessageDraft::text("still there?"))
        .await
        .unwrap();
    assert_eq!(new.events("newMessage").len(), 1);
}

#[tokio::test]
async fn new_group_is_announced_and_rooms_joined() {
    let app = test_app();
    let owner = app.user("Olivia");
    let ann = app.user("Ann");
    let ben = app.user("Ben");
    let mut o = app.connect(owner).await;
    let mut a = app.connect(ann).await;

    let created = app
        .state
        .delivery
        .create_group(owner, "Launch", &[ann, ben], None)
        .await
        .unwrap();
    let group_id = created.conversation.id;

    let announced = a.events("newChatCreated");
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0]["id"], json!(group_id));
    assert_eq!(announced[0]["groupName"], "Launch");
    assert_eq!(announced[0]["unreadCount"], 1);
    assert_eq!(
        announced[0]["lastMessage"]["content"],
        "Olivia created the group \"Launch\""
    );
    assert!(o.events("newChatCreated").is_empty());

    let rooms = &app.state.rooms;
    assert!(rooms.is_member(Room::Conversation(group_id), o.handle.id));
    assert!(rooms.is_member(Room::Conversation(group_id), a.handle.id));

    app.state.delivery.typing(group_id, owner, true).await.unwrap();
    assert_eq!(a.events("userTyping").len(), 1);
}

#[tokio::test]
async fn new_direct_chat_is_announced_once() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let mut b = app.connect(bob).await;

    let (conv, created) = app.state.delivery.create_direct(alice, bob).await.unwrap();
    assert!(created);
    let (_, created) = app.state.delivery.create_direct(bob, alice).await.unwrap();
    assert!(!created);

    let announced = b.events("newChatCreated");
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0]["id"], json!(conv.id));
    assert_eq!(announced[0]["kind"], "direct");
}

#[tokio::test]
async fn edits_and_deletes_are_broadcast_to_the_room() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let mut a = app.connect(alice).await;
    let mut b = app.connect(bob).await;
    let delivery = &app.state.delivery;
    let sent = delivery
        .send_message(conv.id, alice, MessageDraft::text("draft"))
        .await
        .unwrap();
    a.drain();
    b.drain();

    delivery.edit_message(sent.id, alice, "final").await.unwrap();
    let edits = b.events("messageEdited");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0]["content"], "final");
    assert_eq!(edits[0]["edited"], true);
    assert_eq!(a.events("messageEdited").len(), 1);

    delivery.delete_message(sent.id, bob, false).await.unwrap();
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());

    delivery.delete_message(sent.id, alice, true).await.unwrap();
    let deleted = b.events("messageDeleted");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["messageId"], json!(sent.id));
    assert_eq!(deleted[0]["conversationId"], json!(conv.id));
}

#[tokio::test]
async fn leaving_a_group_announces_to_remaining_members() {
    let app = test_app();
    let owner = app.user("Olivia");
    let ann = app.user("Ann");
    let ben = app.user("Ben");
    let group_id = app
        .state
        .conversations
        .create_group(owner, "Book club", &[ann, ben], None)
        .await
        .unwrap()
        .conversation
        .id;
    let mut o = app.connect(owner).await;
    let mut a = app.connect(ann).await;
    let mut b = app.connect(ben).await;
    o.drain();
    a.drain();
    b.drain();

    app.state.delivery.leave_group(group_id, owner).await.unwrap();

    for client in [&mut a, &mut b] {
        let notices = client.events("newMessage");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0]["content"], "Olivia left the group");
        assert_eq!(notices[0]["system"], true);
    }
    assert!(o.events("newMessage").is_empty());
    assert!(!app
        .state
        .rooms
        .is_member(Room::Conversation(group_id), o.handle.id));

    app.state.delivery.typing(group_id, ann, true).await.unwrap();
    assert!(o.drain().is_empty());
    assert_eq!(b.events("userTyping").len(), 1);
}

#[tokio::test]
async fn closed_receivers_are_pruned_on_broadcast() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let a = app.connect(alice).await;
    let b = app.connect(bob).await;
    let bob_connection = b.handle.id;
    drop(b);

    app.state.delivery.typing(conv.id, alice, true).await.unwrap();
    assert!(!app
        .state
        .rooms
        .is_member(Room::Conversation(conv.id), bob_connection));
    assert!(app
        .state
        .rooms
        .is_member(Room::Conversation(conv.id), a.handle.id));
}
