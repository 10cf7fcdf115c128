mod common;

use common::test_app;
use futures::future::join_all;
use realtime_chat_service::{
    error::AppError,
    models::{Message, MessageKind, MessageStatus, StoredBody, DELETED_MESSAGE_TEXT},
    services::{cipher::UNDECRYPTABLE_PLACEHOLDER, repository::ChatRepository, MessageDraft},
};
use uuid::Uuid;

#[tokio::test]
async fn direct_conversation_is_unique_per_pair() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let conversations = &app.state.conversations;

    let (first, created) = conversations.find_or_create_direct(alice, bob).await.unwrap();
    assert!(created);
    let (second, created) = conversations.find_or_create_direct(bob, alice).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(first.unread_for(alice), 0);
    assert_eq!(first.unread_for(bob), 0);

    assert_eq!(
        conversations.find_or_create_direct(alice, alice).await.unwrap_err(),
        AppError::SelfConversation
    );
}

#[tokio::test]
async fn concurrent_direct_creation_yields_one_conversation() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");

    let attempts = (0..16).map(|i| {
        let conversations = app.state.conversations.clone();
        async move {
            if i % 2 == 0 {
                conversations.find_or_create_direct(alice, bob).await
            } else {
                conversations.find_or_create_direct(bob, alice).await
            }
        }
    });
    let results = join_all(attempts).await;

    let ids: std::collections::HashSet<Uuid> =
        results.into_iter().map(|r| r.unwrap().0.id).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(app.state.conversations.list_for_user(alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn group_creation_validates_members_and_announces() {
    let app = test_app();
    let owner = app.user("Olivia");
    let a = app.user("A");
    let b = app.user("B");
    let conversations = &app.state.conversations;

    let err = conversations
        .create_group(owner, "Pair", &[a, a, owner], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidGroup(_)));

    let err = conversations
        .create_group(owner, "   ", &[a, b], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let created = conversations
        .create_group(owner, "Weekend", &[a, b, a], None)
        .await
        .unwrap();
    let group = &created.conversation;
    assert_eq!(group.participants.len(), 3);
    assert!(group.is_participant(owner));
    assert_eq!(group.admin, Some(owner));
    assert!(created.announcement.system);
    assert_eq!(created.announcement.content, "Olivia created the group \"Weekend\"");
    assert_eq!(group.unread_for(a), 1);
    assert_eq!(group.unread_for(owner), 0);
}

#[tokio::test]
async fn unknown_creator_is_announced_as_someone() {
    let app = test_app();
    let stranger = Uuid::new_v4();
    let created = app
        .state
        .conversations
        .create_group(stranger, "Club", &[app.user("A"), app.user("B")], None)
        .await
        .unwrap();
    assert_eq!(created.announcement.content, "Someone created the group \"Club\"");
}

#[tokio::test]
async fn append_updates_pointers_and_unread_counters() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let messages = &app.state.messages;

    let sent = messages
        .append(conv.id, alice, MessageDraft::text("hello"))
        .await
        .unwrap();
    messages.append(conv.id, alice, MessageDraft::text("again")).await.unwrap();

    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 2);
    assert_eq!(summary.last_message.as_ref().map(|m| m.content.as_str()), Some("again"));
    let own = app.state.conversations.get_for_user(conv.id, alice).await.unwrap();
    assert_eq!(own.unread_count, 0);

    assert_eq!(sent.message.status, MessageStatus::Sent);
    assert!(!sent.duplicate);
}

#[tokio::test]
async fn text_bodies_are_encrypted_at_rest() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();

    let sent = app
        .state
        .messages
        .append(conv.id, alice, MessageDraft::text("top secret"))
        .await
        .unwrap();
    let stored = app.repo.get_message(sent.message.id).await.unwrap().unwrap();

    assert_ne!(stored.body.content, "top secret");
    assert!(stored.body.nonce.is_some());
    assert!(stored.body.auth_tag.is_some());
    assert_eq!(sent.message.content, "top secret");
}

#[tokio::test]
async fn tampered_body_reads_as_placeholder() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let sent = app
        .state
        .messages
        .append(conv.id, alice, MessageDraft::text("fragile"))
        .await
        .unwrap();

    app.repo
        .update_message(
            sent.message.id,
            Box::new(|m: &mut Message| {
                m.body.auth_tag = Some("00".repeat(16));
                Ok(())
            }),
        )
        .await
        .unwrap();

    let page = app
        .state
        .messages
        .history(conv.id, bob, None, None)
        .await
        .unwrap();
    assert_eq!(page.messages[0].content, UNDECRYPTABLE_PLACEHOLDER);
}

#[tokio::test]
async fn empty_text_and_foreign_reply_are_rejected() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let carol = app.user("Carol");
    let conversations = &app.state.conversations;
    let (ab, _) = conversations.find_or_create_direct(alice, bob).await.unwrap();
    let (ac, _) = conversations.find_or_create_direct(alice, carol).await.unwrap();
    let messages = &app.state.messages;

    let err = messages
        .append(ab.id, alice, MessageDraft::text("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let elsewhere = messages
        .append(ac.id, alice, MessageDraft::text("hi carol"))
        .await
        .unwrap();
    let draft = MessageDraft {
        reply_to: Some(elsewhere.message.id),
        ..MessageDraft::text("reply")
    };
    let err = messages.append(ab.id, alice, draft).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = messages
        .append(ab.id, carol, MessageDraft::text("intrude"))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::NotParticipant);
}

#[tokio::test]
async fn client_message_id_deduplicates_resends() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let draft = MessageDraft {
        client_message_id: Some("c-1".into()),
        ..MessageDraft::text("once")
    };

    let first = app.state.messages.append(conv.id, alice, draft.clone()).await.unwrap();
    let again = app.state.messages.append(conv.id, alice, draft).await.unwrap();
    assert!(again.duplicate);
    assert_eq!(first.message.id, again.message.id);

    let page = app.state.messages.history(conv.id, bob, None, None).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resends_store_one_message() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();

    let conv_id = conv.id;
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let messages = app.state.messages.clone();
            let draft = MessageDraft {
                client_message_id: Some("burst-1".into()),
                ..MessageDraft::text("sent while offline")
            };
            tokio::spawn(async move { messages.append(conv_id, alice, draft).await })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    let mut fresh = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if !outcome.duplicate {
            fresh += 1;
        }
        ids.insert(outcome.message.id);
    }
    assert_eq!(fresh, 1);
    assert_eq!(ids.len(), 1);

    let stored_id = *ids.iter().next().unwrap();
    let conversation = app.repo.get_conversation(conv.id).await.unwrap().unwrap();
    assert_eq!(conversation.last_message_id, Some(stored_id));
    assert_eq!(conversation.unread_for(bob), 1);
    assert_eq!(
        app.repo.unread_message_ids(conv.id, bob).await.unwrap(),
        vec![stored_id]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unread_counter_tracks_messages_appended_during_mark_read() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();

    let conv_id = conv.id;
    let mut handles = Vec::new();
    for i in 0..30 {
        let messages = app.state.messages.clone();
        handles.push(tokio::spawn(async move {
            if i % 3 == 0 {
                messages.mark_read(conv_id, bob).await.map(|_| ())
            } else {
                messages
                    .append(conv_id, alice, MessageDraft::text(format!("m{i}")))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let still_unread = app.repo.unread_message_ids(conv.id, bob).await.unwrap().len();
    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count as usize, still_unread);

    app.state.messages.mark_read(conv.id, bob).await.unwrap();
    let summary = app.state.conversations.get_for_user(conv.id, bob).await.unwrap();
    assert_eq!(summary.unread_count, 0);
}

#[tokio::test]
async fn system_messages_cannot_be_rewritten() {
    let app = test_app();
    let owner = app.user("Olivia");
    let a = app.user("Ann");
    let b = app.user("Ben");
    let created = app
        .state
        .conversations
        .create_group(owner, "Book club", &[a, b], None)
        .await
        .unwrap();
    let messages = &app.state.messages;

    let err = messages
        .edit(created.announcement.id, owner, "Mallory created the group")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EditNotAllowed(_)));
    let err = messages
        .delete(created.announcement.id, owner, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let left = app
        .state
        .conversations
        .leave_group(created.conversation.id, a)
        .await
        .unwrap();
    let notice = left.announcement.unwrap();
    let err = messages.edit(notice.id, a, "Ann never left").await.unwrap_err();
    assert!(matches!(err, AppError::EditNotAllowed(_)));

    let stored = app.repo.get_message(created.announcement.id).await.unwrap().unwrap();
    assert!(!stored.edited);
    assert!(!stored.deleted_for_everyone);

    // Hiding a notice for oneself is still allowed
    messages.delete(created.announcement.id, b, false).await.unwrap();
}

#[tokio::test]
async fn group_members_must_exist() {
    let app = test_app();
    let owner = app.user("Olivia");
    let a = app.user("Ann");
    let gone = app.user("Gone");
    app.directory.delete(gone);

    let err = app
        .state
        .conversations
        .create_group(owner, "Ghosts", &[a, gone], None)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::NotFound("user"));
    assert!(app.state.conversations.list_for_user(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_appends_get_distinct_increasing_times() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();

    let conv_id = conv.id;
    let sends = (0..40).map(|i| {
        let messages = app.state.messages.clone();
        let sender = if i % 2 == 0 { alice } else { bob };
        async move {
            messages
                .append(conv_id, sender, MessageDraft::text(format!("m{i}")))
                .await
        }
    });
    for result in join_all(sends).await {
        result.unwrap();
    }

    let page = app
        .state
        .messages
        .history(conv.id, alice, Some(1), Some(100))
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 40);
    for pair in page.messages.windows(2) {
        assert!(pair[0].created_at < pair[1].created_at);
    }

    let summary = app.state.conversations.get_for_user(conv.id, alice).await.unwrap();
    assert_eq!(summary.unread_count, 20);
}

#[tokio::test]
async fn history_pages_newest_first_returned_oldest_first() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    for i in 0..120 {
        app.state
            .messages
            .append(conv.id, alice, MessageDraft::text(format!("m{i}")))
            .await
            .unwrap();
    }
    let messages = &app.state.messages;

    let first = messages.history(conv.id, bob, None, None).await.unwrap();
    assert_eq!(first.limit, 50);
    assert_eq!(first.messages.len(), 50);
    assert!(first.has_more);
    assert_eq!(first.messages.first().unwrap().content, "m70");
    assert_eq!(first.messages.last().unwrap().content, "m119");

    let last = messages.history(conv.id, bob, Some(3), Some(50)).await.unwrap();
    assert_eq!(last.messages.len(), 20);
    assert!(!last.has_more);
    assert_eq!(last.messages.first().unwrap().content, "m0");

    for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
        let err = messages.history(conv.id, bob, page, limit).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

#[tokio::test]
async fn read_receipts_drive_status_and_unread() {
    let app = test_app();
    let owner = app.user("Owner");
    let a = app.user("A");
    let b = app.user("B");
    let group = app
        .state
        .conversations
        .create_group(owner, "Team", &[a, b], None)
        .await
        .unwrap()
        .conversation;
    let messages = &app.state.messages;

    let sent = messages
        .append(group.id, owner, MessageDraft::text("agenda"))
        .await
        .unwrap();

    let first = messages.mark_read(group.id, a).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(messages.mark_read(group.id, a).await.unwrap().is_empty());

    let msg = messages.get(sent.message.id).await.unwrap();
    assert!(msg.is_delivered_to(a));
    assert_eq!(msg.status(&group.participants), MessageStatus::Delivered);

    let seen = messages
        .mark_message_read(group.id, sent.message.id, b)
        .await
        .unwrap();
    assert!(seen.is_some());
    let again = messages
        .mark_message_read(group.id, sent.message.id, b)
        .await
        .unwrap();
    assert!(again.is_none());

    let summary = app.state.conversations.get_for_user(group.id, b).await.unwrap();
    assert_eq!(summary.unread_count, 1);
    let page = messages.history(group.id, owner, None, None).await.unwrap();
    let agenda = page.messages.iter().find(|m| m.id == sent.message.id).unwrap();
    assert_eq!(agenda.status, MessageStatus::Read);
}

#[tokio::test]
async fn delivery_receipts_are_idempotent_and_exclude_sender() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let sent = app
        .state
        .messages
        .append(conv.id, alice, MessageDraft::text("ping"))
        .await
        .unwrap();
    let messages = &app.state.messages;

    assert!(messages.mark_delivered(sent.message.id, bob).await.unwrap().added);
    assert!(!messages.mark_delivered(sent.message.id, bob).await.unwrap().added);
    let err = messages.mark_delivered(sent.message.id, alice).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let msg = messages.get(sent.message.id).await.unwrap();
    assert_eq!(msg.delivered_to.len(), 1);
}

#[tokio::test]
async fn edit_rules() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let messages = &app.state.messages;
    let sent = messages
        .append(conv.id, alice, MessageDraft::text("teh"))
        .await
        .unwrap();

    let err = messages.edit(sent.message.id, bob, "the").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = messages.edit(sent.message.id, alice, "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let edited = messages.edit(sent.message.id, alice, "the").await.unwrap();
    assert!(edited.edited);
    assert_eq!(edited.content, "the");
    assert_eq!(edited.created_at, sent.message.created_at);

    let stored = app.repo.get_message(sent.message.id).await.unwrap().unwrap();
    assert_eq!(messages.view(&stored, &conv.participants).content, "the");

    messages.delete(sent.message.id, alice, true).await.unwrap();
    let err = messages.edit(sent.message.id, alice, "again").await.unwrap_err();
    assert!(matches!(err, AppError::EditNotAllowed(_)));
}

#[tokio::test]
async fn media_messages_cannot_be_edited() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let media = realtime_chat_service::models::MediaMetadata {
        file_name: "cat.png".into(),
        size_bytes: 10,
        mime_type: "image/png".into(),
        duration_secs: None,
        thumbnail_url: None,
    };
    let sent = app
        .state
        .messages
        .append(
            conv.id,
            alice,
            MessageDraft::media(MessageKind::Image, "https://media.test/cat.png".into(), media),
        )
        .await
        .unwrap();

    let stored = app.repo.get_message(sent.message.id).await.unwrap().unwrap();
    assert_eq!(stored.body, StoredBody::plain("https://media.test/cat.png"));

    let err = app
        .state
        .messages
        .edit(sent.message.id, alice, "caption")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EditNotAllowed(_)));
}

#[tokio::test]
async fn delete_for_me_and_for_everyone() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let messages = &app.state.messages;
    let keep = messages
        .append(conv.id, alice, MessageDraft::text("keep"))
        .await
        .unwrap();
    let gone = messages
        .append(conv.id, alice, MessageDraft::text("oops"))
        .await
        .unwrap();

    messages.delete(keep.message.id, bob, false).await.unwrap();
    let bob_view = messages.history(conv.id, bob, None, None).await.unwrap();
    assert!(bob_view.messages.iter().all(|m| m.id != keep.message.id));
    let alice_view = messages.history(conv.id, alice, None, None).await.unwrap();
    assert!(alice_view.messages.iter().any(|m| m.id == keep.message.id));

    let err = messages.delete(gone.message.id, bob, true).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let outcome = messages.delete(gone.message.id, alice, true).await.unwrap();
    assert!(outcome.for_everyone);
    let page = messages.history(conv.id, bob, None, None).await.unwrap();
    let deleted = page.messages.iter().find(|m| m.id == gone.message.id).unwrap();
    assert!(deleted.deleted_for_everyone);
    assert_eq!(deleted.content, DELETED_MESSAGE_TEXT);
}

#[tokio::test]
async fn search_is_case_insensitive_and_skips_deleted() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let messages = &app.state.messages;
    for text in ["Pizza tonight?", "no thanks", "PIZZA tomorrow then"] {
        messages.append(conv.id, alice, MessageDraft::text(text)).await.unwrap();
    }
    let removed = messages
        .append(conv.id, alice, MessageDraft::text("pizza is gone"))
        .await
        .unwrap();
    messages.delete(removed.message.id, alice, true).await.unwrap();

    let hits = messages.search(conv.id, bob, "pizza").await.unwrap();
    let texts: Vec<&str> = hits.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["PIZZA tomorrow then", "Pizza tonight?"]);

    let err = messages.search(conv.id, bob, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn mute_only_flips_the_callers_flag() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let conversations = &app.state.conversations;

    assert!(conversations.toggle_mute(conv.id, alice).await.unwrap());
    assert!(conversations.get_for_user(conv.id, alice).await.unwrap().muted);
    assert!(!conversations.get_for_user(conv.id, bob).await.unwrap().muted);
    assert!(!conversations.toggle_mute(conv.id, alice).await.unwrap());
}

#[tokio::test]
async fn leaving_promotes_admin_and_last_leaver_deactivates() {
    let app = test_app();
    let owner = app.user("Owner");
    let a = app.user("Ann");
    let b = app.user("Ben");
    let conversations = &app.state.conversations;
    let group = conversations
        .create_group(owner, "Trip", &[a, b], None)
        .await
        .unwrap()
        .conversation;

    let left = conversations.leave_group(group.id, owner).await.unwrap();
    assert_eq!(left.outcome.new_admin, Some(a));
    assert_eq!(left.conversation.admin, Some(a));
    assert_eq!(
        left.announcement.as_ref().map(|m| m.content.as_str()),
        Some("Owner left the group")
    );
    assert_eq!(
        conversations.get(group.id, owner).await.unwrap_err(),
        AppError::NotParticipant
    );

    conversations.leave_group(group.id, a).await.unwrap();
    let last = conversations.leave_group(group.id, b).await.unwrap();
    assert!(last.outcome.deactivated);
    assert!(last.announcement.is_none());
    assert!(conversations.list_for_user(b).await.unwrap().is_empty());
}

#[tokio::test]
async fn direct_conversations_cannot_be_left() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();

    let err = app
        .state
        .conversations
        .leave_group(conv.id, alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn list_orders_by_latest_activity() {
    let app = test_app();
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let carol = app.user("Carol");
    let conversations = &app.state.conversations;
    let (with_bob, _) = conversations.find_or_create_direct(alice, bob).await.unwrap();
    let (with_carol, _) = conversations.find_or_create_direct(alice, carol).await.unwrap();

    app.state
        .messages
        .append(with_bob.id, bob, MessageDraft::text("latest"))
        .await
        .unwrap();

    let list = conversations.list_for_user(alice).await.unwrap();
    let ids: Vec<Uuid> = list.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![with_bob.id, with_carol.id]);
    assert_eq!(list[0].unread_count, 1);
}
