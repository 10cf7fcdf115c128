//! Persist-then-fan-out orchestration between the store and live
//! connections. Every operation commits to the store first; events go out
//! only after the write succeeded.

use crate::error::AppResult;
use crate::models::{Conversation, ConversationSummary, Message, MessageView};
use crate::services::conversation_service::{ConversationService, GroupCreated, GroupLeft};
use crate::services::directory::UserDirectory;
use crate::services::message_service::{DeleteOutcome, HistoryPage, MessageDraft, MessageService};
use crate::services::presence::PresenceRegistry;
use crate::websocket::events::{
    DeliveryUpdatePayload, MessageDeletedPayload, MessageReadPayload, PresencePayload,
    ServerEvent, UserTypingPayload,
};
use crate::websocket::{ConnectionHandle, Room, RoomRegistry};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

pub struct DeliveryCoordinator {
    conversations: Arc<ConversationService>,
    messages: Arc<MessageService>,
    directory: Arc<dyn UserDirectory>,
    presence: Arc<PresenceRegistry>,
    rooms: RoomRegistry,
}

impl DeliveryCoordinator {
    pub fn new(
        conversations: Arc<ConversationService>,
        messages: Arc<MessageService>,
        directory: Arc<dyn UserDirectory>,
        presence: Arc<PresenceRegistry>,
        rooms: RoomRegistry,
    ) -> Self {
        Self {
            conversations,
            messages,
            directory,
            presence,
            rooms,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Register a freshly authenticated connection: presence, private room,
    /// one room per active conversation, then `userOnline` to counterparties.
    /// Returns the number of conversation rooms joined.
    pub async fn connect(&self, handle: &ConnectionHandle) -> AppResult<usize> {
        let user_id = handle.user_id;
        if let Some(previous) = self.presence.set_online(handle.clone()) {
            tracing::info!(
                user_id = %user_id,
                replaced = %previous.id,
                "newer connection replaces existing one"
            );
            self.rooms.leave_all(previous.id);
        }
        self.rooms.join(Room::User(user_id), handle);

        let conversations = self.conversations.memberships(user_id).await?;
        for conversation in &conversations {
            self.rooms.join(Room::Conversation(conversation.id), handle);
        }

        let online = ServerEvent::UserOnline(PresencePayload {
            user_id,
            last_active: None,
        });
        self.notify_counterparties(&conversations, user_id, &online);

        Ok(conversations.len())
    }

    /// Tear down a closed connection. Offline is only announced when this
    /// connection was still the user's registered one.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> AppResult<()> {
        self.rooms.leave_all(handle.id);
        if !self.presence.set_offline_if(handle.user_id, handle.id) {
            return Ok(());
        }

        let user_id = handle.user_id;
        let now = Utc::now();
        if let Err(e) = self.directory.touch_last_active(user_id, now).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to update last_active");
        }

        let conversations = self.conversations.memberships(user_id).await?;
        let offline = ServerEvent::UserOffline(PresencePayload {
            user_id,
            last_active: Some(now),
        });
        self.notify_counterparties(&conversations, user_id, &offline);
        Ok(())
    }

    /// Append and push `newMessage` to every other participant's private room.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        draft: MessageDraft,
    ) -> AppResult<MessageView> {
        let appended = self.messages.append(conversation_id, sender_id, draft).await?;
        if !appended.duplicate {
            self.fan_out_new_message(&appended.conversation, &appended.message);
        }
        Ok(appended.message)
    }

    pub async fn create_direct(
        &self,
        creator: Uuid,
        other: Uuid,
    ) -> AppResult<(Conversation, bool)> {
        let (conversation, created) = self
            .conversations
            .find_or_create_direct(creator, other)
            .await?;
        if created {
            self.announce_new_chat(&conversation, creator, None);
        }
        Ok((conversation, created))
    }

    pub async fn create_group(
        &self,
        creator: Uuid,
        name: &str,
        member_ids: &[Uuid],
        icon: Option<String>,
    ) -> AppResult<GroupCreated> {
        let created = self
            .conversations
            .create_group(creator, name, member_ids, icon)
            .await?;
        self.announce_new_chat(
            &created.conversation,
            creator,
            Some(created.announcement.clone()),
        );
        Ok(created)
    }

    /// Mark everything read for `user_id` and tell each affected sender.
    /// Returns the ids that gained a read receipt.
    pub async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let affected = self.messages.mark_read(conversation_id, user_id).await?;
        self.notify_readers(conversation_id, user_id, &affected);
        Ok(affected.iter().map(|m| m.id).collect())
    }

    pub async fn message_seen(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        if let Some(message) = self
            .messages
            .mark_message_read(conversation_id, message_id, user_id)
            .await?
        {
            self.notify_readers(conversation_id, user_id, std::slice::from_ref(&message));
        }
        Ok(())
    }

    pub async fn message_delivered(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let receipt = self.messages.mark_delivered(message_id, user_id).await?;
        if !receipt.added {
            return Ok(());
        }

        let message = &receipt.message;
        let event = ServerEvent::MessageDeliveryUpdate(DeliveryUpdatePayload {
            message_id,
            conversation_id: message.conversation_id,
            user_id,
            status: message.status(&receipt.participants),
        });
        if let Some(frame) = event.to_frame() {
            self.rooms.send_to_user(message.sender_id, &frame);
        }
        Ok(())
    }

    /// History read by a participant. Unread messages are marked read
    /// first so senders see receipts for pulled messages.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> AppResult<HistoryPage> {
        self.conversations.get(conversation_id, user_id).await?;
        self.mark_conversation_read(conversation_id, user_id).await?;
        self.messages
            .history(conversation_id, user_id, page, limit)
            .await
    }

    pub async fn edit_message(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        content: &str,
    ) -> AppResult<MessageView> {
        let view = self.messages.edit(message_id, editor_id, content).await?;
        if let Some(frame) = ServerEvent::MessageEdited(view.clone()).to_frame() {
            self.rooms
                .broadcast(Room::Conversation(view.conversation_id), &frame, None);
        }
        Ok(view)
    }

    /// Delete-for-me stays private; delete-for-everyone is broadcast.
    pub async fn delete_message(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<DeleteOutcome> {
        let outcome = self
            .messages
            .delete(message_id, user_id, for_everyone)
            .await?;
        if outcome.for_everyone {
            let event = ServerEvent::MessageDeleted(MessageDeletedPayload {
                message_id,
                conversation_id: outcome.conversation_id,
            });
            if let Some(frame) = event.to_frame() {
                self.rooms
                    .broadcast(Room::Conversation(outcome.conversation_id), &frame, None);
            }
        }
        Ok(outcome)
    }

    pub async fn leave_group(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<GroupLeft> {
        let left = self
            .conversations
            .leave_group(conversation_id, user_id)
            .await?;

        if let Some(connection) = self.presence.connection_for(user_id) {
            self.rooms
                .leave(Room::Conversation(conversation_id), connection.id);
        }
        if let Some(announcement) = &left.announcement {
            self.fan_out_new_message(&left.conversation, announcement);
        }
        Ok(left)
    }

    pub async fn typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        self.conversations.get(conversation_id, user_id).await?;
        let event = ServerEvent::UserTyping(UserTypingPayload {
            conversation_id,
            user_id,
            is_typing,
        });
        if let Some(frame) = event.to_frame() {
            self.rooms
                .broadcast(Room::Conversation(conversation_id), &frame, Some(user_id));
        }
        Ok(())
    }

    pub async fn join_chat(&self, conversation_id: Uuid, connection: &ConnectionHandle) -> AppResult<()> {
        self.conversations
            .get(conversation_id, connection.user_id)
            .await?;
        self.rooms
            .join(Room::Conversation(conversation_id), connection);
        Ok(())
    }

    fn fan_out_new_message(&self, conversation: &Conversation, message: &MessageView) {
        let Some(frame) = ServerEvent::NewMessage(message.clone()).to_frame() else {
            return;
        };
        let mut delivered = 0;
        for recipient in conversation.others(message.sender_id) {
            delivered += self.rooms.send_to_user(recipient, &frame);
        }
        tracing::debug!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            live_recipients = delivered,
            "fanned out new message"
        );
    }

    /// Online participants join the new room; everyone but the creator gets
    /// `newChatCreated` with their own view of the conversation.
    fn announce_new_chat(
        &self,
        conversation: &Conversation,
        creator: Uuid,
        last_message: Option<MessageView>,
    ) {
        for participant in &conversation.participants {
            if let Some(connection) = self.presence.connection_for(*participant) {
                self.rooms
                    .join(Room::Conversation(conversation.id), &connection);
            }
            if *participant == creator {
                continue;
            }
            let summary =
                ConversationSummary::for_user(conversation, *participant, last_message.clone());
            if let Some(frame) = ServerEvent::NewChatCreated(summary).to_frame() {
                self.rooms.send_to_user(*participant, &frame);
            }
        }
    }

    /// One `messageRead` per distinct sender of the affected messages
    fn notify_readers(&self, conversation_id: Uuid, reader: Uuid, messages: &[Message]) {
        let mut by_sender: BTreeMap<Uuid, (Vec<Uuid>, DateTime<Utc>)> = BTreeMap::new();
        for message in messages {
            let read_at = message
                .read_by
                .iter()
                .find(|r| r.user_id == reader)
                .map(|r| r.at)
                .unwrap_or_else(Utc::now);
            let entry = by_sender
                .entry(message.sender_id)
                .or_insert_with(|| (Vec::new(), read_at));
            entry.0.push(message.id);
        }

        for (sender, (message_ids, read_at)) in by_sender {
            let event = ServerEvent::MessageRead(MessageReadPayload {
                conversation_id,
                message_ids,
                read_by: reader,
                read_at,
            });
            if let Some(frame) = event.to_frame() {
                self.rooms.send_to_user(sender, &frame);
            }
        }
    }

    fn notify_counterparties(&self, conversations: &[Conversation], user_id: Uuid, event: &ServerEvent) {
        let Some(frame) = event.to_frame() else {
            return;
        };
        let counterparties: BTreeSet<Uuid> = conversations
            .iter()
            .flat_map(|c| c.others(user_id))
            .collect();
        for counterparty in counterparties {
            self.rooms.send_to_user(counterparty, &frame);
        }
    }
}
