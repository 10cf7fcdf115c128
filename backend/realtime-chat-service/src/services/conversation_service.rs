use crate::error::{AppError, AppResult};
use crate::models::{direct_key, Conversation, ConversationSummary, LeaveOutcome, MessageView};
use crate::services::directory::UserDirectory;
use crate::services::message_service::MessageService;
use crate::services::repository::{ChatRepository, InsertOutcome};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const UNKNOWN_DISPLAY_NAME: &str = "Someone";

/// Load an active conversation the user belongs to.
pub(crate) async fn member_conversation(
    repo: &dyn ChatRepository,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<Conversation> {
    let conversation = repo
        .get_conversation(conversation_id)
        .await?
        .filter(|c| c.active)
        .ok_or(AppError::NotFound("conversation"))?;
    if !conversation.is_participant(user_id) {
        return Err(AppError::NotParticipant);
    }
    Ok(conversation)
}

#[derive(Debug, Clone)]
pub struct GroupCreated {
    pub conversation: Conversation,
    pub announcement: MessageView,
}

#[derive(Debug, Clone)]
pub struct GroupLeft {
    pub conversation: Conversation,
    pub outcome: LeaveOutcome,
    /// "X left the group", absent when nobody remains
    pub announcement: Option<MessageView>,
}

/// Conversation lifecycle: direct/group creation, listing, mute, leave.
pub struct ConversationService {
    repo: Arc<dyn ChatRepository>,
    directory: Arc<dyn UserDirectory>,
    messages: Arc<MessageService>,
}

impl ConversationService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        directory: Arc<dyn UserDirectory>,
        messages: Arc<MessageService>,
    ) -> Self {
        Self {
            repo,
            directory,
            messages,
        }
    }

    /// Returns the conversation for the pair and whether it was created by
    /// this call. Argument order does not matter.
    pub async fn find_or_create_direct(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<(Conversation, bool)> {
        if user_a == user_b {
            return Err(AppError::SelfConversation);
        }
        if !self.directory.user_exists(user_b).await? {
            return Err(AppError::NotFound("user"));
        }

        let key = direct_key(user_a, user_b);
        if let Some(existing) = self.repo.find_direct(&key).await? {
            return Ok((self.reactivate(existing).await?, false));
        }

        let candidate = Conversation::new_direct(user_a, user_b, Utc::now());
        match self.repo.insert_conversation(&candidate).await? {
            InsertOutcome::Inserted(conversation) => {
                tracing::info!(
                    conversation_id = %conversation.id,
                    user_a = %user_a,
                    user_b = %user_b,
                    "direct conversation created"
                );
                Ok((conversation, true))
            }
            InsertOutcome::DirectExists(existing) => Ok((self.reactivate(existing).await?, false)),
        }
    }

    async fn reactivate(&self, conversation: Conversation) -> AppResult<Conversation> {
        if conversation.active {
            return Ok(conversation);
        }
        tracing::info!(conversation_id = %conversation.id, "reactivating direct conversation");
        self.repo
            .update_conversation(
                conversation.id,
                Box::new(|c: &mut Conversation| {
                    c.active = true;
                    Ok(())
                }),
            )
            .await
    }

    pub async fn create_group(
        &self,
        creator: Uuid,
        name: &str,
        member_ids: &[Uuid],
        icon: Option<String>,
    ) -> AppResult<GroupCreated> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("group name must not be empty".into()));
        }

        let mut participants: Vec<Uuid> = Vec::with_capacity(member_ids.len() + 1);
        for member in member_ids {
            if *member != creator && !participants.contains(member) {
                participants.push(*member);
            }
        }
        if participants.len() < 2 {
            return Err(AppError::InvalidGroup(
                "a group needs at least two other participants".into(),
            ));
        }
        for member in &participants {
            if !self.directory.user_exists(*member).await? {
                return Err(AppError::NotFound("user"));
            }
        }
        participants.push(creator);

        let candidate = Conversation::new_group(
            creator,
            name.to_string(),
            icon.filter(|i| !i.trim().is_empty()),
            participants,
            Utc::now(),
        );
        let conversation = match self.repo.insert_conversation(&candidate).await? {
            InsertOutcome::Inserted(c) => c,
            InsertOutcome::DirectExists(_) => {
                return Err(AppError::Conflict("unexpected direct key on group".into()))
            }
        };
        tracing::info!(
            conversation_id = %conversation.id,
            creator = %creator,
            members = conversation.participants.len(),
            "group created"
        );

        let creator_name = self.display_name(creator).await;
        let appended = self
            .messages
            .append_system(
                conversation.id,
                creator,
                format!("{creator_name} created the group \"{name}\""),
            )
            .await?;

        Ok(GroupCreated {
            conversation: appended.conversation,
            announcement: appended.message,
        })
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.repo.list_conversations_for(user_id).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let last = self.last_message_view(conversation, user_id).await?;
            summaries.push(ConversationSummary::for_user(conversation, user_id, last));
        }
        Ok(summaries)
    }

    /// Active conversations of the user, without message views
    pub async fn memberships(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.repo.list_conversations_for(user_id).await
    }

    pub async fn get(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        member_conversation(self.repo.as_ref(), conversation_id, user_id).await
    }

    pub async fn get_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ConversationSummary> {
        let conversation = self.get(conversation_id, user_id).await?;
        let last = self.last_message_view(&conversation, user_id).await?;
        Ok(ConversationSummary::for_user(&conversation, user_id, last))
    }

    /// Flip the user's mute flag, returning the new state
    pub async fn toggle_mute(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        self.get(conversation_id, user_id).await?;

        let mut muted = false;
        let state = &mut muted;
        self.repo
            .update_conversation(
                conversation_id,
                Box::new(move |c: &mut Conversation| {
                    if !c.is_participant(user_id) {
                        return Err(AppError::NotParticipant);
                    }
                    *state = c.toggle_mute(user_id);
                    Ok(())
                }),
            )
            .await?;
        Ok(muted)
    }

    pub async fn leave_group(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<GroupLeft> {
        let current = self.get(conversation_id, user_id).await?;
        if !current.is_group() {
            return Err(AppError::Validation("cannot leave a direct conversation".into()));
        }

        let mut outcome = LeaveOutcome {
            new_admin: None,
            deactivated: false,
        };
        let result = &mut outcome;
        let conversation = self
            .repo
            .update_conversation(
                conversation_id,
                Box::new(move |c: &mut Conversation| {
                    if !c.is_participant(user_id) {
                        return Err(AppError::NotParticipant);
                    }
                    *result = c.remove_participant(user_id);
                    Ok(())
                }),
            )
            .await?;

        tracing::info!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            new_admin = ?outcome.new_admin,
            deactivated = outcome.deactivated,
            "participant left group"
        );

        if outcome.deactivated {
            return Ok(GroupLeft {
                conversation,
                outcome,
                announcement: None,
            });
        }

        let name = self.display_name(user_id).await;
        let appended = self
            .messages
            .append_system(conversation_id, user_id, format!("{name} left the group"))
            .await?;

        Ok(GroupLeft {
            conversation: appended.conversation,
            outcome,
            announcement: Some(appended.message),
        })
    }

    async fn last_message_view(
        &self,
        conversation: &Conversation,
        user_id: Uuid,
    ) -> AppResult<Option<MessageView>> {
        let Some(id) = conversation.last_message_id else {
            return Ok(None);
        };
        Ok(self
            .repo
            .get_message(id)
            .await?
            .filter(|m| !m.is_hidden_for(user_id))
            .map(|m| self.messages.view(&m, &conversation.participants)))
    }

    async fn display_name(&self, user_id: Uuid) -> String {
        match self.directory.display_name(user_id).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => UNKNOWN_DISPLAY_NAME.to_string(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "display name lookup failed");
                UNKNOWN_DISPLAY_NAME.to_string()
            }
        }
    }
}
