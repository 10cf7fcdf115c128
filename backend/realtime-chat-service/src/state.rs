use crate::{
    config::Config,
    error::{AppError, AppResult},
    services::{
        blob_store::BlobStore, cipher::MessageCipher, conversation_service::ConversationService,
        delivery::DeliveryCoordinator, directory::UserDirectory, message_service::MessageService,
        presence::PresenceRegistry, repository::ChatRepository,
    },
    websocket::RoomRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conversations: Arc<ConversationService>,
    pub messages: Arc<MessageService>,
    pub delivery: Arc<DeliveryCoordinator>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: RoomRegistry,
    /// Media storage for uploaded attachments
    pub blobs: Arc<dyn BlobStore>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    /// Wire services over the given backends
    pub fn build(
        config: Arc<Config>,
        repo: Arc<dyn ChatRepository>,
        directory: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobStore>,
    ) -> AppResult<Self> {
        let cipher = MessageCipher::from_secret(&config.message_encryption_secret)
            .map_err(|e| AppError::Config(format!("message cipher: {e}")))?;

        let messages = Arc::new(MessageService::new(repo.clone(), Arc::new(cipher)));
        let conversations = Arc::new(ConversationService::new(
            repo,
            directory.clone(),
            messages.clone(),
        ));
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = RoomRegistry::new();
        let delivery = Arc::new(DeliveryCoordinator::new(
            conversations.clone(),
            messages.clone(),
            directory.clone(),
            presence.clone(),
            rooms.clone(),
        ));

        Ok(Self {
            config,
            conversations,
            messages,
            delivery,
            presence,
            rooms,
            blobs,
            directory,
        })
    }
}
