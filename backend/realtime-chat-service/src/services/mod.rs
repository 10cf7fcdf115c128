pub mod blob_store;
pub mod cipher;
pub mod conversation_service;
pub mod delivery;
pub mod directory;
pub mod message_service;
pub mod presence;
pub mod repository;

pub use blob_store::{BlobStore, MemoryBlobStore, S3BlobStore};
pub use cipher::{CipherError, EncryptedPayload, MessageCipher};
pub use conversation_service::ConversationService;
pub use delivery::DeliveryCoordinator;
pub use directory::{MemoryUserDirectory, PgUserDirectory, UserDirectory};
pub use message_service::{MessageDraft, MessageService};
pub use presence::PresenceRegistry;
pub use repository::{ChatRepository, MemoryChatRepository, PgChatRepository};
