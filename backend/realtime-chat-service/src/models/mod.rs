pub mod conversation;
pub mod message;

pub use conversation::{direct_key, Conversation, ConversationKind, ConversationSummary, LeaveOutcome};
pub use message::{
    MediaMetadata, Message, MessageKind, MessageStatus, MessageView, Receipt, StoredBody,
    DELETED_MESSAGE_TEXT,
};
