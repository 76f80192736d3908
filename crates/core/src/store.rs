//! Conversation store trait: durable chats and their messages.
//!
//! Every write is scoped to one conversation and is atomic per call.
//! Implementations: in-memory (for testing and ephemeral use), SQLite.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, ConversationSummary, Message, Part};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Create a conversation owned by `owner_id`, seeded with its first message.
    async fn create_conversation(
        &self,
        owner_id: &str,
        first_message: Message,
    ) -> Result<Conversation, StoreError>;

    /// Load a conversation with its messages, only if `owner_id` owns it.
    async fn find_conversation(
        &self,
        id: &ConversationId,
        owner_id: &str,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Conversations of one owner, most recently updated first.
    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Append a message to a conversation.
    async fn insert_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), StoreError>;

    /// Replace the parts of a message of `conversation_id`.
    async fn update_message_parts(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        parts: &[Part],
    ) -> Result<(), StoreError>;

    /// Set the title if the conversation has none. Returns whether it was set.
    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError>;
}
