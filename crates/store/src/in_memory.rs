//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use repolens_core::error::StoreError;
use repolens_core::message::{Conversation, ConversationId, ConversationSummary, Message, Part};
use repolens_core::store::ConversationStore;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every conversation in a Vec behind one lock.
pub struct InMemoryStore {
    conversations: Arc<RwLock<Vec<Conversation>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_conversation(
        &self,
        owner_id: &str,
        first_message: Message,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation::new(owner_id);
        conversation.push(first_message);
        self.conversations.write().await.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
        owner_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .iter()
            .find(|c| &c.id == id && c.owner_id == owner_id)
            .cloned())
    }

    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .map(ConversationSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn insert_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))?;
        conversation.push(message.clone());
        Ok(())
    }

    async fn update_message_parts(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        parts: &[Part],
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))?;
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        message.parts = parts.to_vec();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))?;
        if conversation.title.is_some() {
            return Ok(false);
        }
        conversation.title = Some(title.to_string());
        Ok(true)
    }
}
