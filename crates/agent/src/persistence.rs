//! Turn persistence.
//!
//! Decides, once per turn, whether the assistant message is inserted or
//! replaces the stored tail of a continued turn, and sets the chat title at
//! most once. Title failures are logged and swallowed; message failures are
//! returned so the caller can report them.

use repolens_core::error::StoreError;
use repolens_core::message::{Conversation, Message, Role};
use repolens_core::store::ConversationStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::loop_runner::LoopState;

/// What happened to the assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Inserted { message_id: String },
    Updated { message_id: String },
    /// The loop stopped before producing any part; nothing was written.
    Skipped,
}

impl Persisted {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Persisted::Inserted { message_id } | Persisted::Updated { message_id } => {
                Some(message_id)
            }
            Persisted::Skipped => None,
        }
    }
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn ConversationStore>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Store the incoming user message of a follow-up turn.
    ///
    /// The first user message is stored when the chat is created, so a
    /// single-message history is skipped, as is a message already stored.
    /// The stored copy gets a fresh id.
    pub async fn record_user_message(
        &self,
        conversation: &Conversation,
        history: &[Message],
    ) -> Result<bool, StoreError> {
        let Some(last) = history.last() else {
            return Ok(false);
        };
        if last.role != Role::User || history.len() <= 1 {
            return Ok(false);
        }
        if conversation.messages.iter().any(|m| m.id == last.id) {
            debug!(message_id = %last.id, "User message already stored");
            return Ok(false);
        }
        let message = Message::new(last.role, last.parts.clone());
        self.store.insert_message(&conversation.id, &message).await?;
        Ok(true)
    }

    /// Store the assistant message a loop produced.
    ///
    /// A continuation replaces the parts of the most recent stored assistant
    /// message; anything else inserts a new one. A loop that produced no
    /// parts (cancelled before generating) writes nothing, so the stored
    /// history stays valid for the next turn.
    pub async fn record_assistant(
        &self,
        conversation: &Conversation,
        state: &LoopState,
    ) -> Result<Persisted, StoreError> {
        if state.parts.is_empty() {
            debug!(conversation_id = %conversation.id, "No assistant parts to store");
            return Ok(Persisted::Skipped);
        }

        if state.is_continuation
            && let Some(stored) = conversation.last_assistant()
        {
            self.store
                .update_message_parts(&conversation.id, &stored.id, &state.parts)
                .await?;
            info!(
                conversation_id = %conversation.id,
                message_id = %stored.id,
                parts = state.parts.len(),
                "Updated continued assistant message"
            );
            return Ok(Persisted::Updated {
                message_id: stored.id.clone(),
            });
        }

        let message = state.assistant_message();
        self.store.insert_message(&conversation.id, &message).await?;
        info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            parts = message.parts.len(),
            "Inserted assistant message"
        );
        Ok(Persisted::Inserted {
            message_id: message.id,
        })
    }

    /// Set the title if none is stored yet. Returns the title when it was set.
    pub async fn record_title(&self, conversation: &Conversation, title: &str) -> Option<String> {
        match self
            .store
            .update_conversation_title(&conversation.id, title)
            .await
        {
            Ok(true) => {
                info!(conversation_id = %conversation.id, title, "Chat title set");
                Some(title.to_string())
            }
            Ok(false) => {
                debug!(conversation_id = %conversation.id, "Chat already has a title");
                None
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Failed to store chat title");
                None
            }
        }
    }
}

/// Whether this turn should produce a title.
pub fn needs_title(conversation: &Conversation, is_continuation: bool) -> bool {
    conversation.title.is_none() && !is_continuation
}
