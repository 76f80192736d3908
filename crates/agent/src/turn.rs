//! The turn entrypoint.
//!
//! A [`TurnService`] validates an incoming turn, resolves the caller's tools
//! and step budget, then runs the agent loop in a spawned task. The task
//! streams events to the returned receiver and persists the result whether
//! or not anyone is still listening.

use repolens_config::AppConfig;
use repolens_core::error::{ConfigurationError, ProviderError, StoreError};
use repolens_core::message::{Conversation, ConversationId, Message, Part, Role};
use repolens_core::provider::Provider;
use repolens_core::store::ConversationStore;
use repolens_core::tool::ToolRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::instructions;
use crate::loop_runner::{AgentError, AgentLoop, ExitReason, LoopConfig};
use crate::multiplexer::{DEFAULT_CAPACITY, TurnStream};
use crate::persistence::{PersistenceCoordinator, Persisted, needs_title};
use crate::stream_event::{AgentStreamEvent, ErrorKind};
use crate::title;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Model error: {0}")]
    Model(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Builds the tool catalog for one GitHub credential.
pub trait ToolFactory: Send + Sync {
    fn registry(&self, github_token: Option<&str>) -> Result<ToolRegistry, ConfigurationError>;
}

impl<F> ToolFactory for F
where
    F: Fn(Option<&str>) -> Result<ToolRegistry, ConfigurationError> + Send + Sync,
{
    fn registry(&self, github_token: Option<&str>) -> Result<ToolRegistry, ConfigurationError> {
        self(github_token)
    }
}

/// Who is calling.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: String,
    pub username: Option<String>,
    /// The caller's own GitHub token, if the session carries one.
    pub github_token: Option<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: ConversationId,
    pub caller: Caller,
    pub messages: Vec<Message>,
    /// Falls back to the configured default model.
    pub model: Option<String>,
}

/// Summary of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reason: ExitReason,
    pub steps: u32,
    pub persisted: Persisted,
    pub title: Option<String>,
}

/// A running turn.
pub struct TurnHandle {
    pub events: mpsc::Receiver<AgentStreamEvent>,
    pub task: JoinHandle<Result<TurnOutcome, TurnError>>,
    /// Cancels generation without closing the stream.
    pub stream: TurnStream,
}

pub struct TurnService {
    config: Arc<AppConfig>,
    provider: Arc<dyn Provider>,
    store: Arc<dyn ConversationStore>,
    tools: Arc<dyn ToolFactory>,
}

impl TurnService {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn Provider>,
        store: Arc<dyn ConversationStore>,
        tools: Arc<dyn ToolFactory>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            tools,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Create a conversation holding its first user message.
    pub async fn create_chat(&self, owner_id: &str, text: &str) -> Result<Conversation, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::Validation("message must not be empty".into()));
        }
        Ok(self
            .store
            .create_conversation(owner_id, Message::user(text))
            .await?)
    }

    /// Step budget and effective GitHub token for a caller.
    ///
    /// The caller's own token wins over the configured one. Any token earns
    /// the larger budget; a turn with no token at all gets the smaller one.
    pub fn budget_for(&self, caller: &Caller) -> (u32, Option<String>) {
        let token = caller
            .github_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.config
                    .github
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
            });
        let steps = if token.is_some() {
            self.config.agent.max_steps_authenticated
        } else {
            self.config.agent.max_steps_anonymous
        };
        (steps, token)
    }

    /// Validate and start a turn.
    ///
    /// Errors returned here happen before anything is streamed.
    pub async fn start(&self, request: TurnRequest) -> Result<TurnHandle, TurnError> {
        validate_history(&request.messages)?;

        let conversation = self
            .store
            .find_conversation(&request.conversation_id, &request.caller.user_id)
            .await?
            .ok_or_else(|| TurnError::NotFound(request.conversation_id.to_string()))?;

        let (max_steps, token) = self.budget_for(&request.caller);
        let registry = self.tools.registry(token.as_deref())?;
        let selection = &self.config.tools.selection;
        let allow = selection.allow_list();
        let resolved = registry.resolve(allow.as_deref())?;

        let system = instructions::resolve(
            selection.single_preset(),
            self.config.agent.instructions.as_deref(),
            Some(&instructions::turn_additions(
                self.config.agent.additional_instructions.as_deref(),
                request.caller.username.as_deref(),
            )),
        );
        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.provider.default_model.clone());
        let loop_config =
            LoopConfig::from_config(&self.config, model, max_steps).with_system(system);

        let is_continuation = request
            .messages
            .last()
            .is_some_and(|m| m.role == Role::Assistant);

        let coordinator = PersistenceCoordinator::new(self.store.clone());
        coordinator
            .record_user_message(&conversation, &request.messages)
            .await?;

        info!(
            conversation_id = %conversation.id,
            user_id = %request.caller.user_id,
            tools = resolved.len(),
            max_steps,
            is_continuation,
            "Starting turn"
        );

        let agent = AgentLoop::new(
            self.provider.clone(),
            resolved,
            self.config.tools.require_approval.clone(),
            loop_config,
        );
        let state = agent.start(request.messages, is_continuation);
        let first_user = state
            .history
            .iter()
            .find(|m| m.role == Role::User)
            .cloned();

        let (stream, events) = TurnStream::channel(DEFAULT_CAPACITY);
        let title_job = needs_title(&conversation, is_continuation)
            .then_some(first_user)
            .flatten()
            .map(|first_user| TitleJob {
                provider: self.provider.clone(),
                model: self.config.agent.title_model.clone(),
                first_user,
            });

        let task_stream = stream.clone();
        let task = tokio::spawn(async move {
            run_turn(agent, state, conversation, coordinator, title_job, task_stream).await
        });

        Ok(TurnHandle {
            events,
            task,
            stream,
        })
    }
}

struct TitleJob {
    provider: Arc<dyn Provider>,
    model: String,
    first_user: Message,
}

async fn run_turn(
    agent: AgentLoop,
    state: crate::loop_runner::LoopState,
    conversation: Conversation,
    coordinator: PersistenceCoordinator,
    title_job: Option<TitleJob>,
    stream: TurnStream,
) -> Result<TurnOutcome, TurnError> {
    stream
        .send(AgentStreamEvent::Start {
            message_id: Some(state.message_id.clone()),
        })
        .await;

    let title_task = title_job.map(|job| {
        let coordinator = coordinator.clone();
        let conversation = conversation.clone();
        let stream = stream.clone();
        tokio::spawn(async move {
            stream
                .send(AgentStreamEvent::notice(
                    "chat-title",
                    serde_json::json!({ "message": "Generating title..." }),
                    true,
                ))
                .await;
            let title = title::generate(job.provider.as_ref(), &job.model, &job.first_user).await;
            let stored = coordinator.record_title(&conversation, &title).await;
            if let Some(title) = &stored {
                stream
                    .send(AgentStreamEvent::notice(
                        "chat-title",
                        serde_json::json!({ "title": title }),
                        false,
                    ))
                    .await;
            }
            stored
        })
    });

    let result = agent.run(state, &stream).await;

    // The title never blocks or fails the turn.
    let title = match title_task {
        Some(task) => task.await.unwrap_or_else(|e| {
            warn!(error = %e, "Title task panicked");
            None
        }),
        None => None,
    };

    let exit = match result {
        Ok(exit) => exit,
        Err(e) => {
            warn!(conversation_id = %conversation.id, error = %e, "Turn failed");
            stream
                .send(AgentStreamEvent::Error {
                    kind: ErrorKind::Model,
                    message: e.to_string(),
                })
                .await;
            return Err(match e {
                AgentError::Model(e) => TurnError::Model(e),
                AgentError::NoPendingApproval(id) => {
                    TurnError::Validation(format!("no pending approval for call '{id}'"))
                }
            });
        }
    };

    let persisted = match coordinator.record_assistant(&conversation, &exit.state).await {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to persist turn");
            stream
                .send(AgentStreamEvent::Error {
                    kind: ErrorKind::Persistence,
                    message: e.to_string(),
                })
                .await;
            return Err(TurnError::Persistence(e));
        }
    };

    stream
        .send(AgentStreamEvent::Finish {
            reason: exit.reason,
            steps: exit.state.steps,
        })
        .await;

    Ok(TurnOutcome {
        reason: exit.reason,
        steps: exit.state.steps,
        persisted,
        title,
    })
}

/// Reject histories the loop cannot run on.
pub fn validate_history(messages: &[Message]) -> Result<(), TurnError> {
    if messages.is_empty() {
        return Err(TurnError::Validation("messages must not be empty".into()));
    }
    for message in messages {
        if message.role == Role::Tool {
            return Err(TurnError::Validation(
                "tool messages cannot be supplied by the client".into(),
            ));
        }
        if message.parts.is_empty() {
            return Err(TurnError::Validation(format!(
                "message '{}' has no parts",
                message.id
            )));
        }

        let calls: HashSet<&str> = message
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        for part in &message.parts {
            if let Part::ApprovalResponse { call_id, .. } = part
                && !calls.contains(call_id.as_str())
            {
                return Err(TurnError::Validation(format!(
                    "approval response for unknown call '{call_id}'"
                )));
            }
        }
    }
    Ok(())
}
