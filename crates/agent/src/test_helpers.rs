//! Shared test helpers: scripted providers, recording tools, in-memory stores.

use async_trait::async_trait;
use repolens_core::error::{ProviderError, StoreError, ToolError};
use repolens_core::message::{Conversation, ConversationId, ConversationSummary, Message, Part};
use repolens_core::provider::{
    ModelEvent, ModelStream, ModelToolCall, Provider, ProviderRequest, ProviderResponse, Usage,
};
use repolens_core::store::ConversationStore;
use repolens_core::tool::{ResolvedTools, Tool, ToolName, ToolRegistry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::stream_event::AgentStreamEvent;

/// A provider that replays one scripted segment per `stream` call.
///
/// Panics if more segments are requested than were scripted.
pub struct ScriptedProvider {
    segments: Mutex<Vec<Vec<ModelEvent>>>,
    calls: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
    mode: Mode,
    title: Result<String, ProviderError>,
    // Keeps stalled streams open.
    held: Mutex<Vec<mpsc::Sender<Result<ModelEvent, ProviderError>>>>,
}

enum Mode {
    Scripted,
    Failing,
    Stalled,
}

impl ScriptedProvider {
    pub fn new(segments: Vec<Vec<ModelEvent>>) -> Self {
        Self::with_mode(segments, Mode::Scripted)
    }

    /// Every stream call fails.
    pub fn failing() -> Self {
        Self::with_mode(vec![], Mode::Failing)
    }

    /// Every stream stays open without producing anything.
    pub fn stalled() -> Self {
        Self::with_mode(vec![], Mode::Stalled)
    }

    fn with_mode(segments: Vec<Vec<ModelEvent>>, mode: Mode) -> Self {
        Self {
            segments: Mutex::new(segments),
            calls: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
            mode,
            title: Ok("Scripted Title".into()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Set what `complete` (title generation) returns.
    pub fn with_title(mut self, title: Result<String, ProviderError>) -> Self {
        self.title = title;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.title.clone().map(|text| ProviderResponse {
            text,
            tool_calls: vec![],
            usage: None,
            model: "mock-title-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ModelStream, ProviderError> {
        match self.mode {
            Mode::Failing => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "scripted failure".into(),
                });
            }
            Mode::Stalled => {
                let (tx, rx) = mpsc::channel(1);
                self.held.lock().unwrap().push(tx);
                return Ok(rx);
            }
            Mode::Scripted => {}
        }

        let segment = {
            let mut calls = self.calls.lock().unwrap();
            let segments = self.segments.lock().unwrap();
            let segment = segments.get(*calls).cloned().unwrap_or_else(|| {
                panic!(
                    "ScriptedProvider: no more segments (call #{}, have {})",
                    *calls,
                    segments.len()
                )
            });
            *calls += 1;
            segment
        };
        self.requests.lock().unwrap().push(request);

        let (tx, rx) = mpsc::channel(segment.len().max(1));
        for event in segment {
            let _ = tx.try_send(Ok(event));
        }
        Ok(rx)
    }
}

fn finish() -> ModelEvent {
    ModelEvent::Finish {
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

/// A segment that answers with text only.
pub fn text_segment(text: &str) -> Vec<ModelEvent> {
    vec![ModelEvent::TextDelta(text.to_string()), finish()]
}

/// A segment that requests the given tool calls.
pub fn tool_segment(calls: Vec<ModelToolCall>) -> Vec<ModelEvent> {
    calls
        .into_iter()
        .map(ModelEvent::ToolCall)
        .chain(std::iter::once(finish()))
        .collect()
}

pub fn call(id: &str, name: &str, args: serde_json::Value) -> ModelToolCall {
    ModelToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// Collect every event left in a closed stream.
pub async fn drain(mut rx: mpsc::Receiver<AgentStreamEvent>) -> Vec<AgentStreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// A full catalog of tools that record their invocations.
pub struct RecordingTools {
    registry: ToolRegistry,
    invoked: Arc<Mutex<Vec<ToolName>>>,
}

struct RecordingTool {
    name: ToolName,
    fail: bool,
    delay: Option<Duration>,
    invoked: Arc<Mutex<Vec<ToolName>>>,
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> ToolName {
        self.name
    }

    fn description(&self) -> &str {
        "Records its invocation"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        self.invoked.lock().unwrap().push(self.name);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ToolError::Upstream {
                status: 404,
                message: "Not Found".into(),
            });
        }
        Ok(serde_json::json!({ "tool": self.name.as_str(), "arguments": arguments }))
    }
}

impl RecordingTools {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Like `new`, but `failing` returns an upstream error.
    pub fn failing(failing: ToolName) -> Self {
        Self::build(Some(failing), None)
    }

    /// Like `new`, but `slow` sleeps for `delay` before answering.
    pub fn slow(slow: ToolName, delay: Duration) -> Self {
        Self::build(None, Some((slow, delay)))
    }

    fn build(failing: Option<ToolName>, slow: Option<(ToolName, Duration)>) -> Self {
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<Arc<dyn Tool>> = ToolName::ALL
            .into_iter()
            .map(|name| {
                Arc::new(RecordingTool {
                    name,
                    fail: failing == Some(name),
                    delay: slow.filter(|(slow, _)| *slow == name).map(|(_, delay)| delay),
                    invoked: invoked.clone(),
                }) as Arc<dyn Tool>
            })
            .collect();
        Self {
            registry: ToolRegistry::new(handlers).unwrap(),
            invoked,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolve(&self, allow: Option<&[String]>) -> ResolvedTools {
        self.registry.resolve(allow).unwrap()
    }

    pub fn invoked(&self) -> Vec<ToolName> {
        self.invoked.lock().unwrap().clone()
    }
}

/// A store whose writes can be made to fail.
pub struct FlakyStore {
    inner: repolens_store::InMemoryStore,
    pub fail_messages: bool,
    pub fail_title: bool,
}

impl FlakyStore {
    pub fn new(inner: repolens_store::InMemoryStore) -> Self {
        Self {
            inner,
            fail_messages: false,
            fail_title: false,
        }
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_conversation(&self, owner_id: &str, first_message: Message) -> Result<Conversation, StoreError> {
        self.inner.create_conversation(owner_id, first_message).await
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
        owner_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        self.inner.find_conversation(id, owner_id).await
    }

    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        self.inner.list_conversations(owner_id).await
    }

    async fn insert_message(&self, conversation_id: &ConversationId, message: &Message) -> Result<(), StoreError> {
        if self.fail_messages {
            return Err(StoreError::QueryFailed("disk full".into()));
        }
        self.inner.insert_message(conversation_id, message).await
    }

    async fn update_message_parts(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        parts: &[Part],
    ) -> Result<(), StoreError> {
        if self.fail_messages {
            return Err(StoreError::QueryFailed("disk full".into()));
        }
        self.inner
            .update_message_parts(conversation_id, message_id, parts)
            .await
    }

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError> {
        if self.fail_title {
            return Err(StoreError::QueryFailed("title column locked".into()));
        }
        self.inner.update_conversation_title(conversation_id, title).await
    }
}
