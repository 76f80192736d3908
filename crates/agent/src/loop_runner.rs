//! The agent step loop.
//!
//! One step is one generation segment plus the tool executions it triggers.
//! The loop alternates between generating and executing until the model
//! answers without tool calls, the step budget runs out, a call needs the
//! user's approval, or the consumer disconnects.
//!
//! All loop progress lives in the parts of the assistant message being
//! built, so a suspended [`LoopState`] can be stored and picked up later:
//! a pending call is a `tool-call` part followed by an `approval-request`
//! part with no `tool-result`.

use repolens_config::AppConfig;
use repolens_core::approval::{ApprovalConfig, ApprovalDecision};
use repolens_core::error::{ProviderError, ToolError};
use repolens_core::message::{Message, Part, Role, ToolOutcome};
use repolens_core::provider::{ModelEvent, Provider, ProviderRequest};
use repolens_core::tool::{ResolvedTools, Tool, ToolName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::multiplexer::TurnStream;
use crate::stream_event::AgentStreamEvent;

/// Per-invocation loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_steps: u32,
    pub model_idle_timeout: Duration,
    pub tool_timeout: Duration,
    pub send_reasoning: bool,
}

impl LoopConfig {
    pub fn new(model: impl Into<String>, max_steps: u32) -> Self {
        Self {
            model: model.into(),
            system: None,
            temperature: repolens_core::provider::default_temperature(),
            max_tokens: None,
            max_steps,
            model_idle_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(60),
            send_reasoning: true,
        }
    }

    /// Settings for one turn, taking timeouts and sampling from `config`.
    pub fn from_config(config: &AppConfig, model: impl Into<String>, max_steps: u32) -> Self {
        Self {
            model: model.into(),
            system: None,
            temperature: config.provider.temperature,
            max_tokens: config.provider.max_tokens,
            max_steps,
            model_idle_timeout: Duration::from_secs(config.agent.model_idle_timeout_secs),
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
            send_reasoning: config.agent.send_reasoning,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Why the loop stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    /// The model answered without requesting tools.
    Done,
    /// The step budget ran out.
    BudgetExhausted,
    /// A tool call is waiting for the user's decision.
    AwaitingApproval,
    /// The consumer went away; generation stopped early.
    Cancelled,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Done => "done",
            ExitReason::BudgetExhausted => "budget-exhausted",
            ExitReason::AwaitingApproval => "awaiting-approval",
            ExitReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(#[from] ProviderError),

    #[error("No pending approval request for call '{0}'")]
    NoPendingApproval(String),
}

/// Transient state of one loop invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Messages before the assistant message being built.
    pub history: Vec<Message>,
    /// Id of the assistant message being built.
    pub message_id: String,
    /// Parts generated so far, in emission order.
    pub parts: Vec<Part>,
    pub steps: u32,
    pub max_steps: u32,
    pub is_continuation: bool,
}

impl LoopState {
    /// The assistant message as it stands.
    pub fn assistant_message(&self) -> Message {
        let mut message = Message::assistant(self.parts.clone());
        message.id = self.message_id.clone();
        message
    }

    /// Record the user's decision for a suspended call.
    pub fn apply_decision(
        &mut self,
        call_id: &str,
        approved: bool,
        reason: Option<String>,
    ) -> Result<(), AgentError> {
        if !self.pending_approvals().contains(&call_id) {
            return Err(AgentError::NoPendingApproval(call_id.to_string()));
        }
        self.parts.push(Part::ApprovalResponse {
            call_id: call_id.to_string(),
            approved,
            reason,
        });
        Ok(())
    }

    /// Calls with an approval request but no response or result yet.
    pub fn pending_approvals(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ApprovalRequest { call_id } if !self.is_answered(call_id) => {
                    Some(call_id.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Outcomes recorded so far, in the order they were appended.
    pub fn outcomes(&self) -> Vec<(&str, &ToolOutcome)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult {
                    call_id, outcome, ..
                } => Some((call_id.as_str(), outcome)),
                _ => None,
            })
            .collect()
    }

    fn is_answered(&self, call_id: &str) -> bool {
        self.parts.iter().any(|p| match p {
            Part::ApprovalResponse { call_id: id, .. } | Part::ToolResult { call_id: id, .. } => {
                id == call_id
            }
            _ => false,
        })
    }

    fn has_result(&self, call_id: &str) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolResult { call_id: id, .. } if id == call_id))
    }

    fn has_approval_request(&self, call_id: &str) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ApprovalRequest { call_id: id } if id == call_id))
    }

    fn approval_response(&self, call_id: &str) -> Option<(bool, Option<String>)> {
        self.parts.iter().find_map(|p| match p {
            Part::ApprovalResponse {
                call_id: id,
                approved,
                reason,
            } if id == call_id => Some((*approved, reason.clone())),
            _ => None,
        })
    }

    /// Tool calls of the latest segment that have no outcome yet.
    fn unresolved_calls(&self) -> Vec<(String, String, serde_json::Value)> {
        let segment_start = self
            .parts
            .iter()
            .rposition(|p| matches!(p, Part::StepStart))
            .unwrap_or(0);
        self.parts[segment_start..]
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall {
                    call_id,
                    tool_name,
                    input,
                } if !self.has_result(call_id) => {
                    Some((call_id.clone(), tool_name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Identities of calls denied earlier in this turn.
    fn denied_signatures(&self) -> BTreeSet<String> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult {
                    call_id,
                    outcome: ToolOutcome::Denied { .. },
                    ..
                } => self.parts.iter().find_map(|c| match c {
                    Part::ToolCall {
                        call_id: id,
                        tool_name,
                        input,
                    } if id == call_id => Some(call_signature(tool_name, input)),
                    _ => None,
                }),
                _ => None,
            })
            .collect()
    }
}

/// Tool name plus canonical JSON arguments (object keys are sorted).
fn call_signature(tool_name: &str, input: &serde_json::Value) -> String {
    format!("{tool_name}:{input}")
}

/// How a loop invocation ended.
#[derive(Debug, Clone)]
pub struct LoopExit {
    pub state: LoopState,
    pub reason: ExitReason,
}

enum Pending {
    Clear,
    Suspended,
}

enum Segment {
    Finished { tool_calls: usize },
    Cancelled,
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: ResolvedTools,
    approval: ApprovalConfig,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ResolvedTools,
        approval: ApprovalConfig,
        config: LoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            approval,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Set up a fresh invocation.
    ///
    /// For a continuation the trailing assistant message is taken out of
    /// the history and its parts become the starting point.
    pub fn start(&self, mut history: Vec<Message>, is_continuation: bool) -> LoopState {
        let tail = if is_continuation && history.last().is_some_and(|m| m.role == Role::Assistant)
        {
            history.pop()
        } else {
            None
        };
        let is_continuation = tail.is_some();
        let (message_id, parts) = match tail {
            Some(message) => (message.id, message.parts),
            None => (uuid::Uuid::new_v4().to_string(), Vec::new()),
        };

        LoopState {
            history,
            message_id,
            parts,
            steps: 0,
            max_steps: self.config.max_steps,
            is_continuation,
        }
    }

    /// Drive the loop until it stops.
    ///
    /// `Err` means the model failed; the turn is then not persisted.
    pub async fn run(&self, mut state: LoopState, stream: &TurnStream) -> Result<LoopExit, AgentError> {
        let mut answered = false;

        loop {
            if let Pending::Suspended = self.process_pending(&mut state, stream).await {
                return Ok(exit(state, ExitReason::AwaitingApproval));
            }
            if answered {
                return Ok(exit(state, ExitReason::Done));
            }
            if stream.cancellation().is_cancelled() {
                return Ok(exit(state, ExitReason::Cancelled));
            }
            if state.steps >= state.max_steps {
                warn!(
                    steps = state.steps,
                    max_steps = state.max_steps,
                    "Step budget exhausted"
                );
                return Ok(exit(state, ExitReason::BudgetExhausted));
            }

            match self.generate(&mut state, stream).await? {
                Segment::Cancelled => return Ok(exit(state, ExitReason::Cancelled)),
                Segment::Finished { tool_calls } => answered = tool_calls == 0,
            }
        }
    }

    /// Run, approve, or deny each unresolved call of the latest segment, in order.
    async fn process_pending(&self, state: &mut LoopState, stream: &TurnStream) -> Pending {
        for (call_id, tool_name, input) in state.unresolved_calls() {
            let outcome = match self.tools.get(&tool_name) {
                None => {
                    warn!(tool = %tool_name, call_id = %call_id, "Model called an unavailable tool");
                    ToolOutcome::Failure {
                        error: ToolError::NotAvailable(tool_name.clone()).to_string(),
                    }
                }
                Some((name, tool)) => {
                    let response = state.approval_response(&call_id);
                    let mut decision = self
                        .approval
                        .decide(name, response.as_ref().map(|(a, r)| (*a, r.as_deref())));

                    if decision == ApprovalDecision::Pending
                        && state
                            .denied_signatures()
                            .contains(&call_signature(&tool_name, &input))
                    {
                        debug!(tool = %tool_name, call_id = %call_id, "Repeat of a denied call");
                        decision = ApprovalDecision::Denied {
                            reason: Some("An identical call was already denied in this turn".into()),
                        };
                    }

                    match decision {
                        ApprovalDecision::Pending => {
                            if !state.has_approval_request(&call_id) {
                                info!(tool = %tool_name, call_id = %call_id, "Awaiting approval");
                                state.parts.push(Part::ApprovalRequest {
                                    call_id: call_id.clone(),
                                });
                                stream
                                    .send(AgentStreamEvent::ToolApprovalRequest {
                                        call_id,
                                        tool_name,
                                        input,
                                    })
                                    .await;
                            }
                            return Pending::Suspended;
                        }
                        ApprovalDecision::Denied { reason } => {
                            info!(tool = %tool_name, call_id = %call_id, "Tool call denied");
                            ToolOutcome::Denied { reason }
                        }
                        ApprovalDecision::AutoApproved | ApprovalDecision::Approved => {
                            self.execute(name, tool.as_ref(), &call_id, input).await
                        }
                    }
                }
            };

            state.parts.push(Part::ToolResult {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                outcome: outcome.clone(),
            });
            stream
                .send(AgentStreamEvent::ToolResult {
                    call_id,
                    tool_name,
                    outcome,
                })
                .await;
        }
        Pending::Clear
    }

    async fn execute(
        &self,
        name: ToolName,
        tool: &dyn Tool,
        call_id: &str,
        input: serde_json::Value,
    ) -> ToolOutcome {
        if !input.is_object() {
            return ToolOutcome::Failure {
                error: ToolError::InvalidArguments(format!(
                    "{name}: arguments must be a JSON object"
                ))
                .to_string(),
            };
        }

        let start = std::time::Instant::now();
        let result = tokio::time::timeout(self.config.tool_timeout, tool.execute(input)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                info!(tool = %name, call_id, duration_ms, "Tool executed");
                ToolOutcome::Success { output }
            }
            Ok(Err(e)) => {
                warn!(tool = %name, call_id, error = %e, "Tool execution failed");
                ToolOutcome::Failure {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                let e = ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: self.config.tool_timeout.as_secs(),
                };
                warn!(tool = %name, call_id, "Tool execution timed out");
                ToolOutcome::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    fn request_for(&self, state: &LoopState) -> ProviderRequest {
        let mut messages = state.history.clone();
        if !state.parts.is_empty() {
            messages.push(state.assistant_message());
        }
        ProviderRequest {
            model: self.config.model.clone(),
            system: self.config.system.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: self.tools.definitions(),
        }
    }

    /// Generate one segment, streaming its deltas as they arrive.
    async fn generate(&self, state: &mut LoopState, stream: &TurnStream) -> Result<Segment, AgentError> {
        state.steps += 1;
        let step = state.steps;
        debug!(step, max_steps = state.max_steps, "Generating segment");

        let request = self.request_for(state);
        state.parts.push(Part::StepStart);
        stream.send(AgentStreamEvent::StepStart { step }).await;

        let cancel = stream.cancellation().clone();
        if cancel.is_cancelled() {
            return Ok(Segment::Cancelled);
        }
        let mut rx = self.provider.stream(request).await?;
        let mut text_slot = None;
        let mut reasoning_slot = None;
        let mut tool_calls = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(step, "Generation cancelled");
                    return Ok(Segment::Cancelled);
                }
                next = tokio::time::timeout(self.config.model_idle_timeout, rx.recv()) => next,
            };

            let event = match next {
                Err(_) => {
                    return Err(AgentError::Model(ProviderError::Timeout(format!(
                        "no model output for {}s",
                        self.config.model_idle_timeout.as_secs()
                    ))));
                }
                Ok(None) => break,
                Ok(Some(event)) => event?,
            };

            match event {
                ModelEvent::TextDelta(delta) => {
                    append_delta(&mut state.parts, &mut text_slot, &delta, false);
                    stream.send(AgentStreamEvent::TextDelta { delta }).await;
                }
                ModelEvent::ReasoningDelta(delta) => {
                    append_delta(&mut state.parts, &mut reasoning_slot, &delta, true);
                    if self.config.send_reasoning {
                        stream.send(AgentStreamEvent::ReasoningDelta { delta }).await;
                    }
                }
                ModelEvent::ToolCall(call) => {
                    tool_calls += 1;
                    // Unparseable arguments are kept as a raw string and fail at execution.
                    let input = serde_json::from_str(&call.arguments)
                        .unwrap_or(serde_json::Value::String(call.arguments));
                    debug!(tool = %call.name, call_id = %call.id, "Tool call requested");
                    state.parts.push(Part::ToolCall {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        input: input.clone(),
                    });
                    stream
                        .send(AgentStreamEvent::ToolCall {
                            call_id: call.id,
                            tool_name: call.name,
                            input,
                        })
                        .await;
                }
                ModelEvent::Finish { usage } => {
                    if let Some(usage) = usage {
                        debug!(step, total_tokens = usage.total_tokens, "Segment finished");
                    }
                    break;
                }
            }
        }

        Ok(Segment::Finished { tool_calls })
    }
}

fn exit(state: LoopState, reason: ExitReason) -> LoopExit {
    info!(
        message_id = %state.message_id,
        steps = state.steps,
        reason = %reason,
        "Agent loop stopped"
    );
    LoopExit { state, reason }
}

/// Append to this segment's text (or reasoning) part, creating it on first use.
fn append_delta(parts: &mut Vec<Part>, slot: &mut Option<usize>, delta: &str, reasoning: bool) {
    if let Some(index) = *slot
        && let Some(Part::Text { text } | Part::Reasoning { text }) = parts.get_mut(index)
    {
        text.push_str(delta);
        return;
    }
    *slot = Some(parts.len());
    parts.push(if reasoning {
        Part::Reasoning {
            text: delta.to_string(),
        }
    } else {
        Part::text(delta)
    });
}
