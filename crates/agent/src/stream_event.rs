//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what a turn emits while it runs. The gateway forwards
//! these over SSE, using [`AgentStreamEvent::event_type`] as the event name.

use repolens_core::message::ToolOutcome;
use serde::{Deserialize, Serialize};

use crate::loop_runner::ExitReason;

/// Events emitted during a turn, in emission order.
///
/// `finish` and `error` are terminal: nothing follows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentStreamEvent {
    /// The turn has started producing an assistant message.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A new generation segment has started.
    StepStart { step: u32 },

    /// Partial text token from the model.
    TextDelta { delta: String },

    /// Partial reasoning token from the model.
    ReasoningDelta { delta: String },

    /// The model requested a tool call.
    ToolCall {
        call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },

    /// A tool call is waiting for the user's decision.
    ToolApprovalRequest {
        call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },

    /// A tool call finished (or was denied).
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },

    /// Out-of-band data, e.g. a generated chat title.
    Notice {
        kind: String,
        data: serde_json::Value,
        #[serde(default)]
        transient: bool,
    },

    /// The turn ended and was persisted.
    Finish { reason: ExitReason, steps: u32 },

    /// The turn failed.
    Error { kind: ErrorKind, message: String },
}

/// Which stage of a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Model,
    Persistence,
    Validation,
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::StepStart { .. } => "step-start",
            Self::TextDelta { .. } => "text-delta",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolApprovalRequest { .. } => "tool-approval-request",
            Self::ToolResult { .. } => "tool-result",
            Self::Notice { .. } => "notice",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }

    pub fn notice(kind: &str, data: serde_json::Value, transient: bool) -> Self {
        Self::Notice {
            kind: kind.to_string(),
            data,
            transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_text_delta() {
        let event = AgentStreamEvent::TextDelta {
            delta: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text-delta""#));
        assert!(json.contains(r#""delta":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_result() {
        let event = AgentStreamEvent::ToolResult {
            call_id: "call_1".into(),
            tool_name: "createIssue".into(),
            outcome: ToolOutcome::Denied { reason: None },
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool-result");
        assert_eq!(json["outcome"]["status"], "denied");
    }

    #[test]
    fn event_serialization_finish() {
        let event = AgentStreamEvent::Finish {
            reason: ExitReason::BudgetExhausted,
            steps: 5,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["reason"], "budget-exhausted");
        assert_eq!(json["steps"], 5);
    }

    #[test]
    fn error_kind_is_lowercase() {
        let event = AgentStreamEvent::Error {
            kind: ErrorKind::Persistence,
            message: "disk full".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "persistence");
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let events = vec![
            AgentStreamEvent::Start { message_id: None },
            AgentStreamEvent::StepStart { step: 1 },
            AgentStreamEvent::ReasoningDelta { delta: "x".into() },
            AgentStreamEvent::ToolApprovalRequest {
                call_id: "a".into(),
                tool_name: "b".into(),
                input: serde_json::Value::Null,
            },
            AgentStreamEvent::notice("chat-title", serde_json::json!({}), true),
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn terminal_events() {
        assert!(
            AgentStreamEvent::Finish {
                reason: ExitReason::Done,
                steps: 1
            }
            .is_terminal()
        );
        assert!(!AgentStreamEvent::StepStart { step: 1 }.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"text-delta","delta":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::TextDelta { delta } => assert_eq!(delta, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
