//! `repolens chat`: Interactive or single-message chat mode.
//!
//! Turns run in-process against the configured store. When a turn stops to
//! ask for approval, the user answers y/n here and the turn is continued.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use repolens_agent::{AgentStreamEvent, Caller, ErrorKind, ExitReason, TurnHandle, TurnRequest};
use repolens_config::AppConfig;
use repolens_core::message::{ConversationId, Message, Part, Role, ToolOutcome};
use repolens_gateway::GatewayState;

pub const MISSING_KEY: &str = "No model API key found. Set REPOLENS_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY, or add provider.api_key to the config file.";

const LOCAL_USER: &str = "local";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub async fn run(message: Option<String>, model: Option<String>) -> CliResult<()> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: {MISSING_KEY}");
        eprintln!(
            "  Config file: {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    // Turns fall back to the configured GitHub token.
    let caller = Caller {
        user_id: LOCAL_USER.to_string(),
        username: std::env::var("USER").ok().filter(|u| !u.is_empty()),
        github_token: None,
    };
    let model_name = model
        .clone()
        .unwrap_or_else(|| config.provider.default_model.clone());
    let authenticated = config.github.token.is_some();

    let provider = repolens_providers::build_from_config(&config.provider)?;
    let store = repolens_gateway::open_store(&config.store).await?;
    let tools = repolens_gateway::github_tool_factory(config.github.api_url.clone());
    let state = GatewayState::new(config, provider, store, tools)?;

    let mut session = ChatSession {
        state,
        caller,
        model,
        conversation_id: None,
        input: BufReader::new(tokio::io::stdin()).lines(),
    };

    if let Some(msg) = message {
        return session.send(&msg).await;
    }

    println!();
    println!("  RepoLens: Interactive Mode");
    println!();
    println!("  Model:   {model_name}");
    println!(
        "  GitHub:  {}",
        if authenticated {
            "authenticated"
        } else {
            "unauthenticated"
        }
    );
    println!("  Tools:   {}", session.state.catalog.definitions().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/new' for a fresh chat, 'exit' or Ctrl+C to quit.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = session.input.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/new" => {
                session.conversation_id = None;
                println!("  Started a new chat.");
                continue;
            }
            _ => {}
        }

        if let Err(e) = session.send(line).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

struct ChatSession {
    state: GatewayState,
    caller: Caller,
    model: Option<String>,
    conversation_id: Option<ConversationId>,
    input: Lines<BufReader<Stdin>>,
}

impl ChatSession {
    /// Send one user message and run turns until no approval is pending.
    async fn send(&mut self, text: &str) -> CliResult<()> {
        let (id, mut history) = match self.conversation_id.clone() {
            None => {
                let conversation = self.state.turns.create_chat(&self.caller.user_id, text).await?;
                self.conversation_id = Some(conversation.id.clone());
                (conversation.id, conversation.messages)
            }
            Some(id) => {
                let mut messages = self.load(&id).await?;
                messages.push(Message::user(text));
                (id, messages)
            }
        };

        loop {
            if self.run_turn(&id, history).await? != ExitReason::AwaitingApproval {
                return Ok(());
            }

            let mut messages = self.load(&id).await?;
            let Some(last) = messages
                .last_mut()
                .filter(|m| m.role == Role::Assistant)
            else {
                return Ok(());
            };
            for (call_id, tool_name, input) in unanswered_approvals(last) {
                let approved = self.ask(&tool_name, &input).await?;
                last.parts.push(Part::ApprovalResponse {
                    call_id,
                    approved,
                    reason: None,
                });
            }
            history = messages;
        }
    }

    async fn load(&self, id: &ConversationId) -> CliResult<Vec<Message>> {
        let conversation = self
            .state
            .turns
            .store()
            .find_conversation(id, &self.caller.user_id)
            .await?
            .ok_or_else(|| format!("chat {id} not found"))?;
        Ok(conversation.messages)
    }

    async fn run_turn(&self, id: &ConversationId, messages: Vec<Message>) -> CliResult<ExitReason> {
        let TurnHandle {
            mut events, task, ..
        } = self
            .state
            .turns
            .start(TurnRequest {
                conversation_id: id.clone(),
                caller: self.caller.clone(),
                messages,
                model: self.model.clone(),
            })
            .await?;

        let mut stdout = std::io::stdout();
        while let Some(event) = events.recv().await {
            if let Some(text) = render(&event) {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
        }

        let outcome = task.await??;
        Ok(outcome.reason)
    }

    async fn ask(&mut self, tool_name: &str, input: &serde_json::Value) -> CliResult<bool> {
        print!("  Allow {tool_name} with {input}? [y/N] ");
        std::io::stdout().flush()?;
        let answer = self.input.next_line().await?.unwrap_or_default();
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Approval requests in `message` that have no response yet.
fn unanswered_approvals(message: &Message) -> Vec<(String, String, serde_json::Value)> {
    let answered = |id: &str| {
        message
            .parts
            .iter()
            .any(|p| matches!(p, Part::ApprovalResponse { call_id, .. } if call_id == id))
    };
    message
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::ApprovalRequest { call_id } if !answered(call_id) => Some(call_id),
            _ => None,
        })
        .filter_map(|id| {
            message.parts.iter().find_map(|p| match p {
                Part::ToolCall {
                    call_id,
                    tool_name,
                    input,
                } if call_id == id => Some((call_id.clone(), tool_name.clone(), input.clone())),
                _ => None,
            })
        })
        .collect()
}

/// Terminal text for one event, if it shows anything.
fn render(event: &AgentStreamEvent) -> Option<String> {
    match event {
        AgentStreamEvent::TextDelta { delta } => Some(delta.clone()),
        AgentStreamEvent::ToolCall {
            tool_name, input, ..
        } => Some(format!("\n  [tool] {tool_name} {input}\n")),
        AgentStreamEvent::ToolApprovalRequest { tool_name, .. } => {
            Some(format!("  [approval needed] {tool_name}\n"))
        }
        AgentStreamEvent::ToolResult {
            tool_name, outcome, ..
        } => Some(match outcome {
            ToolOutcome::Success { .. } => format!("  [ok] {tool_name}\n"),
            ToolOutcome::Failure { error } => format!("  [failed] {tool_name}: {error}\n"),
            ToolOutcome::Denied { .. } => format!("  [denied] {tool_name}\n"),
        }),
        AgentStreamEvent::Notice {
            kind,
            data,
            transient: false,
        } if kind == "chat-title" => data
            .get("title")
            .and_then(|t| t.as_str())
            .map(|title| format!("\n  [title] {title}")),
        AgentStreamEvent::Finish {
            reason: ExitReason::BudgetExhausted,
            steps,
        } => Some(format!("\n  [stopped after {steps} steps]\n")),
        AgentStreamEvent::Finish { .. } => Some("\n".to_string()),
        AgentStreamEvent::Error { kind, message } => {
            let kind = match kind {
                ErrorKind::Model => "model",
                ErrorKind::Persistence => "persistence",
                ErrorKind::Validation => "validation",
            };
            Some(format!("\n  [error: {kind}] {message}\n"))
        }
        _ => None,
    }
}
