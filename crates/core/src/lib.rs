//! # RepoLens Core
//!
//! Domain types, traits, and error definitions for the RepoLens agent runtime.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model, tools, storage) is a trait here.
//! Implementations live in their respective crates, and tests plug in
//! scripted stand-ins.

pub mod approval;
pub mod error;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use approval::{ApprovalConfig, ApprovalDecision};
pub use error::{ConfigurationError, Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Conversation, ConversationId, ConversationSummary, Message, Part, Role, ToolOutcome};
pub use provider::{ModelEvent, ModelToolCall, Provider, ProviderRequest, ProviderResponse};
pub use store::ConversationStore;
pub use tool::{Preset, ResolvedTools, Tool, ToolName, ToolRegistry, ToolSelection};
