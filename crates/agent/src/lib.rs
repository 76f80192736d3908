//! The agent runtime behind a chat turn.
//!
//! A turn moves through a bounded loop:
//!
//! 1. **Validate** the client's history and resolve the caller's tools
//! 2. **Stream** a model segment, collecting text and tool calls
//! 3. **Gate** each tool call through the approval policy; a call that needs
//!    a human suspends the turn until the client answers it
//! 4. **Execute** approved calls and record their outcomes in request order
//! 5. **Repeat** until the model answers without tools or the step budget runs out
//!
//! Every event is forwarded in order to one [`TurnStream`], and the result is
//! persisted whether or not the client is still listening.

pub mod instructions;
pub mod loop_runner;
pub mod multiplexer;
pub mod persistence;
pub mod stream_event;
pub mod title;
pub mod turn;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentError, AgentLoop, ExitReason, LoopConfig, LoopExit, LoopState};
pub use multiplexer::TurnStream;
pub use persistence::{PersistenceCoordinator, Persisted};
pub use stream_event::{AgentStreamEvent, ErrorKind};
pub use turn::{Caller, ToolFactory, TurnError, TurnHandle, TurnOutcome, TurnRequest, TurnService};
