//! Core domain types for the Arbor agent runtime kernel.
//!
//! Everything that crosses a crate or wire boundary lives here: identifiers,
//! messages and their ordered parts, the canonical JSON tool contract, plan
//! and run types, retry hints, the error taxonomy, hook events, stream wire
//! events, and runtime configuration.

pub mod config;
pub mod error;
pub mod hook;
pub mod ids;
pub mod message;
pub mod plan;
pub mod reminder;
pub mod retry;
pub mod run;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, ErrorKind, Result};
pub use hook::{HookEvent, HookKind};
pub use ids::{AgentId, RunId, SessionId, ToolCallId, ToolId, TurnId};
pub use message::{Message, Part, Role};
pub use plan::{PlanRequest, PlanResult, ThinkingPayload, ToolMetadata};
pub use retry::{RetryHint, RetryReason};
pub use run::{Caps, RunInput, RunOutput, RunPhase, RunPolicy, Usage, WorkflowOptions};
pub use tool::{RequestedCall, ToolInvocation, ToolResult};
