//! Arbor runtime kernel.
//!
//! The deterministic plan/execute/resume loop for durable, tool-using
//! agents: hook bus with ordered fan-out, stream translation, policy and
//! caps enforcement, reminder injection, deterministic tool-call ids,
//! interrupt handling, and inline agent-as-tool composition, all running
//! over a pluggable workflow engine.

pub mod agent_tool;
pub mod agents;
pub mod children;
pub mod hooks;
pub mod ids;
pub mod planner;
pub mod policy;
pub mod reminders;
mod runloop;
pub mod runtime;
pub mod sequencer;
pub mod stream;
pub mod subscribers;

pub use agent_tool::{agent_toolset_registration, AgentToolDef};
pub use agents::AgentRegistration;
pub use children::ChildTracker;
pub use hooks::{HookBus, HookSubscriber, Subscription};
pub use planner::{
    CompletionRequest, CompletionResponse, ModelChunk, ModelClient, ModelStream, Planner,
    ScriptedPlanner,
};
pub use policy::{AllowlistPolicy, PolicyDecision, PolicyEngine, PolicyInput, RunContext};
pub use reminders::ReminderEngine;
pub use runtime::{Runtime, RuntimeBuilder};
pub use sequencer::TurnSequencer;
pub use stream::{ChannelSink, CollectorSink, Sink, StreamProfile, StreamSubscriber};
pub use subscribers::{MemorySubscriber, RunLogSubscriber};
