//! Pluggable workflow engine for the Arbor runtime kernel.
//!
//! The kernel consumes the narrow capability interfaces in this crate
//! (`WorkflowEngine`, `WorkflowCtx`, `WorkflowHandle`, activity traits) and
//! ships with [`InMemoryEngine`], a reference scheduler that implements the
//! full contract in-process. Durable adapters (Temporal-class engines)
//! implement the same traits out of tree.

pub mod context;
pub mod engine;
pub mod future;
pub mod inmem;
pub mod options;
pub mod signals;

pub use context::{
    ActivityContext, HookActivity, PlannerActivity, QueryHandler, ToolActivity, WorkflowCtx,
    WorkflowHandler,
};
pub use engine::{WorkflowEngine, WorkflowHandle};
pub use future::ActivityFuture;
pub use inmem::InMemoryEngine;
pub use options::{ActivityOptions, RetryPolicy, StartWorkflowRequest, WorkflowDefinition};
pub use signals::{
    ClarificationAnswer, ConfirmationDecision, PauseRequest, ResumeRequest, SignalChannel,
    SignalChannels, SignalSenders, ToolResultsSet, SIGNAL_CLARIFICATION, SIGNAL_CONFIRMATION,
    SIGNAL_EXTERNAL_TOOLS, SIGNAL_PAUSE, SIGNAL_RESUME,
};
