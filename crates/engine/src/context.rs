//! Workflow context and activity traits.
//!
//! The workflow context is what a running workflow (the kernel's run loop)
//! sees: its identity, a deterministic-enough clock, hook publication,
//! activity execution, child workflows, and the typed signal channels.
//! Activities receive an [`ActivityContext`] from which the current
//! workflow context is retrievable; nested agent execution depends on it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use arbor_domain::hook::HookEvent;
use arbor_domain::plan::{PlanRequest, PlanResult};
use arbor_domain::run::{RunInput, RunOutput, RunPhase};
use arbor_domain::tool::{ToolInvocation, ToolResult};
use arbor_domain::Result;

use crate::engine::WorkflowHandle;
use crate::future::ActivityFuture;
use crate::options::{ActivityOptions, StartWorkflowRequest};
use crate::signals::SignalChannels;

/// Handler for a named query against a running workflow.
pub type QueryHandler = Arc<dyn Fn() -> Value + Send + Sync>;

/// The registered body of a workflow.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn run(&self, ctx: Arc<dyn WorkflowCtx>, input: RunInput) -> Result<RunOutput>;
}

#[async_trait]
pub trait WorkflowCtx: Send + Sync {
    fn run_id(&self) -> &str;
    fn workflow_id(&self) -> &str;
    fn now(&self) -> DateTime<Utc>;

    fn is_cancelled(&self) -> bool;
    /// Completes when cancellation has been requested.
    async fn cancelled(&self);

    /// Phase tracking backing `query_run_status`.
    fn set_phase(&self, phase: RunPhase);
    fn phase(&self) -> RunPhase;

    fn set_query_handler(&self, name: &str, handler: QueryHandler);

    /// Publish a hook event through the registered hook activity.
    /// Fail-fast: a subscriber error propagates and fails the run.
    async fn publish_hook(&self, event: HookEvent) -> Result<()>;

    async fn execute_planner_activity(&self, activity: &str, req: PlanRequest)
        -> Result<PlanResult>;

    async fn execute_tool_activity(
        &self,
        activity: &str,
        invocation: ToolInvocation,
        options: Option<ActivityOptions>,
    ) -> Result<ToolResult>;

    fn execute_tool_activity_async(
        &self,
        activity: &str,
        invocation: ToolInvocation,
        options: Option<ActivityOptions>,
    ) -> ActivityFuture<ToolResult>;

    async fn start_child_workflow(
        &self,
        req: StartWorkflowRequest,
    ) -> Result<Arc<dyn WorkflowHandle>>;

    fn signals(&self) -> &SignalChannels;
}

/// Context handed to every activity invocation. Carries the attempt
/// counter and a handle back to the owning workflow context.
#[derive(Clone)]
pub struct ActivityContext {
    pub run_id: String,
    pub workflow_id: String,
    pub attempt: u32,
    pub workflow: Arc<dyn WorkflowCtx>,
}

#[async_trait]
pub trait PlannerActivity: Send + Sync {
    async fn plan(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult>;
}

#[async_trait]
pub trait ToolActivity: Send + Sync {
    async fn execute(&self, ctx: ActivityContext, invocation: ToolInvocation)
        -> Result<ToolResult>;
}

#[async_trait]
pub trait HookActivity: Send + Sync {
    async fn publish(&self, ctx: ActivityContext, event: HookEvent) -> Result<()>;
}
