//! The engine and handle traits the kernel consumes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use arbor_domain::run::{RunOutput, RunPhase};
use arbor_domain::Result;

use crate::context::{HookActivity, PlannerActivity, ToolActivity};
use crate::options::{ActivityOptions, StartWorkflowRequest, WorkflowDefinition};

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn register_workflow(&self, def: WorkflowDefinition) -> Result<()>;

    fn register_planner_activity(
        &self,
        name: &str,
        handler: Arc<dyn PlannerActivity>,
        defaults: ActivityOptions,
    ) -> Result<()>;

    fn register_tool_activity(
        &self,
        name: &str,
        handler: Arc<dyn ToolActivity>,
        defaults: ActivityOptions,
    ) -> Result<()>;

    /// One hook activity per engine: the bridge from workflow executions
    /// to the kernel's hook bus.
    fn register_hook_activity(&self, handler: Arc<dyn HookActivity>) -> Result<()>;

    async fn start_workflow(&self, req: StartWorkflowRequest) -> Result<Arc<dyn WorkflowHandle>>;

    async fn query_run_status(&self, run_id: &str) -> Result<RunPhase>;
}

#[async_trait]
pub trait WorkflowHandle: Send + Sync {
    fn run_id(&self) -> &str;

    /// Await the terminal result. Safe to call from multiple waiters.
    async fn wait(&self) -> Result<RunOutput>;

    /// Route a named JSON payload to the workflow's typed signal channel.
    async fn signal(&self, name: &str, payload: Value) -> Result<()>;

    async fn cancel(&self) -> Result<()>;

    /// Invoke a query handler registered by the workflow.
    async fn query(&self, name: &str) -> Result<Value>;
}
