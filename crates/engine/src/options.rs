//! Activity and workflow start options.

use std::sync::Arc;
use std::time::Duration;

use arbor_domain::run::RunInput;

use crate::context::WorkflowHandler;

/// Options applied to one activity execution. Registration carries
/// defaults; per-call options supersede them field by field.
#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub task_queue: Option<String>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl ActivityOptions {
    /// Per-call override semantics: any field set here wins over the
    /// registration default.
    pub fn merged_over(&self, defaults: &ActivityOptions) -> ActivityOptions {
        ActivityOptions {
            task_queue: self.task_queue.clone().or_else(|| defaults.task_queue.clone()),
            timeout: self.timeout.or(defaults.timeout),
            retry: self.retry.clone().or_else(|| defaults.retry.clone()),
        }
    }
}

/// Backoff retry for transient activity failures. Only errors flagged
/// `retryable` are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (the default when registration and call
    /// both leave retry unset).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Request to start one workflow execution.
#[derive(Debug, Clone)]
pub struct StartWorkflowRequest {
    /// Workflow id. Conventionally the run id.
    pub id: String,
    /// Registered workflow name.
    pub workflow: String,
    pub task_queue: Option<String>,
    pub input: RunInput,
    pub run_timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

/// A registered workflow: name, home task queue, handler.
#[derive(Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub task_queue: String,
    pub handler: Arc<dyn WorkflowHandler>,
}
