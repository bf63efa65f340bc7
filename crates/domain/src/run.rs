//! Run lifecycle types: phases, inputs, outputs, budgets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::tool::ToolResult;

/// Phases of a run: `pending -> running -> (paused -> running)* ->
/// completed | failed | canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-facing options for one workflow execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
}

/// Input to `start_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInput {
    pub agent_id: String,
    /// Empty means the runtime mints one.
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub turn_id: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub workflow_options: WorkflowOptions,
}

/// Output of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_events: Vec<ToolResult>,
    #[serde(default)]
    pub usage: Usage,
}

/// Per-run budgets, typically DSL-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPolicy {
    #[serde(default = "d_max_tool_calls")]
    pub max_tool_calls: u32,
    #[serde(default = "d_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_ms: Option<u64>,
}

fn d_max_tool_calls() -> u32 {
    25
}
fn d_max_consecutive_failures() -> u32 {
    3
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_tool_calls: d_max_tool_calls(),
            max_consecutive_failures: d_max_consecutive_failures(),
            time_budget_ms: None,
        }
    }
}

impl RunPolicy {
    pub fn initial_caps(&self, now: DateTime<Utc>) -> Caps {
        Caps {
            remaining_tool_calls: self.max_tool_calls,
            consecutive_failures: 0,
            deadline: self
                .time_budget_ms
                .map(|ms| now + chrono::Duration::milliseconds(ms as i64)),
        }
    }
}

/// Evolving caps state, updated each turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Caps {
    pub remaining_tool_calls: u32,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl Caps {
    pub fn exhausted(&self) -> bool {
        self.remaining_tool_calls == 0
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Token usage accumulated across planner turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}
