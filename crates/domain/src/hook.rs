//! Hook events: the kernel's internal observability stream.
//!
//! Every event carries the `(turn, seq)` sequencer clock, which is the
//! canonical total order within a run across parallel fan-out. Stream wire
//! events are derived from hooks by the stream subscriber; run-log and
//! memory subscribers persist them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::plan::ThinkingPayload;
use crate::retry::RetryHint;
use crate::run::{RunPhase, Usage};
use crate::tool::ToolResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub run_id: String,
    pub session_id: String,
    pub turn_id: String,
    /// Numeric turn counter from the sequencer (shared with nested runs).
    pub turn: u64,
    /// Sequence within the turn.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: HookKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookKind {
    RunStarted {
        agent_id: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        labels: HashMap<String, String>,
    },
    RunPhaseChanged {
        phase: RunPhase,
    },
    RunCompleted {
        phase: RunPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_response: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Error>,
        #[serde(default)]
        usage: Usage,
    },
    ToolCallScheduled {
        call_id: String,
        tool_id: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_hint: Option<String>,
    },
    ToolCallUpdated {
        call_id: String,
        expected_children_total: usize,
    },
    ToolCallArgsDelta {
        call_id: String,
        tool_name: String,
        delta: String,
    },
    ToolResultReceived {
        result: ToolResult,
    },
    AssistantMessage {
        text: String,
    },
    PlannerNote {
        text: String,
    },
    ThinkingBlock {
        #[serde(flatten)]
        thinking: ThinkingPayload,
    },
    UsageEvent {
        usage: Usage,
    },
    PolicyDecision {
        allowed_tools: Vec<String>,
        remaining_tool_calls: u32,
    },
    RetryHint {
        hint: RetryHint,
    },
    ChildRunLinked {
        child_run_id: String,
        parent_tool_call_id: String,
        agent_id: String,
    },
    AwaitClarification {
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
    AwaitConfirmation {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
    AwaitQuestions {
        questions: Vec<String>,
    },
    AwaitExternalTools {
        call_ids: Vec<String>,
    },
    ToolAuthorization {
        call_id: String,
        tool_name: String,
        granted: bool,
    },
}

impl HookKind {
    /// Stable name used as the run-log kind column.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunPhaseChanged { .. } => "run_phase_changed",
            Self::RunCompleted { .. } => "run_completed",
            Self::ToolCallScheduled { .. } => "tool_call_scheduled",
            Self::ToolCallUpdated { .. } => "tool_call_updated",
            Self::ToolCallArgsDelta { .. } => "tool_call_args_delta",
            Self::ToolResultReceived { .. } => "tool_result_received",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::PlannerNote { .. } => "planner_note",
            Self::ThinkingBlock { .. } => "thinking_block",
            Self::UsageEvent { .. } => "usage_event",
            Self::PolicyDecision { .. } => "policy_decision",
            Self::RetryHint { .. } => "retry_hint",
            Self::ChildRunLinked { .. } => "child_run_linked",
            Self::AwaitClarification { .. } => "await_clarification",
            Self::AwaitConfirmation { .. } => "await_confirmation",
            Self::AwaitQuestions { .. } => "await_questions",
            Self::AwaitExternalTools { .. } => "await_external_tools",
            Self::ToolAuthorization { .. } => "tool_authorization",
        }
    }
}
