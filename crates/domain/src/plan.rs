//! Planner activity contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::retry::RetryHint;
use crate::run::{Caps, Usage};
use crate::tool::{RequestedCall, ToolResult};

/// What the policy engine and planner know about a candidate tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub payload_schema: Value,
}

/// A thinking block surfaced by the planner (provider signatures and
/// redaction flags travel with it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub redacted: bool,
    #[serde(default)]
    pub content_index: u32,
    #[serde(rename = "final", default)]
    pub is_final: bool,
}

/// Input to the plan-start / plan-resume activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub agent_id: String,
    pub run_id: String,
    pub session_id: String,
    pub turn_id: String,
    pub turn: u64,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolMetadata>,
    pub allowed_tools: Vec<String>,
    /// Results of the previous turn's calls (resume only, in call order).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<RetryHint>,
    pub caps: Caps,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// What the planner decided for this turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RequestedCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking: Vec<ThinkingPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<RetryHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl PlanResult {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            final_response: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn calls(tool_calls: Vec<RequestedCall>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    /// Neither a final response nor tool calls: a malformed plan.
    pub fn is_empty(&self) -> bool {
        self.final_response.is_none() && self.tool_calls.is_empty()
    }
}
