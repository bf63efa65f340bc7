//! Client-facing stream wire events.
//!
//! Every event carries the `{type, run_id, session_id, timestamp, payload}`
//! envelope. The payloads are typed; the subscriber builds them from hook
//! events under the active profile. SSE framing is a transport concern and
//! lives outside the kernel.

use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::run::{RunPhase, Usage};

/// A boxed async stream, used for model-client streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    PlannerThought,
    ToolStart,
    ToolUpdate,
    ToolCallArgsDelta,
    ToolOutputDelta,
    ToolEnd,
    AssistantReply,
    AwaitClarification,
    AwaitConfirmation,
    AwaitQuestions,
    AwaitExternalTools,
    ToolAuthorization,
    Usage,
    Workflow,
    ChildRunLinked,
    SessionStreamStarted,
    SessionStreamEnd,
    RunStreamEnd,
}

/// The wire envelope.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    pub run_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: StreamPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StreamPayload {
    PlannerThought(PlannerThoughtPayload),
    ToolStart(ToolStartPayload),
    ToolUpdate(ToolUpdatePayload),
    ArgsDelta(ArgsDeltaPayload),
    OutputDelta(OutputDeltaPayload),
    ToolEnd(ToolEndPayload),
    AssistantReply(AssistantReplyPayload),
    Await(AwaitPayload),
    ToolAuthorization(ToolAuthorizationPayload),
    Usage(UsagePayload),
    Workflow(WorkflowPayload),
    ChildRunLinked(ChildRunLinkedPayload),
    Boundary(BoundaryPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannerThoughtPayload {
    /// Set only for non-final thought deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub redacted: bool,
    pub content_index: u32,
    #[serde(rename = "final")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStartPayload {
    pub call_id: String,
    pub tool_name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolUpdatePayload {
    pub call_id: String,
    pub expected_children_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArgsDeltaPayload {
    pub call_id: String,
    pub tool_name: String,
    /// Best-effort fragment; may not be valid JSON on its own.
    pub delta: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputDeltaPayload {
    pub call_id: String,
    pub tool_name: String,
    pub delta: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolEndPayload {
    pub call_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Whitespace-normalized result preview, clamped to 140 chars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReplyPayload {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AwaitPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub call_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolAuthorizationPayload {
    pub call_id: String,
    pub tool_name: String,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsagePayload {
    #[serde(flatten)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPayload {
    pub phase: RunPhase,
    /// Client-safe error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw error string, for logs and debugging surfaces only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_error: Option<String>,
    /// Structured error detail (provider/operation/kind/code/http_status)
    /// when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Error>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildRunLinkedPayload {
    pub child_run_id: String,
    pub parent_tool_call_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoundaryPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StreamEvent {
    pub fn new(
        kind: StreamEventKind,
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: StreamPayload,
    ) -> Self {
        Self {
            kind,
            run_id: run_id.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}
