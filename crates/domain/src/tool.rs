//! The canonical JSON tool contract.
//!
//! Payloads and results cross the planner/runtime boundary as opaque JSON
//! values. Only the runtime decodes them into typed structs via the tool
//! codecs; planners and provider adapters ship raw JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::message::{Message, Part};

/// A tool call as requested by the planner. No id yet; the runtime derives
/// a deterministic call id when it schedules the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    pub tool_name: String,
    pub payload: Value,
}

impl RequestedCall {
    pub fn new(tool_name: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            payload,
        }
    }
}

/// A scheduled tool call shipped to an execute activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_id: String,
    pub payload: Value,
    pub run_id: String,
    pub session_id: String,
    pub turn_id: String,
    pub turn: u64,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// The outcome of one tool call. Exactly one of `result` / `error` is set
/// for a well-formed value; the stream subscriber rejects a success with
/// no result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: Error,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result: None,
            error: Some(error),
            elapsed_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether this result consumes a unit of the remaining-tool-call
    /// budget. Policy-denied and unavailable-tool results are skipped
    /// calls: the planner is expected to retry differently, and skipped
    /// calls never drain the budget.
    pub fn counts_against_budget(&self) -> bool {
        !matches!(
            self.error_kind(),
            Some(ErrorKind::PolicyDenied) | Some(ErrorKind::ToolUnavailable)
        )
    }

    /// Whether this result advances the consecutive-failure counter.
    /// Unavailable and unknown tools are exempt: a retry with a
    /// different tool is the expected follow-up.
    pub fn counts_as_failure(&self) -> bool {
        match self.error_kind() {
            None => false,
            Some(ErrorKind::ToolUnavailable) | Some(ErrorKind::UnknownTool) => false,
            Some(_) => true,
        }
    }

    /// The message part planners receive for this result.
    pub fn to_part(&self) -> Part {
        Part::ToolResult {
            tool_call_id: self.call_id.clone(),
            result: self.result.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// A user message bundling the turn's tool results, in call order.
pub fn tool_results_message(results: &[ToolResult]) -> Message {
    Message::tool_results(results.iter().map(ToolResult::to_part).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_accounting_skips_denied_and_unavailable() {
        let ok = ToolResult::ok("tc_1", "svc.ts.echo", serde_json::json!({"out": 1}));
        assert!(ok.counts_against_budget());
        assert!(!ok.counts_as_failure());

        let denied = ToolResult::failed("tc_2", "svc.ts.danger", Error::policy_denied("no"));
        assert!(!denied.counts_against_budget());
        assert!(denied.counts_as_failure());

        let unavailable =
            ToolResult::failed("tc_3", "svc.ts.gone", Error::tool_unavailable("offline"));
        assert!(!unavailable.counts_against_budget());
        assert!(!unavailable.counts_as_failure());

        let failed = ToolResult::failed("tc_4", "svc.ts.echo", Error::execution("boom"));
        assert!(failed.counts_against_budget());
        assert!(failed.counts_as_failure());
    }

    #[test]
    fn results_message_preserves_call_order() {
        let results = vec![
            ToolResult::ok("tc_b", "svc.ts.echo", serde_json::json!(2)),
            ToolResult::failed("tc_a", "svc.ts.echo", Error::execution("x")),
        ];
        let msg = tool_results_message(&results);
        assert_eq!(msg.tool_result_ids(), vec!["tc_b", "tc_a"]);
    }

    #[test]
    fn invocation_round_trips() {
        let inv = ToolInvocation {
            call_id: "tc_1".into(),
            tool_id: "svc.ts.echo".into(),
            payload: serde_json::json!({"msg": "hi"}),
            run_id: "run_1".into(),
            session_id: "sess_1".into(),
            turn_id: "turn_1".into(),
            turn: 1,
            attempt: 0,
            parent_tool_call_id: None,
            labels: HashMap::new(),
        };
        let back: ToolInvocation =
            serde_json::from_str(&serde_json::to_string(&inv).unwrap()).unwrap();
        assert_eq!(back.call_id, "tc_1");
        assert_eq!(back.payload["msg"], "hi");
    }
}
