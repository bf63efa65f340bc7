//! Structured retry hints.
//!
//! A retry hint is guidance, produced by the planner or synthesized by the
//! runtime from a failed result, that shapes the next turn's policy
//! decision: what went wrong, which fields were missing, and optionally a
//! single tool the next allowlist should collapse to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};

/// Closed set of retry reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    InvalidArguments,
    MissingFields,
    MalformedResponse,
    Timeout,
    RateLimited,
    ToolUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryHint {
    pub reason: RetryReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When set, the next turn's allowlist collapses to this single tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_to_tool: Option<String>,
}

impl RetryHint {
    pub fn new(reason: RetryReason) -> Self {
        Self {
            reason,
            tool: None,
            missing_fields: Vec::new(),
            example_input: None,
            prior_input: None,
            clarifying_question: None,
            message: None,
            restrict_to_tool: None,
        }
    }

    pub fn for_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_prior_input(mut self, prior: Value) -> Self {
        self.prior_input = Some(prior);
        self
    }

    pub fn restrict_to(mut self, tool: impl Into<String>) -> Self {
        self.restrict_to_tool = Some(tool.into());
        self
    }

    /// Synthesized when the planner returns neither a final response nor
    /// tool calls.
    pub fn malformed_response() -> Self {
        Self::new(RetryReason::MalformedResponse)
            .with_message("planner returned neither a final response nor tool calls")
    }

    /// Map a failed result's error onto a hint for the next policy turn.
    /// Terminal kinds (policy denial, cancellation, budget) produce no
    /// hint; the planner sees the failed result itself.
    pub fn from_error(error: &Error, tool: Option<&str>) -> Option<Self> {
        let reason = match error.kind {
            ErrorKind::SchemaMismatch => {
                if error.missing_fields.is_empty() {
                    RetryReason::InvalidArguments
                } else {
                    RetryReason::MissingFields
                }
            }
            ErrorKind::CodecFailure => RetryReason::InvalidArguments,
            ErrorKind::ToolTimeout => RetryReason::Timeout,
            ErrorKind::ToolRateLimited => RetryReason::RateLimited,
            ErrorKind::ToolUnavailable | ErrorKind::UnknownTool => RetryReason::ToolUnavailable,
            _ => return None,
        };
        let mut hint = Self::new(reason).with_message(error.message.clone());
        hint.tool = tool.map(str::to_owned);
        hint.missing_fields = error.missing_fields.clone();
        Some(hint)
    }
}
