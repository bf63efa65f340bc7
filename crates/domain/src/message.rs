//! Planner-facing messages with ordered typed parts.
//!
//! Part order within a message is load-bearing (tool_use parts must be
//! answered by a following user message of matching tool_result parts
//! before any injected system reminder). Nothing in the kernel reorders
//! parts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default)]
        redacted: bool,
        #[serde(default)]
        content_index: u32,
        #[serde(rename = "final", default)]
        is_final: bool,
    },
    ToolUse {
        tool_call_id: String,
        tool_name: String,
        payload: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// A user message carrying tool results (the shape planners expect
    /// directly after an assistant message with tool_use parts).
    pub fn tool_results(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Joined text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_tool_use(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolUse { .. }))
    }

    pub fn has_tool_results(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolResult { .. }))
    }

    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolUse { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_text_parts_only() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Text {
                    text: "one".into(),
                },
                Part::ToolUse {
                    tool_call_id: "tc_1".into(),
                    tool_name: "svc.ts.echo".into(),
                    payload: serde_json::json!({}),
                },
                Part::Text {
                    text: "two".into(),
                },
            ],
        };
        assert_eq!(msg.text(), "one\ntwo");
        assert!(msg.has_tool_use());
        assert_eq!(msg.tool_use_ids(), vec!["tc_1"]);
    }

    #[test]
    fn thinking_serializes_final_field_name() {
        let part = Part::Thinking {
            text: "hmm".into(),
            signature: None,
            redacted: false,
            content_index: 2,
            is_final: true,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "thinking");
        assert_eq!(json["final"], true);
        assert_eq!(json["content_index"], 2);
    }

    #[test]
    fn tool_result_part_round_trips() {
        let part = Part::ToolResult {
            tool_call_id: "tc_9".into(),
            result: Some(serde_json::json!({"out": "hi"})),
            error: None,
        };
        let json = serde_json::to_string(&part).unwrap();
        let back: Part = serde_json::from_str(&json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn part_order_survives_round_trip() {
        let msg = Message {
            role: Role::User,
            parts: vec![
                Part::ToolResult {
                    tool_call_id: "a".into(),
                    result: Some(serde_json::json!(1)),
                    error: None,
                },
                Part::ToolResult {
                    tool_call_id: "b".into(),
                    result: None,
                    error: Some("boom".into()),
                },
            ],
        };
        let back: Message =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back.tool_result_ids(), vec!["a", "b"]);
    }
}
