//! Memory store: the reconstructable transcript per run.
//!
//! Messages plus derived events (tool calls, results, planner notes,
//! assistant replies). A hook-bus subscriber in the runtime feeds this
//! store; `load_run` returns the snapshot used to resume or inspect a run.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_domain::hook::{HookEvent, HookKind};
use arbor_domain::message::Message;
use arbor_domain::tool::ToolResult;
use arbor_domain::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    ToolCall {
        call_id: String,
        tool_id: String,
        payload: Value,
        turn: u64,
    },
    ToolResult {
        result: ToolResult,
        turn: u64,
    },
    PlannerNote {
        text: String,
        turn: u64,
    },
    AssistantMessage {
        text: String,
        turn: u64,
    },
}

impl MemoryEvent {
    /// The transcript-relevant projection of a hook event, if any.
    pub fn from_hook(event: &HookEvent) -> Option<Self> {
        match &event.kind {
            HookKind::ToolCallScheduled {
                call_id,
                tool_id,
                payload,
                ..
            } => Some(Self::ToolCall {
                call_id: call_id.clone(),
                tool_id: tool_id.clone(),
                payload: payload.clone(),
                turn: event.turn,
            }),
            HookKind::ToolResultReceived { result } => Some(Self::ToolResult {
                result: result.clone(),
                turn: event.turn,
            }),
            HookKind::PlannerNote { text } => Some(Self::PlannerNote {
                text: text.clone(),
                turn: event.turn,
            }),
            HookKind::AssistantMessage { text } => Some(Self::AssistantMessage {
                text: text.clone(),
                turn: event.turn,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub messages: Vec<Message>,
    pub events: Vec<MemoryEvent>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The current snapshot. Unknown runs yield an empty snapshot.
    async fn load_run(&self, run_id: &str) -> Result<RunSnapshot>;

    /// Batched event append.
    async fn append_events(&self, run_id: &str, events: Vec<MemoryEvent>) -> Result<()>;

    /// Append transcript messages.
    async fn append_messages(&self, run_id: &str, messages: Vec<Message>) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryMemory {
    runs: RwLock<HashMap<String, RunSnapshot>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemory {
    async fn load_run(&self, run_id: &str) -> Result<RunSnapshot> {
        Ok(self.runs.read().get(run_id).cloned().unwrap_or_default())
    }

    async fn append_events(&self, run_id: &str, events: Vec<MemoryEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut runs = self.runs.write();
        runs.entry(run_id.to_owned())
            .or_default()
            .events
            .extend(events);
        Ok(())
    }

    async fn append_messages(&self, run_id: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut runs = self.runs.write();
        runs.entry(run_id.to_owned())
            .or_default()
            .messages
            .extend(messages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hook(kind: HookKind) -> HookEvent {
        HookEvent {
            run_id: "run_1".into(),
            session_id: "sess_1".into(),
            turn_id: "turn_1".into(),
            turn: 2,
            seq: 0,
            timestamp: Utc::now(),
            kind,
        }
    }

    #[tokio::test]
    async fn unknown_run_snapshot_is_empty() {
        let store = InMemoryMemory::new();
        let snapshot = store.load_run("run_none").await.unwrap();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.events.is_empty());
    }

    #[tokio::test]
    async fn appends_accumulate_in_order() {
        let store = InMemoryMemory::new();
        store
            .append_events(
                "run_1",
                vec![
                    MemoryEvent::PlannerNote {
                        text: "first".into(),
                        turn: 1,
                    },
                    MemoryEvent::AssistantMessage {
                        text: "second".into(),
                        turn: 1,
                    },
                ],
            )
            .await
            .unwrap();
        store
            .append_messages("run_1", vec![Message::user("hi")])
            .await
            .unwrap();

        let snapshot = store.load_run("run_1").await.unwrap();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.messages.len(), 1);
        assert!(matches!(
            &snapshot.events[0],
            MemoryEvent::PlannerNote { text, .. } if text == "first"
        ));
    }

    #[test]
    fn hook_projection_keeps_transcript_events_only() {
        let scheduled = hook(HookKind::ToolCallScheduled {
            call_id: "tc_1".into(),
            tool_id: "svc.ts.echo".into(),
            payload: serde_json::json!({"msg": "hi"}),
            parent_tool_call_id: None,
            display_hint: None,
        });
        match MemoryEvent::from_hook(&scheduled) {
            Some(MemoryEvent::ToolCall { call_id, turn, .. }) => {
                assert_eq!(call_id, "tc_1");
                assert_eq!(turn, 2);
            }
            other => panic!("unexpected projection: {other:?}"),
        }

        let phase = hook(HookKind::RunPhaseChanged {
            phase: arbor_domain::RunPhase::Running,
        });
        assert!(MemoryEvent::from_hook(&phase).is_none());
    }
}
