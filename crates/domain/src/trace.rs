//! Structured trace events emitted across all Arbor crates.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunStarted {
        run_id: String,
        agent_id: String,
        workflow: String,
    },
    RunFinished {
        run_id: String,
        phase: String,
        turns: u64,
        tool_calls: usize,
        duration_ms: u64,
    },
    ToolDispatched {
        run_id: String,
        call_id: String,
        tool_id: String,
        inline: bool,
    },
    PolicyDecided {
        run_id: String,
        turn: u64,
        requested: usize,
        allowed: usize,
    },
    SignalReceived {
        run_id: String,
        signal: String,
    },
    ChildRunStarted {
        parent_run_id: String,
        child_run_id: String,
        tool_id: String,
    },
    ActivityRetried {
        run_id: String,
        activity: String,
        attempt: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "arbor_event");
    }
}
