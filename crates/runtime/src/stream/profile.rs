//! Stream profiles: boolean gates per wire event kind.

use arbor_domain::config::StreamConfig;
use arbor_domain::stream::StreamEventKind;

#[derive(Debug, Clone)]
pub struct StreamProfile {
    pub planner_thought: bool,
    pub tool_start: bool,
    pub tool_update: bool,
    pub tool_call_args_delta: bool,
    pub tool_output_delta: bool,
    pub tool_end: bool,
    pub assistant_reply: bool,
    pub awaits: bool,
    pub tool_authorization: bool,
    pub usage: bool,
    pub workflow: bool,
    pub child_run_linked: bool,
    pub stream_boundaries: bool,
    pub preview_max_chars: usize,
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            planner_thought: true,
            tool_start: true,
            tool_update: true,
            tool_call_args_delta: true,
            tool_output_delta: true,
            tool_end: true,
            assistant_reply: true,
            awaits: true,
            tool_authorization: true,
            usage: true,
            workflow: true,
            child_run_linked: true,
            stream_boundaries: true,
            preview_max_chars: 140,
        }
    }
}

impl StreamProfile {
    /// Metrics consumers: usage and workflow phase only.
    pub fn metrics() -> Self {
        Self {
            planner_thought: false,
            tool_start: false,
            tool_update: false,
            tool_call_args_delta: false,
            tool_output_delta: false,
            tool_end: false,
            assistant_reply: false,
            awaits: false,
            tool_authorization: false,
            usage: true,
            workflow: true,
            child_run_linked: false,
            stream_boundaries: false,
            preview_max_chars: 140,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            planner_thought: config.thoughts,
            tool_start: config.tool_events,
            tool_update: config.tool_events,
            tool_call_args_delta: config.tool_events,
            tool_output_delta: config.tool_events,
            tool_end: config.tool_events,
            assistant_reply: config.assistant,
            awaits: config.assistant,
            tool_authorization: config.tool_events,
            usage: config.usage,
            workflow: config.workflow,
            child_run_linked: config.tool_events,
            stream_boundaries: config.workflow,
            preview_max_chars: config.preview_max_chars,
        }
    }

    pub fn emits(&self, kind: StreamEventKind) -> bool {
        match kind {
            StreamEventKind::PlannerThought => self.planner_thought,
            StreamEventKind::ToolStart => self.tool_start,
            StreamEventKind::ToolUpdate => self.tool_update,
            StreamEventKind::ToolCallArgsDelta => self.tool_call_args_delta,
            StreamEventKind::ToolOutputDelta => self.tool_output_delta,
            StreamEventKind::ToolEnd => self.tool_end,
            StreamEventKind::AssistantReply => self.assistant_reply,
            StreamEventKind::AwaitClarification
            | StreamEventKind::AwaitConfirmation
            | StreamEventKind::AwaitQuestions
            | StreamEventKind::AwaitExternalTools => self.awaits,
            StreamEventKind::ToolAuthorization => self.tool_authorization,
            StreamEventKind::Usage => self.usage,
            StreamEventKind::Workflow => self.workflow,
            StreamEventKind::ChildRunLinked => self.child_run_linked,
            StreamEventKind::SessionStreamStarted
            | StreamEventKind::SessionStreamEnd
            | StreamEventKind::RunStreamEnd => self.stream_boundaries,
        }
    }
}
