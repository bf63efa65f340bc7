//! Hook-to-wire translation.
//!
//! Consumes hook events off the bus and emits the client-facing subset
//! under the active profile. Sink errors propagate back through the bus
//! and fail the run.

use std::sync::Arc;

use async_trait::async_trait;

use arbor_domain::hook::{HookEvent, HookKind};
use arbor_domain::stream::{
    ArgsDeltaPayload, AssistantReplyPayload, AwaitPayload, BoundaryPayload,
    ChildRunLinkedPayload, PlannerThoughtPayload, StreamEvent, StreamEventKind, StreamPayload,
    ToolAuthorizationPayload, ToolEndPayload, ToolStartPayload, ToolUpdatePayload, UsagePayload,
    WorkflowPayload,
};
use arbor_domain::{Error, Result};

use crate::hooks::HookSubscriber;
use crate::stream::profile::StreamProfile;
use crate::stream::sink::Sink;

pub struct StreamSubscriber {
    sink: Arc<dyn Sink>,
    profile: StreamProfile,
}

impl StreamSubscriber {
    pub fn new(sink: Arc<dyn Sink>, profile: StreamProfile) -> Self {
        Self { sink, profile }
    }

    fn event(&self, hook: &HookEvent, kind: StreamEventKind, payload: StreamPayload) -> StreamEvent {
        StreamEvent {
            kind,
            run_id: hook.run_id.clone(),
            session_id: hook.session_id.clone(),
            timestamp: hook.timestamp,
            payload,
        }
    }

    fn translate(&self, hook: &HookEvent) -> Result<Vec<StreamEvent>> {
        let out = match &hook.kind {
            HookKind::RunStarted { .. } => vec![self.event(
                hook,
                StreamEventKind::SessionStreamStarted,
                StreamPayload::Boundary(BoundaryPayload::default()),
            )],

            HookKind::RunPhaseChanged { phase } => {
                // Terminal phases are covered by RunCompleted.
                if phase.is_terminal() {
                    Vec::new()
                } else {
                    vec![self.event(
                        hook,
                        StreamEventKind::Workflow,
                        StreamPayload::Workflow(WorkflowPayload {
                            phase: *phase,
                            error: None,
                            debug_error: None,
                            error_detail: None,
                        }),
                    )]
                }
            }

            HookKind::RunCompleted { phase, error, .. } => vec![
                self.event(
                    hook,
                    StreamEventKind::Workflow,
                    StreamPayload::Workflow(WorkflowPayload {
                        phase: *phase,
                        error: error.as_ref().map(|e| e.safe_message()),
                        debug_error: error.as_ref().map(|e| e.to_string()),
                        error_detail: error.clone(),
                    }),
                ),
                self.event(
                    hook,
                    StreamEventKind::RunStreamEnd,
                    StreamPayload::Boundary(BoundaryPayload::default()),
                ),
            ],

            HookKind::ToolCallScheduled {
                call_id,
                tool_id,
                payload,
                parent_tool_call_id,
                display_hint,
            } => vec![self.event(
                hook,
                StreamEventKind::ToolStart,
                StreamPayload::ToolStart(ToolStartPayload {
                    call_id: call_id.clone(),
                    tool_name: tool_id.clone(),
                    args: payload.clone(),
                    display_hint: display_hint.clone(),
                    parent_tool_call_id: parent_tool_call_id.clone(),
                }),
            )],

            HookKind::ToolCallUpdated {
                call_id,
                expected_children_total,
            } => vec![self.event(
                hook,
                StreamEventKind::ToolUpdate,
                StreamPayload::ToolUpdate(ToolUpdatePayload {
                    call_id: call_id.clone(),
                    expected_children_total: *expected_children_total,
                }),
            )],

            HookKind::ToolCallArgsDelta {
                call_id,
                tool_name,
                delta,
            } => {
                // Best-effort: silently drop incomplete fragments, but an
                // absent tool name is a producer bug.
                if call_id.is_empty() || delta.is_empty() {
                    Vec::new()
                } else if tool_name.is_empty() {
                    return Err(Error::execution(
                        "tool_call_args_delta event missing tool name",
                    ));
                } else {
                    vec![self.event(
                        hook,
                        StreamEventKind::ToolCallArgsDelta,
                        StreamPayload::ArgsDelta(ArgsDeltaPayload {
                            call_id: call_id.clone(),
                            tool_name: tool_name.clone(),
                            delta: delta.clone(),
                        }),
                    )]
                }
            }

            HookKind::ToolResultReceived { result } => {
                if result.call_id.is_empty() || result.tool_name.is_empty() {
                    return Err(Error::execution(
                        "tool_end event missing call id or tool name",
                    ));
                }
                // Strict contract: a success must carry a result.
                if !result.is_error() && result.result.is_none() {
                    return Err(Error::execution(format!(
                        "tool_end for {} reports success with missing result",
                        result.call_id
                    )));
                }
                let preview = result
                    .result
                    .as_ref()
                    .map(|value| clamp_preview(&value.to_string(), self.profile.preview_max_chars));
                vec![self.event(
                    hook,
                    StreamEventKind::ToolEnd,
                    StreamPayload::ToolEnd(ToolEndPayload {
                        call_id: result.call_id.clone(),
                        tool_name: result.tool_name.clone(),
                        result: result.result.clone(),
                        error: result.error.clone(),
                        preview,
                    }),
                )]
            }

            HookKind::AssistantMessage { text } => vec![self.event(
                hook,
                StreamEventKind::AssistantReply,
                StreamPayload::AssistantReply(AssistantReplyPayload { text: text.clone() }),
            )],

            HookKind::PlannerNote { text } => vec![self.event(
                hook,
                StreamEventKind::PlannerThought,
                StreamPayload::PlannerThought(PlannerThoughtPayload {
                    note: Some(text.clone()),
                    text: text.clone(),
                    signature: None,
                    redacted: false,
                    content_index: 0,
                    is_final: false,
                }),
            )],

            HookKind::ThinkingBlock { thinking } => vec![self.event(
                hook,
                StreamEventKind::PlannerThought,
                StreamPayload::PlannerThought(PlannerThoughtPayload {
                    // Note carries the delta only while non-final.
                    note: (!thinking.is_final).then(|| thinking.text.clone()),
                    text: thinking.text.clone(),
                    signature: thinking.signature.clone(),
                    redacted: thinking.redacted,
                    content_index: thinking.content_index,
                    is_final: thinking.is_final,
                }),
            )],

            HookKind::UsageEvent { usage } => vec![self.event(
                hook,
                StreamEventKind::Usage,
                StreamPayload::Usage(UsagePayload { usage: *usage }),
            )],

            HookKind::ChildRunLinked {
                child_run_id,
                parent_tool_call_id,
                agent_id,
            } => vec![self.event(
                hook,
                StreamEventKind::ChildRunLinked,
                StreamPayload::ChildRunLinked(ChildRunLinkedPayload {
                    child_run_id: child_run_id.clone(),
                    parent_tool_call_id: parent_tool_call_id.clone(),
                    agent_id: agent_id.clone(),
                }),
            )],

            HookKind::AwaitClarification {
                question,
                tool_call_id,
            } => vec![self.event(
                hook,
                StreamEventKind::AwaitClarification,
                StreamPayload::Await(AwaitPayload {
                    question: Some(question.clone()),
                    tool_call_id: tool_call_id.clone(),
                    ..AwaitPayload::default()
                }),
            )],

            HookKind::AwaitConfirmation {
                prompt,
                tool_call_id,
            } => vec![self.event(
                hook,
                StreamEventKind::AwaitConfirmation,
                StreamPayload::Await(AwaitPayload {
                    prompt: Some(prompt.clone()),
                    tool_call_id: tool_call_id.clone(),
                    ..AwaitPayload::default()
                }),
            )],

            HookKind::AwaitQuestions { questions } => vec![self.event(
                hook,
                StreamEventKind::AwaitQuestions,
                StreamPayload::Await(AwaitPayload {
                    questions: questions.clone(),
                    ..AwaitPayload::default()
                }),
            )],

            HookKind::AwaitExternalTools { call_ids } => vec![self.event(
                hook,
                StreamEventKind::AwaitExternalTools,
                StreamPayload::Await(AwaitPayload {
                    call_ids: call_ids.clone(),
                    ..AwaitPayload::default()
                }),
            )],

            HookKind::ToolAuthorization {
                call_id,
                tool_name,
                granted,
            } => vec![self.event(
                hook,
                StreamEventKind::ToolAuthorization,
                StreamPayload::ToolAuthorization(ToolAuthorizationPayload {
                    call_id: call_id.clone(),
                    tool_name: tool_name.clone(),
                    granted: *granted,
                }),
            )],

            // Internal-only events: policy decisions and retry hints stay
            // on the hook bus and the run log.
            HookKind::PolicyDecision { .. } | HookKind::RetryHint { .. } => Vec::new(),
        };
        Ok(out)
    }
}

#[async_trait]
impl HookSubscriber for StreamSubscriber {
    fn name(&self) -> &str {
        "stream"
    }

    async fn on_event(&self, event: &HookEvent) -> Result<()> {
        for stream_event in self.translate(event)? {
            if !self.profile.emits(stream_event.kind) {
                continue;
            }
            self.sink.send(stream_event).await?;
        }
        Ok(())
    }
}

/// Whitespace-normalize and clamp a result preview.
pub fn clamp_preview(raw: &str, max_chars: usize) -> String {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.chars().take(max_chars).collect()
}
