//! Agent-as-tool: nested agents executed inline as tools.
//!
//! A nested agent runs its own loop synchronously inside the parent's
//! workflow execution (no child workflow). It has its own policy and
//! caps, a derived run id, and shares the parent's sequencer so events
//! interleave deterministically. Its final response is folded back into
//! a tool result through the parent tool's result codec and finalizer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use arbor_domain::hook::HookKind;
use arbor_domain::message::Message;
use arbor_domain::run::RunOutput;
use arbor_domain::tool::{ToolInvocation, ToolResult};
use arbor_domain::trace::TraceEvent;
use arbor_domain::{Error, ErrorKind, Result};
use arbor_engine::ActivityContext;
use arbor_tools::{AgentPrompt, Codec, HintTemplate, ToolExecutor, ToolSpec, ToolsetRegistration};

use crate::ids;
use crate::runloop::{emit, run_loop, LoopParams, ParentLink};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One agent tool plus its prompt configuration.
pub struct AgentToolDef {
    pub spec: ToolSpec,
    /// Fixed user-message text for the nested agent.
    pub prompt_text: Option<String>,
    /// Template rendered against the decoded payload instead.
    pub prompt_template: Option<String>,
    /// Optional finalizer template rendered against `{"final": ...}`.
    pub finalizer: Option<String>,
}

impl AgentToolDef {
    pub fn with_text(spec: ToolSpec, text: impl Into<String>) -> Self {
        Self {
            spec,
            prompt_text: Some(text.into()),
            prompt_template: None,
            finalizer: None,
        }
    }

    pub fn with_template(spec: ToolSpec, template: impl Into<String>) -> Self {
        Self {
            spec,
            prompt_text: None,
            prompt_template: Some(template.into()),
            finalizer: None,
        }
    }
}

/// Build the toolset registration for a set of agent tools.
///
/// Every tool must carry exactly one prompt source (text or template);
/// configuring both, or neither, is a registration error, never a panic.
pub fn agent_toolset_registration(
    name: &str,
    system_prompt: &str,
    tools: Vec<AgentToolDef>,
    task_queue: Option<String>,
) -> Result<ToolsetRegistration> {
    if name.is_empty() {
        return Err(
            Error::execution("agent toolset name must not be empty")
                .with_code("invalid_registration"),
        );
    }
    let mut specs = Vec::with_capacity(tools.len());
    for def in tools {
        if !def.spec.is_agent_tool || def.spec.agent_id.is_none() {
            return Err(Error::execution(format!(
                "tool {} is not an agent tool",
                def.spec.id
            ))
            .with_code("invalid_registration"));
        }
        match (&def.prompt_text, &def.prompt_template) {
            (Some(_), Some(_)) => {
                return Err(Error::execution(format!(
                    "tool {}: both prompt text and template configured",
                    def.spec.id
                ))
                .with_code("invalid_registration"));
            }
            (None, None) => {
                return Err(Error::execution(format!(
                    "tool {}: needs a prompt text or a prompt template",
                    def.spec.id
                ))
                .with_code("invalid_registration"));
            }
            _ => {}
        }
        let template = def
            .prompt_template
            .as_deref()
            .map(HintTemplate::compile)
            .transpose()?;
        let finalizer = def
            .finalizer
            .as_deref()
            .map(HintTemplate::compile)
            .transpose()?;
        let mut spec = def.spec;
        spec.agent_prompt = Some(AgentPrompt {
            system_prompt: system_prompt.to_owned(),
            text: def.prompt_text,
            template,
            finalizer,
        });
        specs.push(spec);
    }
    Ok(ToolsetRegistration {
        name: name.to_owned(),
        specs,
        execute: Arc::new(InlineOnlyExecutor),
        task_queue,
    })
}

/// Agent tools never go through the activity dispatch path; the run loop
/// executes them inline. Reaching this executor means a misrouted call.
struct InlineOnlyExecutor;

#[async_trait]
impl ToolExecutor for InlineOnlyExecutor {
    async fn execute(
        &self,
        _ctx: ActivityContext,
        invocation: ToolInvocation,
    ) -> Result<ToolResult> {
        Err(Error::execution(format!(
            "agent tool {} executes inline within its workflow",
            invocation.tool_id
        ))
        .with_code("inline_only"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inline execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn execute_agent_inline<'a>(
    p: &'a LoopParams,
    spec: &'a ToolSpec,
    invocation: &'a ToolInvocation,
) -> Pin<Box<dyn Future<Output = Result<ToolResult>> + Send + 'a>> {
    Box::pin(execute_agent_inline_inner(p, spec, invocation))
}

async fn execute_agent_inline_inner(
    p: &LoopParams,
    spec: &ToolSpec,
    invocation: &ToolInvocation,
) -> Result<ToolResult> {
    let Some(agent_id) = spec.agent_id.clone() else {
        return Ok(ToolResult::failed(
            invocation.call_id.clone(),
            spec.id.clone(),
            Error::execution(format!("agent tool {} has no agent id", spec.id)),
        ));
    };
    let Some(nested_agent) = p.runtime.agents.read().get(&agent_id).cloned() else {
        return Ok(ToolResult::failed(
            invocation.call_id.clone(),
            spec.id.clone(),
            Error::tool_unavailable(format!("agent not registered: {agent_id}")),
        ));
    };

    let child_run_id = ids::child_run_id(&p.run_id, &spec.id, &invocation.call_id);
    emit(
        p,
        HookKind::ChildRunLinked {
            child_run_id: child_run_id.clone(),
            parent_tool_call_id: invocation.call_id.clone(),
            agent_id: agent_id.clone(),
        },
    )
    .await?;
    TraceEvent::ChildRunStarted {
        parent_run_id: p.run_id.clone(),
        child_run_id: child_run_id.clone(),
        tool_id: spec.id.clone(),
    }
    .emit();

    let nested_messages = initial_messages(spec, &invocation.payload);
    let nested = LoopParams {
        runtime: p.runtime.clone(),
        agent: nested_agent,
        ctx: p.ctx.clone(),
        sequencer: p.sequencer.clone(),
        children: p.children.clone(),
        run_id: child_run_id,
        session_id: p.session_id.clone(),
        turn_id: p.turn_id.clone(),
        labels: p.labels.clone(),
        parent: Some(ParentLink {
            run_id: p.run_id.clone(),
            call_id: invocation.call_id.clone(),
        }),
    };

    // Boxed to break the async recursion run_loop -> here -> run_loop.
    let nested_run: Pin<Box<dyn Future<Output = Result<RunOutput>> + Send + '_>> =
        Box::pin(run_loop(&nested, nested_messages));
    let output = nested_run.await;

    match output {
        Ok(output) => {
            let final_text = output.final_response.unwrap_or_default();
            let value = finalize_value(spec, &final_text);
            match spec.result_codec.encode(&value) {
                Ok(encoded) => Ok(ToolResult::ok(
                    invocation.call_id.clone(),
                    spec.id.clone(),
                    encoded,
                )),
                Err(e) => Ok(ToolResult::failed(
                    invocation.call_id.clone(),
                    spec.id.clone(),
                    e,
                )),
            }
        }
        // Infrastructure failures take the whole run down; agent-level
        // failures become a failed tool result the parent planner sees.
        Err(e) if matches!(e.kind, ErrorKind::StoreFailure | ErrorKind::EngineFailure) => Err(e),
        Err(e) => Ok(ToolResult::failed(
            invocation.call_id.clone(),
            spec.id.clone(),
            e,
        )),
    }
}

fn initial_messages(spec: &ToolSpec, payload: &Value) -> Vec<Message> {
    let (system_prompt, user_text) = match &spec.agent_prompt {
        Some(prompt) => {
            let user_text = if let Some(text) = &prompt.text {
                text.clone()
            } else if let Some(template) = &prompt.template {
                template.render(payload)
            } else {
                payload.to_string()
            };
            (prompt.system_prompt.clone(), user_text)
        }
        None => (String::new(), payload.to_string()),
    };
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.push(Message::user(user_text));
    messages
}

fn finalize_value(spec: &ToolSpec, final_text: &str) -> Value {
    match spec.agent_prompt.as_ref().and_then(|p| p.finalizer.as_ref()) {
        Some(template) => {
            Value::String(template.render(&serde_json::json!({ "final": final_text })))
        }
        None => Value::String(final_text.to_owned()),
    }
}
