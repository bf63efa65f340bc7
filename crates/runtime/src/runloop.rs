//! The run loop: plan, execute tools in parallel, resume, finalize.
//!
//! One loop iteration is a turn: policy decision, reminder injection,
//! planner call, validation, parallel dispatch, ordered collection,
//! accounting, termination checks. Nested agents reuse the same loop with
//! a shared sequencer and a parent link (see `agent_tool`).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use arbor_domain::hook::{HookEvent, HookKind};
use arbor_domain::message::{Message, Part, Role};
use arbor_domain::plan::{PlanRequest, ToolMetadata};
use arbor_domain::retry::RetryHint;
use arbor_domain::run::{RunInput, RunOutput, RunPhase, Usage};
use arbor_domain::tool::{tool_results_message, ToolInvocation, ToolResult};
use arbor_domain::trace::TraceEvent;
use arbor_domain::{Error, ErrorKind, Result};
use arbor_engine::{ActivityFuture, ActivityOptions, WorkflowCtx, WorkflowHandler};
use arbor_stores::memory::MemoryStore;
use arbor_stores::session::{SessionStatus, SessionStore};
use arbor_tools::{Codec, ToolRegistry, ToolSpec};

use crate::agent_tool;
use crate::agents::AgentRegistration;
use crate::children::ChildTracker;
use crate::ids;
use crate::policy::{PolicyEngine, PolicyInput, RunContext};
use crate::runtime::RuntimeInner;
use crate::sequencer::TurnSequencer;

/// Link from a nested run back to the parent call that spawned it.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub run_id: String,
    pub call_id: String,
}

#[derive(Clone)]
pub(crate) struct LoopParams {
    pub runtime: Arc<RuntimeInner>,
    pub agent: Arc<AgentRegistration>,
    pub ctx: Arc<dyn WorkflowCtx>,
    pub sequencer: Arc<TurnSequencer>,
    pub children: Arc<ChildTracker>,
    pub run_id: String,
    pub session_id: String,
    pub turn_id: String,
    pub labels: HashMap<String, String>,
    pub parent: Option<ParentLink>,
}

impl LoopParams {
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}

/// The workflow handler registered per agent.
pub(crate) struct RunWorkflow {
    pub runtime: Weak<RuntimeInner>,
    pub agent_id: String,
}

#[async_trait]
impl WorkflowHandler for RunWorkflow {
    async fn run(&self, ctx: Arc<dyn WorkflowCtx>, input: RunInput) -> Result<RunOutput> {
        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| Error::engine_failure("runtime dropped"))?;
        let agent = runtime
            .agents
            .read()
            .get(&self.agent_id)
            .cloned()
            .ok_or_else(|| Error::engine_failure(format!("unknown agent: {}", self.agent_id)))?;
        let params = LoopParams {
            runtime,
            agent,
            ctx,
            sequencer: Arc::new(TurnSequencer::new()),
            children: Arc::new(ChildTracker::new()),
            run_id: input.run_id.clone(),
            session_id: input.session_id.clone(),
            turn_id: input.turn_id.clone(),
            labels: input.labels.clone(),
            parent: None,
        };
        run_loop(&params, input.messages).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event emission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) async fn emit(p: &LoopParams, kind: HookKind) -> Result<()> {
    emit_for_run(p, p.run_id.clone(), kind).await
}

/// Emit under an explicit run id; child trackers announce parent updates
/// on the parent's run.
pub(crate) async fn emit_for_run(p: &LoopParams, run_id: String, kind: HookKind) -> Result<()> {
    let event = HookEvent {
        run_id,
        session_id: p.session_id.clone(),
        turn_id: p.turn_id.clone(),
        turn: p.sequencer.current_turn(),
        seq: p.sequencer.next_seq(),
        timestamp: p.ctx.now(),
        kind,
    };
    p.ctx.publish_hook(event).await
}

fn parent_call_id(p: &LoopParams) -> Option<String> {
    p.parent.as_ref().map(|link| link.call_id.clone())
}

fn record_child(p: &LoopParams, call_id: &str) {
    if let Some(parent) = &p.parent {
        p.children.record(&parent.call_id, call_id);
    }
}

async fn announce_children(p: &LoopParams) -> Result<()> {
    if let Some(parent) = &p.parent {
        if let Some(total) = p.children.announce(&parent.call_id) {
            emit_for_run(
                p,
                parent.run_id.clone(),
                HookKind::ToolCallUpdated {
                    call_id: parent.call_id.clone(),
                    expected_children_total: total,
                },
            )
            .await?;
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduling bookkeeping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct CallMeta {
    call_id: String,
    tool_name: String,
}

enum Pending {
    /// Rejected before execution (policy, unknown tool, codec failure,
    /// denied confirmation). No activity was spawned.
    Rejected(ToolResult),
    Future {
        meta: CallMeta,
        future: ActivityFuture<ToolResult>,
    },
    Inline {
        meta: CallMeta,
        spec: ToolSpec,
        invocation: ToolInvocation,
    },
    /// Executed outside the runtime; resolved via the external-tools
    /// signal channel.
    External { meta: CallMeta },
}

fn tool_candidates(runtime: &RuntimeInner, agent: &AgentRegistration) -> Vec<ToolMetadata> {
    let all = runtime.registry.metadata();
    if agent.tool_ids.is_empty() {
        all
    } else {
        all.into_iter()
            .filter(|metadata| agent.tool_ids.contains(&metadata.id))
            .collect()
    }
}

fn tool_options_for(
    runtime: &RuntimeInner,
    agent: &AgentRegistration,
    tool_id: &str,
) -> ActivityOptions {
    let queue_override = runtime
        .registry
        .toolset_for(tool_id)
        .and_then(|toolset| toolset.task_queue);
    let call = ActivityOptions {
        task_queue: queue_override,
        ..ActivityOptions::default()
    };
    call.merged_over(&agent.tool_options)
}

/// Canonicalize a success result through the tool's result codec. A
/// success carrying no result passes through untouched: the stream
/// subscriber rejects it and the fail-fast hook bus takes the run down
/// (strict contract).
fn validate_result(registry: &ToolRegistry, result: ToolResult) -> ToolResult {
    if result.is_error() {
        return result;
    }
    let Some(value) = result.result.clone() else {
        return result;
    };
    let call_id = result.call_id.clone();
    let tool_name = result.tool_name.clone();
    let Some(spec) = registry.spec(&tool_name) else {
        return result;
    };
    match spec.result_codec.decode(&value) {
        Ok(canonical) => {
            let mut result = result;
            result.result = Some(canonical);
            result
        }
        Err(e) => ToolResult::failed(call_id, tool_name, e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) async fn run_loop(p: &LoopParams, mut messages: Vec<Message>) -> Result<RunOutput> {
    let ctx = &p.ctx;
    let runtime: &RuntimeInner = &p.runtime;
    let agent: &AgentRegistration = &p.agent;
    let started = ctx.now();

    if !p.is_nested() {
        ctx.set_phase(RunPhase::Running);
        let status_ctx = ctx.clone();
        ctx.set_query_handler(
            "status",
            Arc::new(move || serde_json::json!({ "phase": status_ctx.phase().as_str() })),
        );
    }

    runtime
        .memory
        .append_messages(&p.run_id, messages.clone())
        .await?;

    emit(
        p,
        HookKind::RunStarted {
            agent_id: agent.agent_id.clone(),
            labels: p.labels.clone(),
        },
    )
    .await?;
    if !p.is_nested() {
        emit(
            p,
            HookKind::RunPhaseChanged {
                phase: RunPhase::Running,
            },
        )
        .await?;
    }
    TraceEvent::RunStarted {
        run_id: p.run_id.clone(),
        agent_id: agent.agent_id.clone(),
        workflow: agent.workflow_name.clone(),
    }
    .emit();

    let mut caps = agent.policy.initial_caps(started);
    let mut usage_total = Usage::default();
    let mut tool_events: Vec<ToolResult> = Vec::new();
    let mut last_results: Vec<ToolResult> = Vec::new();
    let mut last_requested: Vec<String> = Vec::new();
    let mut retry_hint: Option<RetryHint> = None;
    let mut local_turn: u64 = 0;

    loop {
        // ── Pause poll between turns ──────────────────────────────
        if !p.is_nested() {
            if let Some(_request) = ctx.signals().pause.try_recv() {
                ctx.set_phase(RunPhase::Paused);
                emit(
                    p,
                    HookKind::RunPhaseChanged {
                        phase: RunPhase::Paused,
                    },
                )
                .await?;
                tokio::select! {
                    resume = ctx.signals().resume.recv() => {
                        if let Some(resume) = resume {
                            if !resume.extra_messages.is_empty() {
                                messages.extend(resume.extra_messages.clone());
                                runtime
                                    .memory
                                    .append_messages(&p.run_id, resume.extra_messages)
                                    .await?;
                            }
                        }
                        ctx.set_phase(RunPhase::Running);
                        emit(p, HookKind::RunPhaseChanged { phase: RunPhase::Running }).await?;
                    }
                    _ = ctx.cancelled() => {
                        return finalize(
                            p,
                            started,
                            RunPhase::Canceled,
                            None,
                            Some(Error::canceled("run canceled while paused")),
                            tool_events,
                            usage_total,
                        )
                        .await;
                    }
                }
            }
        }
        if ctx.is_cancelled() {
            return finalize(
                p,
                started,
                RunPhase::Canceled,
                None,
                Some(Error::canceled("run canceled")),
                tool_events,
                usage_total,
            )
            .await;
        }

        let global_turn = p.sequencer.begin_turn();
        local_turn += 1;

        // ── 1. Policy turn ────────────────────────────────────────
        let candidates = tool_candidates(runtime, agent);
        let decision = runtime
            .policy
            .decide(PolicyInput {
                run: RunContext {
                    run_id: p.run_id.clone(),
                    session_id: p.session_id.clone(),
                    agent_id: agent.agent_id.clone(),
                    turn_id: p.turn_id.clone(),
                    turn: local_turn,
                },
                caps: caps.clone(),
                tools: candidates.clone(),
                requested: last_requested.clone(),
                retry_hint: retry_hint.clone(),
                labels: p.labels.clone(),
            })
            .await?;
        caps = decision.caps.clone();
        let allowed = if decision.disable_tools {
            Vec::new()
        } else {
            decision.allowed_tools.clone()
        };
        emit(
            p,
            HookKind::PolicyDecision {
                allowed_tools: allowed.clone(),
                remaining_tool_calls: caps.remaining_tool_calls,
            },
        )
        .await?;
        TraceEvent::PolicyDecided {
            run_id: p.run_id.clone(),
            turn: local_turn,
            requested: last_requested.len(),
            allowed: allowed.len(),
        }
        .emit();

        // ── 2. Reminder injection ─────────────────────────────────
        runtime.reminders.inject(&p.run_id, local_turn, &mut messages);

        // ── 3. Plan ───────────────────────────────────────────────
        let plan_request = PlanRequest {
            agent_id: agent.agent_id.clone(),
            run_id: p.run_id.clone(),
            session_id: p.session_id.clone(),
            turn_id: p.turn_id.clone(),
            turn: local_turn,
            messages: messages.clone(),
            tools: candidates,
            allowed_tools: allowed.clone(),
            tool_results: last_results.clone(),
            retry_hint: retry_hint.take(),
            caps: caps.clone(),
            labels: p.labels.clone(),
        };
        let activity = if local_turn == 1 {
            &agent.plan_activity
        } else {
            &agent.resume_activity
        };
        let plan = match ctx.execute_planner_activity(activity, plan_request).await {
            Ok(plan) => plan,
            Err(e) if e.kind == ErrorKind::Canceled => {
                return finalize(
                    p,
                    started,
                    RunPhase::Canceled,
                    None,
                    Some(e),
                    tool_events,
                    usage_total,
                )
                .await;
            }
            Err(e) => {
                return finalize(
                    p,
                    started,
                    RunPhase::Failed,
                    None,
                    Some(e),
                    tool_events,
                    usage_total,
                )
                .await;
            }
        };

        if let Some(turn_usage) = plan.usage {
            usage_total.add(turn_usage);
            emit(p, HookKind::UsageEvent { usage: turn_usage }).await?;
        }
        for note in &plan.notes {
            emit(p, HookKind::PlannerNote { text: note.clone() }).await?;
        }
        for thinking in &plan.thinking {
            emit(
                p,
                HookKind::ThinkingBlock {
                    thinking: thinking.clone(),
                },
            )
            .await?;
        }

        // ── 4. Interpret the plan ─────────────────────────────────
        if let Some(text) = plan.final_response.clone() {
            emit(p, HookKind::AssistantMessage { text: text.clone() }).await?;
            let reply = Message::assistant(text.clone());
            messages.push(reply.clone());
            runtime.memory.append_messages(&p.run_id, vec![reply]).await?;
            return finalize(
                p,
                started,
                RunPhase::Completed,
                Some(text),
                None,
                tool_events,
                usage_total,
            )
            .await;
        }

        if plan.tool_calls.is_empty() {
            // A planner asking a clarifying question blocks on the
            // clarification channel; anything else is a malformed plan.
            if let Some(hint) = plan.retry_hint.clone() {
                if let Some(question) = hint.clarifying_question.clone() {
                    emit(p, HookKind::RetryHint { hint: hint.clone() }).await?;
                    emit(
                        p,
                        HookKind::AwaitClarification {
                            question,
                            tool_call_id: None,
                        },
                    )
                    .await?;
                    tokio::select! {
                        answer = ctx.signals().clarification.recv() => {
                            if let Some(answer) = answer {
                                let message = Message::user(answer.answer);
                                messages.push(message.clone());
                                runtime
                                    .memory
                                    .append_messages(&p.run_id, vec![message])
                                    .await?;
                            }
                        }
                        _ = ctx.cancelled() => {
                            return finalize(
                                p,
                                started,
                                RunPhase::Canceled,
                                None,
                                Some(Error::canceled("run canceled awaiting clarification")),
                                tool_events,
                                usage_total,
                            )
                            .await;
                        }
                    }
                    retry_hint = Some(hint);
                    last_results = Vec::new();
                    last_requested = Vec::new();
                    continue;
                }
            }

            let hint = plan
                .retry_hint
                .clone()
                .unwrap_or_else(RetryHint::malformed_response);
            emit(p, HookKind::RetryHint { hint: hint.clone() }).await?;
            retry_hint = Some(hint);
            last_results = Vec::new();
            last_requested = Vec::new();
            // A contentless plan counts toward the failure cap so a
            // stuck planner cannot spin forever.
            caps.consecutive_failures += 1;
            if let Some(exit) = termination_error(p, &caps, &agent.policy) {
                return finalize(
                    p,
                    started,
                    RunPhase::Failed,
                    None,
                    Some(exit),
                    tool_events,
                    usage_total,
                )
                .await;
            }
            continue;
        }

        // ── 5 + 6. Validate and schedule in parallel ──────────────
        last_requested = plan
            .tool_calls
            .iter()
            .map(|call| call.tool_name.clone())
            .collect();
        let mut pending: Vec<Pending> = Vec::new();
        let mut assistant_parts: Vec<Part> = Vec::new();

        for (index, call) in plan.tool_calls.iter().enumerate() {
            let call_id = ids::tool_call_id(
                &p.run_id,
                &p.turn_id,
                global_turn,
                0,
                &call.tool_name,
                index,
            );
            assistant_parts.push(Part::ToolUse {
                tool_call_id: call_id.clone(),
                tool_name: call.tool_name.clone(),
                payload: call.payload.clone(),
            });

            // Allowlist rejection: no tool_start, immediate failed result.
            if !allowed.contains(&call.tool_name) {
                pending.push(Pending::Rejected(ToolResult::failed(
                    call_id,
                    call.tool_name.clone(),
                    Error::policy_denied(format!(
                        "tool not in this turn's allowlist: {}",
                        call.tool_name
                    )),
                )));
                continue;
            }
            let Some(spec) = runtime.registry.spec(&call.tool_name) else {
                pending.push(Pending::Rejected(ToolResult::failed(
                    call_id,
                    call.tool_name.clone(),
                    Error::unknown_tool(&call.tool_name),
                )));
                continue;
            };

            // Human confirmation gate.
            if spec.tags.iter().any(|tag| tag == "requires_confirmation") {
                emit(
                    p,
                    HookKind::AwaitConfirmation {
                        prompt: format!("allow {}?", spec.id),
                        tool_call_id: Some(call_id.clone()),
                    },
                )
                .await?;
                let approved = tokio::select! {
                    decision = ctx.signals().confirmation.recv() => {
                        decision.map(|d| d.approved).unwrap_or(false)
                    }
                    _ = ctx.cancelled() => false,
                };
                emit(
                    p,
                    HookKind::ToolAuthorization {
                        call_id: call_id.clone(),
                        tool_name: spec.id.clone(),
                        granted: approved,
                    },
                )
                .await?;
                if !approved {
                    pending.push(Pending::Rejected(ToolResult::failed(
                        call_id,
                        spec.id.clone(),
                        Error::policy_denied(format!("confirmation denied for {}", spec.id)),
                    )));
                    continue;
                }
            }

            // Decode to the canonical typed payload.
            let decoded = match spec.payload_codec.decode(&call.payload) {
                Ok(value) => value,
                Err(e) => {
                    // Scheduled, then immediately failed: the planner
                    // sees the structured schema error next turn.
                    emit(
                        p,
                        HookKind::ToolCallScheduled {
                            call_id: call_id.clone(),
                            tool_id: spec.id.clone(),
                            payload: call.payload.clone(),
                            parent_tool_call_id: parent_call_id(p),
                            display_hint: None,
                        },
                    )
                    .await?;
                    record_child(p, &call_id);
                    pending.push(Pending::Rejected(ToolResult::failed(
                        call_id,
                        spec.id.clone(),
                        e,
                    )));
                    continue;
                }
            };

            let display_hint = spec
                .call_hint_template
                .as_ref()
                .map(|template| template.render(&decoded));
            let invocation = ToolInvocation {
                call_id: call_id.clone(),
                tool_id: spec.id.clone(),
                payload: decoded,
                run_id: p.run_id.clone(),
                session_id: p.session_id.clone(),
                turn_id: p.turn_id.clone(),
                turn: global_turn,
                attempt: 0,
                parent_tool_call_id: parent_call_id(p),
                labels: p.labels.clone(),
            };
            emit(
                p,
                HookKind::ToolCallScheduled {
                    call_id: call_id.clone(),
                    tool_id: spec.id.clone(),
                    payload: invocation.payload.clone(),
                    parent_tool_call_id: invocation.parent_tool_call_id.clone(),
                    display_hint,
                },
            )
            .await?;
            record_child(p, &call_id);
            TraceEvent::ToolDispatched {
                run_id: p.run_id.clone(),
                call_id: call_id.clone(),
                tool_id: spec.id.clone(),
                inline: spec.is_agent_tool,
            }
            .emit();

            let meta = CallMeta {
                call_id,
                tool_name: spec.id.clone(),
            };
            if spec.is_agent_tool {
                pending.push(Pending::Inline {
                    meta,
                    spec,
                    invocation,
                });
            } else if spec.tags.iter().any(|tag| tag == "external") {
                pending.push(Pending::External { meta });
            } else {
                let options = tool_options_for(runtime, agent, &spec.id);
                let future =
                    ctx.execute_tool_activity_async(&agent.tool_activity, invocation, Some(options));
                pending.push(Pending::Future { meta, future });
            }
        }

        announce_children(p).await?;

        let external_ids: Vec<String> = pending
            .iter()
            .filter_map(|entry| match entry {
                Pending::External { meta } => Some(meta.call_id.clone()),
                _ => None,
            })
            .collect();
        if !external_ids.is_empty() {
            emit(
                p,
                HookKind::AwaitExternalTools {
                    call_ids: external_ids,
                },
            )
            .await?;
        }

        // ── 7. Collect in call order ──────────────────────────────
        let mut external_buffer: HashMap<String, ToolResult> = HashMap::new();
        let mut results: Vec<ToolResult> = Vec::new();
        for entry in pending {
            let raw = match entry {
                Pending::Rejected(result) => result,
                Pending::Future { meta, future } => match future.get().await {
                    Ok(result) => result,
                    Err(e) => ToolResult::failed(meta.call_id, meta.tool_name, e),
                },
                Pending::Inline {
                    meta: _,
                    spec,
                    invocation,
                } => agent_tool::execute_agent_inline(p, &spec, &invocation).await?,
                Pending::External { meta } => loop {
                    if let Some(result) = external_buffer.remove(&meta.call_id) {
                        break result;
                    }
                    tokio::select! {
                        set = ctx.signals().external_tools.recv() => match set {
                            Some(set) => {
                                for result in set.results {
                                    external_buffer.insert(result.call_id.clone(), result);
                                }
                            }
                            None => {
                                break ToolResult::failed(
                                    meta.call_id.clone(),
                                    meta.tool_name.clone(),
                                    Error::engine_failure("external-tools channel closed"),
                                );
                            }
                        },
                        _ = ctx.cancelled() => {
                            break ToolResult::failed(
                                meta.call_id.clone(),
                                meta.tool_name.clone(),
                                Error::canceled("run canceled"),
                            );
                        }
                    }
                },
            };

            let result = validate_result(&runtime.registry, raw);
            emit(
                p,
                HookKind::ToolResultReceived {
                    result: result.clone(),
                },
            )
            .await?;

            if result.counts_against_budget() {
                caps.remaining_tool_calls = caps.remaining_tool_calls.saturating_sub(1);
            }
            if result.counts_as_failure() {
                caps.consecutive_failures += 1;
            } else if !result.is_error() {
                caps.consecutive_failures = 0;
            }
            if retry_hint.is_none() {
                if let Some(error) = &result.error {
                    retry_hint = RetryHint::from_error(error, Some(&result.tool_name));
                }
            }
            results.push(result);
        }
        if let Some(hint) = &retry_hint {
            emit(p, HookKind::RetryHint { hint: hint.clone() }).await?;
        }

        // ── Transcript: tool_use message then its results ─────────
        let assistant_message = Message {
            role: Role::Assistant,
            parts: assistant_parts,
        };
        let results_message = tool_results_message(&results);
        messages.push(assistant_message.clone());
        messages.push(results_message.clone());
        runtime
            .memory
            .append_messages(&p.run_id, vec![assistant_message, results_message])
            .await?;

        tool_events.extend(results.clone());
        last_results = results;

        // ── 9. Termination checks ─────────────────────────────────
        if ctx.is_cancelled() {
            return finalize(
                p,
                started,
                RunPhase::Canceled,
                None,
                Some(Error::canceled("run canceled")),
                tool_events,
                usage_total,
            )
            .await;
        }
        if let Some(exit) = termination_error(p, &caps, &agent.policy) {
            return finalize(
                p,
                started,
                RunPhase::Failed,
                None,
                Some(exit),
                tool_events,
                usage_total,
            )
            .await;
        }
    }
}

/// Budget, deadline, and failure-cap checks (step 9).
fn termination_error(
    p: &LoopParams,
    caps: &arbor_domain::run::Caps,
    policy: &arbor_domain::run::RunPolicy,
) -> Option<Error> {
    if caps.deadline_passed(p.ctx.now()) {
        return Some(Error::deadline_exceeded("run time budget exhausted"));
    }
    if caps.consecutive_failures >= policy.max_consecutive_failures {
        return Some(
            Error::execution(format!(
                "{} consecutive failures reached the failure cap",
                caps.consecutive_failures
            ))
            .with_code("failure_cap"),
        );
    }
    if caps.exhausted() {
        return Some(Error::budget_exhausted("tool-call budget exhausted"));
    }
    None
}

async fn finalize(
    p: &LoopParams,
    started: chrono::DateTime<chrono::Utc>,
    phase: RunPhase,
    final_response: Option<String>,
    error: Option<Error>,
    tool_events: Vec<ToolResult>,
    usage: Usage,
) -> Result<RunOutput> {
    if !p.is_nested() {
        p.ctx.set_phase(phase);
    }
    emit(
        p,
        HookKind::RunCompleted {
            phase,
            final_response: final_response.clone(),
            error: error.clone(),
            usage,
        },
    )
    .await?;

    if !p.is_nested() {
        let run_id = p.run_id.clone();
        p.runtime
            .sessions
            .update(
                &p.session_id,
                Box::new(move |entry| {
                    if entry.active_run_id.as_deref() == Some(run_id.as_str()) {
                        entry.active_run_id = None;
                    }
                    entry.status = SessionStatus::Idle;
                }),
            )
            .await?;
        if !usage.is_zero() {
            p.runtime.sessions.record_usage(&p.session_id, usage).await?;
        }
        p.runtime.reminders.forget_run(&p.run_id);
    }

    let duration_ms = (p.ctx.now() - started).num_milliseconds().max(0) as u64;
    TraceEvent::RunFinished {
        run_id: p.run_id.clone(),
        phase: phase.to_string(),
        turns: p.sequencer.current_turn(),
        tool_calls: tool_events.len(),
        duration_ms,
    }
    .emit();

    match phase {
        RunPhase::Completed => Ok(RunOutput {
            final_response,
            tool_events,
            usage,
        }),
        _ => Err(error.unwrap_or_else(|| Error::execution("run terminated without a result"))),
    }
}
