//! Shared harness for the end-to-end suites: a scripted planner, a
//! toolset exercising the interesting dispatch paths, and stream
//! assertion helpers.
//!
//! Each suite uses a different subset of the helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use arbor_domain::message::Message;
use arbor_domain::plan::{PlanRequest, PlanResult};
use arbor_domain::run::{RunInput, RunPhase, RunPolicy};
use arbor_domain::stream::{
    StreamEvent, StreamEventKind, StreamPayload, ToolEndPayload, ToolStartPayload,
    WorkflowPayload,
};
use arbor_domain::tool::{RequestedCall, ToolInvocation, ToolResult};
use arbor_domain::{Error, Result};
use arbor_engine::ActivityContext;
use arbor_runtime::{
    AgentRegistration, CollectorSink, Planner, Runtime, ScriptedPlanner, StreamProfile,
    Subscription,
};
use arbor_tools::{ToolExecutor, ToolSpec, ToolsetRegistration};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test toolset
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TestTools;

#[async_trait]
impl ToolExecutor for TestTools {
    async fn execute(
        &self,
        _ctx: ActivityContext,
        invocation: ToolInvocation,
    ) -> Result<ToolResult> {
        let call_id = invocation.call_id.clone();
        let tool_id = invocation.tool_id.clone();
        let payload = invocation.payload.clone();
        match tool_id.as_str() {
            "svc.ts.echo" => Ok(ToolResult::ok(
                call_id,
                tool_id,
                json!({ "out": payload["msg"].as_str().unwrap_or_default() }),
            )),
            "svc.ts.lookup" => Ok(ToolResult::ok(
                call_id,
                tool_id,
                json!({ "value": format!("value-of-{}", payload["id"].as_str().unwrap_or_default()) }),
            )),
            "svc.ts.danger" => Ok(ToolResult::ok(call_id, tool_id, json!({ "done": true }))),
            "svc.ts.guarded" => Ok(ToolResult::ok(call_id, tool_id, json!({ "done": true }))),
            "svc.ts.nap" => {
                let ms = payload["ms"].as_u64().unwrap_or(100);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ToolResult::ok(call_id, tool_id, json!({ "slept": ms })))
            }
            "svc.ts.slow" => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ToolResult::ok(call_id, tool_id, json!({ "done": true })))
            }
            "svc.ts.fail" => Err(Error::execution("tool blew up")),
            "svc.ts.offline" => Err(Error::tool_unavailable("backend offline")),
            // Violates the result contract: success with no result.
            "svc.ts.hollow" => Ok(ToolResult {
                call_id,
                tool_name: tool_id,
                result: None,
                error: None,
                elapsed_ms: 0,
            }),
            other => Err(Error::unknown_tool(other)),
        }
    }
}

fn object_schema(required: &[&str], properties: serde_json::Value) -> serde_json::Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

pub fn test_toolset() -> ToolsetRegistration {
    let specs = vec![
        ToolSpec::new(
            "svc.ts.echo",
            "Echo the message back",
            object_schema(&["msg"], json!({ "msg": { "type": "string" } })),
            object_schema(&["out"], json!({ "out": { "type": "string" } })),
        ),
        ToolSpec::new(
            "svc.ts.lookup",
            "Look up a record by id",
            object_schema(&["id"], json!({ "id": { "type": "string" } })),
            object_schema(&["value"], json!({ "value": { "type": "string" } })),
        )
        .with_call_hint("looking up {id}")
        .unwrap(),
        ToolSpec::new(
            "svc.ts.danger",
            "A tool most policies deny",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.guarded",
            "Needs human confirmation",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        )
        .with_tags(vec!["requires_confirmation".into()]),
        ToolSpec::new(
            "svc.ts.nap",
            "Sleep for the given milliseconds",
            object_schema(&[], json!({ "ms": { "type": "integer" } })),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.slow",
            "Takes far longer than any test budget",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.fail",
            "Always fails",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.offline",
            "Backend is down",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.hollow",
            "Reports success but returns no result",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        ),
        ToolSpec::new(
            "svc.ts.remote",
            "Executed outside the runtime",
            json!({ "type": "object" }),
            json!({ "type": "object" }),
        )
        .with_tags(vec!["external".into()]),
    ];
    ToolsetRegistration {
        name: "ts".into(),
        specs,
        execute: Arc::new(TestTools),
        task_queue: None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scripted planner that also records every request it receives.
pub struct RecordingPlanner {
    script: ScriptedPlanner,
    pub requests: Mutex<Vec<PlanRequest>>,
}

impl RecordingPlanner {
    pub fn new(script: Vec<PlanResult>) -> Self {
        Self {
            script: ScriptedPlanner::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<PlanRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Planner for RecordingPlanner {
    async fn plan_start(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult> {
        self.requests.lock().push(req.clone());
        self.script.plan_start(ctx, req).await
    }

    async fn plan_resume(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult> {
        self.requests.lock().push(req.clone());
        self.script.plan_resume(ctx, req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Harness {
    pub runtime: Runtime,
    pub sink: Arc<CollectorSink>,
    pub planner: Arc<RecordingPlanner>,
    _subscription: Subscription,
}

pub fn harness(script: Vec<PlanResult>) -> Harness {
    harness_with(
        script,
        arbor_domain::config::RuntimeConfig::default(),
        RunPolicy::default(),
    )
}

pub fn harness_with(
    script: Vec<PlanResult>,
    config: arbor_domain::config::RuntimeConfig,
    policy: RunPolicy,
) -> Harness {
    let runtime = Runtime::builder().config(config).build().unwrap();
    runtime.register_toolset(test_toolset()).unwrap();
    let planner = Arc::new(RecordingPlanner::new(script));
    runtime
        .register_agent(AgentRegistration::new("svc.agent", planner.clone()).with_policy(policy))
        .unwrap();
    let sink = Arc::new(CollectorSink::new());
    let subscription = runtime.attach_sink(sink.clone(), StreamProfile::default());
    Harness {
        runtime,
        sink,
        planner,
        _subscription: subscription,
    }
}

pub fn call(tool: &str, payload: serde_json::Value) -> RequestedCall {
    RequestedCall::new(tool, payload)
}

pub fn run_input(run_id: &str, text: &str) -> RunInput {
    RunInput {
        agent_id: "svc.agent".into(),
        run_id: run_id.into(),
        session_id: format!("sess_{run_id}"),
        turn_id: "turn_1".into(),
        messages: vec![Message::user(text)],
        labels: HashMap::new(),
        workflow_options: Default::default(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream assertions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn kinds(events: &[StreamEvent]) -> Vec<StreamEventKind> {
    events.iter().map(|e| e.kind).collect()
}

pub fn tool_starts(events: &[StreamEvent]) -> Vec<ToolStartPayload> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            StreamPayload::ToolStart(payload) => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

pub fn tool_ends(events: &[StreamEvent]) -> Vec<ToolEndPayload> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            StreamPayload::ToolEnd(payload) => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

pub fn workflow_phases(events: &[StreamEvent]) -> Vec<RunPhase> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            StreamPayload::Workflow(WorkflowPayload { phase, .. }) => Some(*phase),
            _ => None,
        })
        .collect()
}

pub fn assistant_replies(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            StreamPayload::AssistantReply(payload) => Some(payload.text.clone()),
            _ => None,
        })
        .collect()
}

/// Positions of the given kinds, for ordering assertions.
pub fn position_of(events: &[StreamEvent], kind: StreamEventKind) -> usize {
    events
        .iter()
        .position(|e| e.kind == kind)
        .unwrap_or_else(|| panic!("no {kind:?} event in stream"))
}

/// Poll until the closure holds or a few seconds pass.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
