//! Agent-as-tool composition: inline nested runs, child discovery, and
//! failure folding.

mod support;

use std::sync::Arc;

use serde_json::json;

use arbor_domain::plan::PlanResult;
use arbor_domain::run::RunPolicy;
use arbor_domain::stream::{StreamEventKind, StreamPayload};
use arbor_engine::WorkflowHandle;
use arbor_runtime::{agent_toolset_registration, AgentRegistration, AgentToolDef};
use arbor_stores::runlog::RunLogStore;
use arbor_tools::ToolSpec;

use support::*;

fn researcher_tool() -> ToolSpec {
    ToolSpec::agent_tool(
        "svc.ada.query",
        "Ask the research agent",
        "svc.researcher",
        json!({
            "type": "object",
            "properties": { "question": { "type": "string" } },
            "required": ["question"]
        }),
        json!({ "type": "string" }),
    )
}

fn register_researcher(
    h: &Harness,
    script: Vec<PlanResult>,
    policy: RunPolicy,
) -> Arc<RecordingPlanner> {
    let researcher = Arc::new(RecordingPlanner::new(script));
    h.runtime
        .register_agent(
            AgentRegistration::new("svc.researcher", researcher.clone()).with_policy(policy),
        )
        .unwrap();
    let registration = agent_toolset_registration(
        "ada",
        "you are a careful researcher",
        vec![AgentToolDef::with_template(researcher_tool(), "{question}")],
        None,
    )
    .unwrap();
    h.runtime.register_toolset(registration).unwrap();
    researcher
}

#[tokio::test]
async fn s5_agent_as_tool_with_child_discovery() {
    let h = harness(vec![
        PlanResult::calls(vec![call("svc.ada.query", json!({"question": "sizes?"}))]),
        PlanResult::final_text("parent done"),
    ]);
    let researcher = register_researcher(
        &h,
        vec![
            PlanResult::calls(vec![
                call("svc.ts.echo", json!({"msg": "a"})),
                call("svc.ts.echo", json!({"msg": "b"})),
            ]),
            PlanResult::calls(vec![call("svc.ts.echo", json!({"msg": "c"}))]),
            PlanResult::final_text("nested answer"),
        ],
        RunPolicy::default(),
    );

    let handle = h.runtime.start_run(run_input("run_s5", "ask ada")).await.unwrap();
    let output = handle.wait().await.unwrap();
    assert_eq!(output.final_response.as_deref(), Some("parent done"));

    let events = h.sink.events();
    let starts = tool_starts(&events);
    assert_eq!(starts.len(), 4, "parent call plus three children");
    let parent_call = starts[0].clone();
    assert_eq!(parent_call.tool_name, "svc.ada.query");
    assert_eq!(
        parent_call.display_hint, None,
        "agent tool has no call hint configured"
    );
    let children = &starts[1..];
    for child in children {
        assert_eq!(
            child.parent_tool_call_id.as_deref(),
            Some(parent_call.call_id.as_str())
        );
        assert_eq!(child.tool_name, "svc.ts.echo");
    }

    // tool_start(parent) -> child_run_linked -> tool_start(first child).
    let start_position = |call_id: &str| {
        events
            .iter()
            .position(|e| {
                matches!(&e.payload, StreamPayload::ToolStart(s) if s.call_id == call_id)
            })
            .unwrap_or_else(|| panic!("no tool_start for {call_id}"))
    };
    let linked_at = position_of(&events, StreamEventKind::ChildRunLinked);
    assert!(start_position(&parent_call.call_id) < linked_at);
    assert!(linked_at < start_position(&children[0].call_id));

    // Child discovery announcements grow 2 then 3.
    let updates: Vec<usize> = events
        .iter()
        .filter_map(|e| match &e.payload {
            StreamPayload::ToolUpdate(update) if update.call_id == parent_call.call_id => {
                Some(update.expected_children_total)
            }
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![2, 3]);

    // The parent's tool_end aggregates the nested final response and
    // comes after every child's end.
    let ends = tool_ends(&events);
    assert_eq!(ends.len(), 4);
    let end_position = |call_id: &str| {
        events
            .iter()
            .position(|e| {
                matches!(&e.payload, StreamPayload::ToolEnd(t) if t.call_id == call_id)
            })
            .unwrap_or_else(|| panic!("no tool_end for {call_id}"))
    };
    let parent_end = ends
        .iter()
        .find(|e| e.call_id == parent_call.call_id)
        .unwrap();
    assert_eq!(
        parent_end.result.as_ref().unwrap(),
        &serde_json::Value::String("nested answer".into())
    );
    for child in children {
        assert!(end_position(&child.call_id) < end_position(&parent_call.call_id));
    }

    // Nested runs have their own canonical log, keyed by the child run.
    let child_run_id = events
        .iter()
        .find_map(|e| match &e.payload {
            StreamPayload::ChildRunLinked(linked) => Some(linked.child_run_id.clone()),
            _ => None,
        })
        .unwrap();
    let child_page = h.runtime.run_log().list(&child_run_id, None, 500).await.unwrap();
    assert!(!child_page.events.is_empty());

    // The nested agent rendered its prompt template from the payload.
    let nested_requests = researcher.recorded();
    assert_eq!(nested_requests[0].messages.last().unwrap().text(), "sizes?");
    // Its caps are independent of the parent's budget.
    assert_eq!(nested_requests[0].caps.remaining_tool_calls, 25);

    // The parent burned exactly one tool call for the whole nested run.
    let parent_requests = h.planner.recorded();
    assert_eq!(parent_requests[1].caps.remaining_tool_calls, 24);
}

#[tokio::test]
async fn nested_failure_folds_into_a_failed_tool_result() {
    let h = harness(vec![
        PlanResult::calls(vec![call("svc.ada.query", json!({"question": "?"}))]),
        PlanResult::final_text("handled the failure"),
    ]);
    register_researcher(
        &h,
        vec![PlanResult::calls(vec![call("svc.ts.fail", json!({}))])],
        RunPolicy {
            max_consecutive_failures: 1,
            ..RunPolicy::default()
        },
    );

    let handle = h.runtime.start_run(run_input("run_nf", "go")).await.unwrap();
    let output = handle.wait().await.unwrap();
    assert_eq!(output.final_response.as_deref(), Some("handled the failure"));

    let events = h.sink.events();
    let parent_end = tool_ends(&events)
        .into_iter()
        .find(|e| e.tool_name == "svc.ada.query")
        .expect("parent tool_end");
    let error = parent_end.error.expect("nested failure surfaces");
    assert_eq!(error.code, "failure_cap");
}

#[tokio::test]
async fn nested_events_interleave_on_one_clock() {
    let h = harness(vec![
        PlanResult::calls(vec![call("svc.ada.query", json!({"question": "?"}))]),
        PlanResult::final_text("parent done"),
    ]);
    register_researcher(
        &h,
        vec![
            PlanResult::calls(vec![call("svc.ts.echo", json!({"msg": "x"}))]),
            PlanResult::final_text("nested done"),
        ],
        RunPolicy::default(),
    );

    let handle = h.runtime.start_run(run_input("run_clock2", "go")).await.unwrap();
    handle.wait().await.unwrap();

    // Parent and child events share one sequencer: merge both logs and
    // the (turn, seq) pairs must still be strictly increasing in
    // publication order. The parent log alone must be ordered too.
    let parent_page = h.runtime.run_log().list("run_clock2", None, 500).await.unwrap();
    let clock: Vec<(u64, u64)> = parent_page
        .events
        .iter()
        .map(|e| (e.turn, e.seq_in_turn))
        .collect();
    for pair in clock.windows(2) {
        assert!(pair[0] < pair[1], "parent clock went backwards: {pair:?}");
    }
}
