//! In-memory reference engine.
//!
//! Implements the full engine contract in-process: one spawned task per
//! workflow, activity timeout/retry, signal routing, cancellation fan-out
//! into in-flight activities, panic recovery, and phase tracking. It is
//! explicitly non-durable and non-deterministic; production deployments
//! use a durable adapter behind the same traits.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use arbor_domain::hook::HookEvent;
use arbor_domain::plan::{PlanRequest, PlanResult};
use arbor_domain::run::{RunInput, RunOutput, RunPhase};
use arbor_domain::tool::{ToolInvocation, ToolResult};
use arbor_domain::trace::TraceEvent;
use arbor_domain::{Error, ErrorKind, Result};

use crate::context::{
    ActivityContext, HookActivity, PlannerActivity, QueryHandler, ToolActivity, WorkflowCtx,
    WorkflowHandler,
};
use crate::engine::{WorkflowEngine, WorkflowHandle};
use crate::future::ActivityFuture;
use crate::options::{ActivityOptions, RetryPolicy, StartWorkflowRequest, WorkflowDefinition};
use crate::signals::{signal_pair, SignalChannels, SignalSenders};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InMemoryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
    planner_activities: RwLock<HashMap<String, (Arc<dyn PlannerActivity>, ActivityOptions)>>,
    tool_activities: RwLock<HashMap<String, (Arc<dyn ToolActivity>, ActivityOptions)>>,
    hook_activity: RwLock<Option<Arc<dyn HookActivity>>>,
    runs: RwLock<HashMap<String, Arc<RunShared>>>,
}

/// State shared between the handle, the workflow context, and the
/// supervisor task for one execution.
struct RunShared {
    run_id: String,
    workflow_id: String,
    phase: RwLock<RunPhase>,
    result_tx: watch::Sender<Option<Result<RunOutput>>>,
    senders: SignalSenders,
    cancel: CancellationToken,
    queries: RwLock<HashMap<String, QueryHandler>>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                workflows: RwLock::new(HashMap::new()),
                planner_activities: RwLock::new(HashMap::new()),
                tool_activities: RwLock::new(HashMap::new()),
                hook_activity: RwLock::new(None),
                runs: RwLock::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl WorkflowEngine for InMemoryEngine {
    fn register_workflow(&self, def: WorkflowDefinition) -> Result<()> {
        if def.name.is_empty() {
            return Err(Error::engine_failure("workflow name must not be empty"));
        }
        let mut workflows = self.inner.workflows.write();
        if workflows.contains_key(&def.name) {
            return Err(Error::engine_failure(format!(
                "workflow already registered: {}",
                def.name
            )));
        }
        workflows.insert(def.name.clone(), def);
        Ok(())
    }

    fn register_planner_activity(
        &self,
        name: &str,
        handler: Arc<dyn PlannerActivity>,
        defaults: ActivityOptions,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::engine_failure("activity name must not be empty"));
        }
        let mut activities = self.inner.planner_activities.write();
        if activities.contains_key(name) {
            return Err(Error::engine_failure(format!(
                "planner activity already registered: {name}"
            )));
        }
        activities.insert(name.to_owned(), (handler, defaults));
        Ok(())
    }

    fn register_tool_activity(
        &self,
        name: &str,
        handler: Arc<dyn ToolActivity>,
        defaults: ActivityOptions,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::engine_failure("activity name must not be empty"));
        }
        let mut activities = self.inner.tool_activities.write();
        if activities.contains_key(name) {
            return Err(Error::engine_failure(format!(
                "tool activity already registered: {name}"
            )));
        }
        activities.insert(name.to_owned(), (handler, defaults));
        Ok(())
    }

    fn register_hook_activity(&self, handler: Arc<dyn HookActivity>) -> Result<()> {
        *self.inner.hook_activity.write() = Some(handler);
        Ok(())
    }

    async fn start_workflow(&self, req: StartWorkflowRequest) -> Result<Arc<dyn WorkflowHandle>> {
        start_on(self.inner.clone(), req).await
    }

    async fn query_run_status(&self, run_id: &str) -> Result<RunPhase> {
        let runs = self.inner.runs.read();
        match runs.get(run_id) {
            Some(shared) => Ok(*shared.phase.read()),
            None => Err(Error::engine_failure(format!("unknown run: {run_id}"))),
        }
    }
}

async fn start_on(
    inner: Arc<EngineInner>,
    req: StartWorkflowRequest,
) -> Result<Arc<dyn WorkflowHandle>> {
    let def = inner
        .workflows
        .read()
        .get(&req.workflow)
        .cloned()
        .ok_or_else(|| Error::engine_failure(format!("unknown workflow: {}", req.workflow)))?;

    let run_id = if req.input.run_id.is_empty() {
        req.id.clone()
    } else {
        req.input.run_id.clone()
    };

    {
        let runs = inner.runs.read();
        if let Some(existing) = runs.get(&run_id) {
            if !existing.phase.read().is_terminal() {
                return Err(Error::engine_failure(format!(
                    "run already active: {run_id}"
                )));
            }
        }
    }

    let (senders, channels) = signal_pair();
    let (result_tx, _) = watch::channel(None);
    let shared = Arc::new(RunShared {
        run_id: run_id.clone(),
        workflow_id: req.id.clone(),
        phase: RwLock::new(RunPhase::Pending),
        result_tx,
        senders,
        cancel: CancellationToken::new(),
        queries: RwLock::new(HashMap::new()),
    });

    let ctx = Arc::new_cyclic(|weak: &Weak<InMemWorkflowCtx>| InMemWorkflowCtx {
        engine: inner.clone(),
        shared: shared.clone(),
        channels,
        self_ref: weak.clone(),
    });

    inner.runs.write().insert(run_id.clone(), shared.clone());

    let span = tracing::info_span!("workflow", run_id = %run_id, workflow = %req.workflow);
    let handler = def.handler.clone();
    let mut input = req.input.clone();
    input.run_id = run_id.clone();
    let run_timeout = req.run_timeout;
    let worker_ctx: Arc<dyn WorkflowCtx> = ctx.clone();

    let worker = tokio::spawn(
        async move {
            let fut = handler.run(worker_ctx, input);
            match run_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::deadline_exceeded("workflow run timeout exceeded")),
                },
                None => fut.await,
            }
        }
        .instrument(span),
    );

    let supervisor_shared = shared.clone();
    tokio::spawn(async move {
        let result = match worker.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(Error::engine_failure("workflow panicked"))
            }
            Err(_) => Err(Error::canceled("workflow task aborted")),
        };
        {
            let mut phase = supervisor_shared.phase.write();
            if !phase.is_terminal() {
                *phase = match &result {
                    Ok(_) => RunPhase::Completed,
                    Err(e) if e.kind == ErrorKind::Canceled => RunPhase::Canceled,
                    Err(_) => RunPhase::Failed,
                };
            }
        }
        // send_replace delivers even when no waiter has subscribed yet.
        supervisor_shared.result_tx.send_replace(Some(result));
    });

    Ok(Arc::new(InMemHandle { shared }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct InMemHandle {
    shared: Arc<RunShared>,
}

#[async_trait]
impl WorkflowHandle for InMemHandle {
    fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    async fn wait(&self) -> Result<RunOutput> {
        let mut rx = self.shared.result_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(Error::engine_failure(
                    "workflow task dropped without a result",
                ));
            }
        }
    }

    async fn signal(&self, name: &str, payload: Value) -> Result<()> {
        TraceEvent::SignalReceived {
            run_id: self.shared.run_id.clone(),
            signal: name.to_owned(),
        }
        .emit();
        self.shared.senders.route(name, payload).await
    }

    async fn cancel(&self) -> Result<()> {
        self.shared.cancel.cancel();
        Ok(())
    }

    async fn query(&self, name: &str) -> Result<Value> {
        let handler = self.shared.queries.read().get(name).cloned();
        match handler {
            Some(handler) => Ok(handler()),
            None => Err(Error::engine_failure(format!("no query handler: {name}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct InMemWorkflowCtx {
    engine: Arc<EngineInner>,
    shared: Arc<RunShared>,
    channels: SignalChannels,
    self_ref: Weak<InMemWorkflowCtx>,
}

impl InMemWorkflowCtx {
    fn self_arc(&self) -> Result<Arc<dyn WorkflowCtx>> {
        self.self_ref
            .upgrade()
            .map(|ctx| ctx as Arc<dyn WorkflowCtx>)
            .ok_or_else(|| Error::engine_failure("workflow context gone"))
    }
}

/// Shared timeout/retry/cancellation wrapper around one activity.
async fn run_activity<T, F, Fut>(
    run_id: &str,
    activity: &str,
    cancel: &CancellationToken,
    options: &ActivityOptions,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry = options.retry.clone().unwrap_or_else(RetryPolicy::none);
    let mut backoff = retry.initial_backoff;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let call = attempt_fn(attempt);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Error::canceled("run canceled")),
            result = async {
                match options.timeout {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::tool_timeout(format!(
                            "activity {activity} timed out after {limit:?}"
                        ))),
                    },
                    None => call.await,
                }
            } => result,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.kind == ErrorKind::Canceled => return Err(e),
            Err(e) if e.retryable && attempt < retry.max_attempts => {
                TraceEvent::ActivityRetried {
                    run_id: run_id.to_owned(),
                    activity: activity.to_owned(),
                    attempt,
                }
                .emit();
                tracing::warn!(activity, attempt, error = %e, "retrying activity");
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(retry.backoff_multiplier);
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl WorkflowCtx for InMemWorkflowCtx {
    fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    fn workflow_id(&self) -> &str {
        &self.shared.workflow_id
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    async fn cancelled(&self) {
        self.shared.cancel.cancelled().await;
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.shared.phase.write() = phase;
    }

    fn phase(&self) -> RunPhase {
        *self.shared.phase.read()
    }

    fn set_query_handler(&self, name: &str, handler: QueryHandler) {
        self.shared.queries.write().insert(name.to_owned(), handler);
    }

    async fn publish_hook(&self, event: HookEvent) -> Result<()> {
        let handler = self.engine.hook_activity.read().clone();
        let Some(handler) = handler else {
            tracing::debug!(run_id = %self.shared.run_id, "hook event dropped: no hook activity");
            return Ok(());
        };
        let ctx = ActivityContext {
            run_id: self.shared.run_id.clone(),
            workflow_id: self.shared.workflow_id.clone(),
            attempt: 1,
            workflow: self.self_arc()?,
        };
        handler.publish(ctx, event).await
    }

    async fn execute_planner_activity(
        &self,
        activity: &str,
        req: PlanRequest,
    ) -> Result<PlanResult> {
        let (handler, defaults) = self
            .engine
            .planner_activities
            .read()
            .get(activity)
            .cloned()
            .ok_or_else(|| {
                Error::engine_failure(format!("no planner activity registered: {activity}"))
            })?;
        let wf = self.self_arc()?;
        let shared = &self.shared;
        run_activity(&shared.run_id, activity, &shared.cancel, &defaults, |attempt| {
            let ctx = ActivityContext {
                run_id: shared.run_id.clone(),
                workflow_id: shared.workflow_id.clone(),
                attempt,
                workflow: wf.clone(),
            };
            let handler = handler.clone();
            let req = req.clone();
            async move { handler.plan(ctx, req).await }
        })
        .await
    }

    async fn execute_tool_activity(
        &self,
        activity: &str,
        invocation: ToolInvocation,
        options: Option<ActivityOptions>,
    ) -> Result<ToolResult> {
        self.execute_tool_activity_async(activity, invocation, options)
            .get()
            .await
    }

    fn execute_tool_activity_async(
        &self,
        activity: &str,
        invocation: ToolInvocation,
        options: Option<ActivityOptions>,
    ) -> ActivityFuture<ToolResult> {
        let Some((handler, defaults)) =
            self.engine.tool_activities.read().get(activity).cloned()
        else {
            return ActivityFuture::resolved(Err(Error::engine_failure(format!(
                "no tool activity registered: {activity}"
            ))));
        };
        let opts = match options {
            Some(call_opts) => call_opts.merged_over(&defaults),
            None => defaults,
        };
        let wf = match self.self_arc() {
            Ok(wf) => wf,
            Err(e) => return ActivityFuture::resolved(Err(e)),
        };
        let shared = self.shared.clone();
        let activity_name = activity.to_owned();
        let (tx, rx) = oneshot::channel();
        let span = tracing::Span::current();
        tokio::spawn(
            async move {
                let result = run_activity(
                    &shared.run_id,
                    &activity_name,
                    &shared.cancel,
                    &opts,
                    |attempt| {
                        let ctx = ActivityContext {
                            run_id: shared.run_id.clone(),
                            workflow_id: shared.workflow_id.clone(),
                            attempt,
                            workflow: wf.clone(),
                        };
                        let handler = handler.clone();
                        let invocation = invocation.clone();
                        async move { handler.execute(ctx, invocation).await }
                    },
                )
                .await;
                let _ = tx.send(result);
            }
            .instrument(span),
        );
        ActivityFuture::new(rx)
    }

    async fn start_child_workflow(
        &self,
        req: StartWorkflowRequest,
    ) -> Result<Arc<dyn WorkflowHandle>> {
        start_on(self.engine.clone(), req).await
    }

    fn signals(&self) -> &SignalChannels {
        &self.channels
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
