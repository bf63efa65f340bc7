//! The runtime facade.
//!
//! Owns the engine, registry, hook bus, policy, stores, and reminder
//! engine; wires agents onto the engine; exposes the run lifecycle
//! operations (`start_run`, pause/resume/cancel, signals, status).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use arbor_domain::config::RuntimeConfig;
use arbor_domain::ids;
use arbor_domain::plan::{PlanRequest, PlanResult};
use arbor_domain::run::{RunInput, RunOutput, RunPhase};
use arbor_domain::tool::{ToolInvocation, ToolResult};
use arbor_domain::{Error, Result};
use arbor_engine::{
    ActivityContext, ClarificationAnswer, ConfirmationDecision, HookActivity, InMemoryEngine,
    PauseRequest, PlannerActivity, ResumeRequest, StartWorkflowRequest, ToolActivity,
    ToolResultsSet, WorkflowDefinition, WorkflowEngine, WorkflowHandle, SIGNAL_CLARIFICATION,
    SIGNAL_CONFIRMATION, SIGNAL_EXTERNAL_TOOLS, SIGNAL_PAUSE, SIGNAL_RESUME,
};
use arbor_stores::memory::{InMemoryMemory, MemoryStore};
use arbor_stores::runlog::{InMemoryRunLog, RunLogStore};
use arbor_stores::session::{InMemorySessions, SessionEntry, SessionStatus, SessionStore};
use arbor_tools::{ToolExecutor, ToolRegistry, ToolsetRegistration};

use crate::agents::AgentRegistration;
use crate::hooks::{HookBus, HookSubscriber, Subscription};
use crate::planner::Planner;
use crate::policy::{AllowlistPolicy, PolicyEngine};
use crate::reminders::ReminderEngine;
use crate::runloop::RunWorkflow;
use crate::stream::{Sink, StreamProfile, StreamSubscriber};
use crate::subscribers::{MemorySubscriber, RunLogSubscriber};

pub(crate) struct RuntimeInner {
    pub engine: Arc<dyn WorkflowEngine>,
    pub registry: Arc<ToolRegistry>,
    pub bus: Arc<HookBus>,
    pub policy: Arc<dyn PolicyEngine>,
    pub memory: Arc<dyn MemoryStore>,
    pub run_log: Arc<dyn RunLogStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reminders: Arc<ReminderEngine>,
    pub agents: RwLock<HashMap<String, Arc<AgentRegistration>>>,
    pub handles: RwLock<HashMap<String, Arc<dyn WorkflowHandle>>>,
    pub config: RuntimeConfig,
    /// Standing run-log and memory subscriptions; dropping them would
    /// unregister the subscribers.
    _standing: Vec<Subscription>,
}

pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct RuntimeBuilder {
    engine: Option<Arc<dyn WorkflowEngine>>,
    policy: Option<Arc<dyn PolicyEngine>>,
    memory: Option<Arc<dyn MemoryStore>>,
    run_log: Option<Arc<dyn RunLogStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    config: Option<RuntimeConfig>,
}

impl RuntimeBuilder {
    pub fn engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn run_log_store(mut self, store: Arc<dyn RunLogStore>) -> Self {
        self.run_log = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let config = self.config.unwrap_or_default();
        let engine: Arc<dyn WorkflowEngine> = self
            .engine
            .unwrap_or_else(|| Arc::new(InMemoryEngine::new()));
        let policy: Arc<dyn PolicyEngine> = self
            .policy
            .unwrap_or_else(|| Arc::new(AllowlistPolicy::from_config(&config.policy)));
        let memory: Arc<dyn MemoryStore> =
            self.memory.unwrap_or_else(|| Arc::new(InMemoryMemory::new()));
        let run_log: Arc<dyn RunLogStore> = self
            .run_log
            .unwrap_or_else(|| Arc::new(InMemoryRunLog::new()));
        let sessions: Arc<dyn SessionStore> = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessions::new()));
        let reminders = Arc::new(ReminderEngine::new(config.reminders.clone()));

        let bus = Arc::new(HookBus::new());
        // Run log first: it is the canonical record, so its append
        // failure must abort before anything else observes the event.
        let standing = vec![
            bus.register(Arc::new(RunLogSubscriber::new(run_log.clone()))),
            bus.register(Arc::new(MemorySubscriber::new(memory.clone()))),
        ];
        engine.register_hook_activity(Arc::new(BusForwarder { bus: bus.clone() }))?;

        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                engine,
                registry: Arc::new(ToolRegistry::new()),
                bus,
                policy,
                memory,
                run_log,
                sessions,
                reminders,
                agents: RwLock::new(HashMap::new()),
                handles: RwLock::new(HashMap::new()),
                config,
                _standing: standing,
            }),
        })
    }
}

/// Bridges workflow hook publication onto the bus.
struct BusForwarder {
    bus: Arc<HookBus>,
}

#[async_trait]
impl HookActivity for BusForwarder {
    async fn publish(
        &self,
        _ctx: ActivityContext,
        event: arbor_domain::hook::HookEvent,
    ) -> Result<()> {
        self.bus.publish(&event).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Activity adapters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PlanStart {
    planner: Arc<dyn Planner>,
}

#[async_trait]
impl PlannerActivity for PlanStart {
    async fn plan(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult> {
        self.planner.plan_start(ctx, req).await
    }
}

struct PlanResume {
    planner: Arc<dyn Planner>,
}

#[async_trait]
impl PlannerActivity for PlanResume {
    async fn plan(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult> {
        self.planner.plan_resume(ctx, req).await
    }
}

/// Routes tool invocations to their toolset's execute function.
struct DispatchTool {
    registry: Arc<ToolRegistry>,
}

#[async_trait]
impl ToolActivity for DispatchTool {
    async fn execute(
        &self,
        ctx: ActivityContext,
        invocation: ToolInvocation,
    ) -> Result<ToolResult> {
        let Some(toolset) = self.registry.toolset_for(&invocation.tool_id) else {
            return Err(Error::unknown_tool(&invocation.tool_id));
        };
        let started = std::time::Instant::now();
        let mut result = toolset.execute.execute(ctx, invocation).await?;
        if result.elapsed_ms == 0 {
            result.elapsed_ms = started.elapsed().as_millis() as u64;
        }
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    // ── Observation ───────────────────────────────────────────────

    pub fn subscribe(&self, subscriber: Arc<dyn HookSubscriber>) -> Subscription {
        self.inner.bus.register(subscriber)
    }

    /// Attach a stream sink under a profile.
    pub fn attach_sink(&self, sink: Arc<dyn Sink>, profile: StreamProfile) -> Subscription {
        self.subscribe(Arc::new(StreamSubscriber::new(sink, profile)))
    }

    pub fn run_log(&self) -> Arc<dyn RunLogStore> {
        self.inner.run_log.clone()
    }

    pub fn memory(&self) -> Arc<dyn MemoryStore> {
        self.inner.memory.clone()
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.inner.sessions.clone()
    }

    pub fn reminders(&self) -> Arc<ReminderEngine> {
        self.inner.reminders.clone()
    }

    // ── Registration ──────────────────────────────────────────────

    pub fn register_toolset(&self, registration: ToolsetRegistration) -> Result<()> {
        self.inner.registry.register_toolset(registration)
    }

    pub fn lookup_toolset(&self, name: &str) -> Option<ToolsetRegistration> {
        self.inner.registry.lookup_toolset(name)
    }

    /// Register an agent: stores the registration and wires its
    /// workflow, plan/resume activities, and tool dispatch onto the
    /// engine.
    pub fn register_agent(&self, registration: AgentRegistration) -> Result<()> {
        if registration.agent_id.is_empty() {
            return Err(
                Error::execution("agent id must not be empty").with_code("invalid_registration")
            );
        }
        if self.inner.agents.read().contains_key(&registration.agent_id) {
            return Err(Error::execution(format!(
                "agent already registered: {}",
                registration.agent_id
            ))
            .with_code("invalid_registration"));
        }

        let registration = Arc::new(registration);
        self.inner.engine.register_workflow(WorkflowDefinition {
            name: registration.workflow_name.clone(),
            task_queue: registration.task_queue.clone(),
            handler: Arc::new(RunWorkflow {
                runtime: Arc::downgrade(&self.inner),
                agent_id: registration.agent_id.clone(),
            }),
        })?;
        self.inner.engine.register_planner_activity(
            &registration.plan_activity,
            Arc::new(PlanStart {
                planner: registration.planner.clone(),
            }),
            registration.planner_options.clone(),
        )?;
        self.inner.engine.register_planner_activity(
            &registration.resume_activity,
            Arc::new(PlanResume {
                planner: registration.planner.clone(),
            }),
            registration.planner_options.clone(),
        )?;
        self.inner.engine.register_tool_activity(
            &registration.tool_activity,
            Arc::new(DispatchTool {
                registry: self.inner.registry.clone(),
            }),
            registration.tool_options.clone(),
        )?;

        tracing::info!(
            agent_id = %registration.agent_id,
            workflow = %registration.workflow_name,
            tools = registration.tool_ids.len(),
            "registered agent"
        );
        self.inner
            .agents
            .write()
            .insert(registration.agent_id.clone(), registration);
        Ok(())
    }

    // ── Run lifecycle ─────────────────────────────────────────────

    pub async fn start_run(&self, mut input: RunInput) -> Result<Arc<dyn WorkflowHandle>> {
        let agent = self
            .inner
            .agents
            .read()
            .get(&input.agent_id)
            .cloned()
            .ok_or_else(|| {
                Error::execution(format!("unknown agent: {}", input.agent_id))
                    .with_code("unknown_agent")
            })?;

        if input.run_id.is_empty() {
            input.run_id = ids::mint_run_id();
        }
        if input.session_id.is_empty() {
            input.session_id = ids::mint_session_id();
        }
        if input.turn_id.is_empty() {
            input.turn_id = ids::mint_turn_id();
        }

        if self.inner.sessions.get(&input.session_id).await?.is_none() {
            let mut entry = SessionEntry::new(&input.session_id);
            entry.labels = input.labels.clone();
            self.inner.sessions.create(entry).await?;
        }
        let run_id = input.run_id.clone();
        self.inner
            .sessions
            .update(&input.session_id, {
                let run_id = run_id.clone();
                Box::new(move |entry| {
                    entry.active_run_id = Some(run_id);
                    entry.status = SessionStatus::Active;
                })
            })
            .await?;

        let request = StartWorkflowRequest {
            id: run_id.clone(),
            workflow: agent.workflow_name.clone(),
            task_queue: input
                .workflow_options
                .task_queue
                .clone()
                .or_else(|| Some(agent.task_queue.clone())),
            run_timeout: input
                .workflow_options
                .run_timeout_ms
                .map(Duration::from_millis),
            retry: None,
            input,
        };
        let handle = self.inner.engine.start_workflow(request).await?;
        self.inner
            .handles
            .write()
            .insert(run_id.clone(), handle.clone());
        Ok(handle)
    }

    fn handle(&self, run_id: &str) -> Result<Arc<dyn WorkflowHandle>> {
        self.inner
            .handles
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| {
                Error::execution(format!("unknown run: {run_id}")).with_code("unknown_run")
            })
    }

    pub async fn wait(&self, run_id: &str) -> Result<RunOutput> {
        self.handle(run_id)?.wait().await
    }

    pub async fn pause_run(&self, run_id: &str, request: PauseRequest) -> Result<()> {
        self.handle(run_id)?
            .signal(SIGNAL_PAUSE, serde_json::to_value(request)?)
            .await
    }

    pub async fn resume_run(&self, run_id: &str, request: ResumeRequest) -> Result<()> {
        self.handle(run_id)?
            .signal(SIGNAL_RESUME, serde_json::to_value(request)?)
            .await
    }

    pub async fn answer_clarification(
        &self,
        run_id: &str,
        answer: ClarificationAnswer,
    ) -> Result<()> {
        self.handle(run_id)?
            .signal(SIGNAL_CLARIFICATION, serde_json::to_value(answer)?)
            .await
    }

    pub async fn provide_external_results(
        &self,
        run_id: &str,
        results: ToolResultsSet,
    ) -> Result<()> {
        self.handle(run_id)?
            .signal(SIGNAL_EXTERNAL_TOOLS, serde_json::to_value(results)?)
            .await
    }

    pub async fn decide_confirmation(
        &self,
        run_id: &str,
        decision: ConfirmationDecision,
    ) -> Result<()> {
        self.handle(run_id)?
            .signal(SIGNAL_CONFIRMATION, serde_json::to_value(decision)?)
            .await
    }

    pub async fn cancel_run(&self, run_id: &str) -> Result<()> {
        self.handle(run_id)?.cancel().await
    }

    pub async fn query_run_status(&self, run_id: &str) -> Result<RunPhase> {
        self.inner.engine.query_run_status(run_id).await
    }
}
