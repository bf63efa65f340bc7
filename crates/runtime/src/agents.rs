//! Agent registrations.
//!
//! A registration binds a planner to its workflow and activity names,
//! the tools it may use, and its run policy. Registering an agent wires
//! the workflow, plan/resume activities, and tool dispatch onto the
//! engine.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_domain::run::RunPolicy;
use arbor_engine::ActivityOptions;

use crate::planner::Planner;

#[derive(Clone)]
pub struct AgentRegistration {
    /// Dotted `service.agent` id.
    pub agent_id: String,
    pub planner: Arc<dyn Planner>,
    pub workflow_name: String,
    pub plan_activity: String,
    pub resume_activity: String,
    pub tool_activity: String,
    pub task_queue: String,
    /// Tool ids this agent may use. Empty means every registered tool.
    pub tool_ids: Vec<String>,
    pub policy: RunPolicy,
    pub labels: HashMap<String, String>,
    /// DSL-derived options for planner activities.
    pub planner_options: ActivityOptions,
    /// Defaults for tool activities (per-toolset queues override).
    pub tool_options: ActivityOptions,
}

impl AgentRegistration {
    pub fn new(agent_id: impl Into<String>, planner: Arc<dyn Planner>) -> Self {
        let agent_id = agent_id.into();
        Self {
            workflow_name: format!("{agent_id}.run"),
            plan_activity: format!("{agent_id}.plan"),
            resume_activity: format!("{agent_id}.resume"),
            tool_activity: format!("{agent_id}.execute_tool"),
            task_queue: "default".into(),
            tool_ids: Vec::new(),
            policy: RunPolicy::default(),
            labels: HashMap::new(),
            planner_options: ActivityOptions::default(),
            tool_options: ActivityOptions::default(),
            agent_id,
            planner,
        }
    }

    pub fn with_tools(mut self, tool_ids: Vec<String>) -> Self {
        self.tool_ids = tool_ids;
        self
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_task_queue(mut self, queue: impl Into<String>) -> Self {
        self.task_queue = queue.into();
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}
