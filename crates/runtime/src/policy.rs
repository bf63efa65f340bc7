//! Policy engine: the per-turn allowlist/caps decision.
//!
//! The runtime calls `decide` once per turn before scheduling. Calls
//! outside the decided allowlist are rejected before scheduling and become
//! failed results with `PolicyDenied`. A `restrict_to_tool` retry hint
//! collapses the next turn's allowlist to that single tool.

use std::collections::HashMap;

use async_trait::async_trait;

use arbor_domain::config::PolicyConfig;
use arbor_domain::plan::ToolMetadata;
use arbor_domain::retry::RetryHint;
use arbor_domain::run::Caps;
use arbor_domain::Result;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub turn_id: String,
    pub turn: u64,
}

#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub run: RunContext,
    pub caps: Caps,
    /// Candidate tools this agent could use.
    pub tools: Vec<ToolMetadata>,
    /// Tool names requested on the previous turn (empty on the first).
    pub requested: Vec<String>,
    pub retry_hint: Option<RetryHint>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed_tools: Vec<String>,
    pub caps: Caps,
    /// When set, the turn proceeds with no tools at all (plan-only).
    pub disable_tools: bool,
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn decide(&self, input: PolicyInput) -> Result<PolicyDecision>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reference engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Allow/deny list policy. An empty allow list means every candidate
/// tool is allowed.
#[derive(Debug, Clone, Default)]
pub struct AllowlistPolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl AllowlistPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            allow: config.allow.clone(),
            deny: config.deny.clone(),
        }
    }
}

#[async_trait]
impl PolicyEngine for AllowlistPolicy {
    async fn decide(&self, input: PolicyInput) -> Result<PolicyDecision> {
        let mut allowed: Vec<String> = input
            .tools
            .iter()
            .map(|tool| tool.id.clone())
            .filter(|id| self.allow.is_empty() || self.allow.contains(id))
            .filter(|id| !self.deny.contains(id))
            .collect();

        if let Some(hint) = &input.retry_hint {
            if let Some(only) = &hint.restrict_to_tool {
                allowed.retain(|id| id == only);
            }
        }

        tracing::debug!(
            run_id = %input.run.run_id,
            turn = input.run.turn,
            allowed = allowed.len(),
            candidates = input.tools.len(),
            "policy decision"
        );

        Ok(PolicyDecision {
            allowed_tools: allowed,
            caps: input.caps,
            disable_tools: false,
            labels: input.labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::retry::RetryReason;

    fn metadata(ids: &[&str]) -> Vec<ToolMetadata> {
        ids.iter()
            .map(|id| ToolMetadata {
                id: (*id).to_owned(),
                description: String::new(),
                tags: Vec::new(),
                payload_schema: serde_json::json!({}),
            })
            .collect()
    }

    fn input(tools: Vec<ToolMetadata>, retry_hint: Option<RetryHint>) -> PolicyInput {
        PolicyInput {
            run: RunContext {
                run_id: "run_1".into(),
                session_id: "sess_1".into(),
                agent_id: "svc.agent".into(),
                turn_id: "turn_1".into(),
                turn: 1,
            },
            caps: Caps {
                remaining_tool_calls: 10,
                consecutive_failures: 0,
                deadline: None,
            },
            tools,
            requested: Vec::new(),
            retry_hint,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn empty_allow_list_allows_all_candidates() {
        let policy = AllowlistPolicy::allow_all();
        let decision = policy
            .decide(input(metadata(&["svc.ts.a", "svc.ts.b"]), None))
            .await
            .unwrap();
        assert_eq!(decision.allowed_tools, vec!["svc.ts.a", "svc.ts.b"]);
        assert_eq!(decision.caps.remaining_tool_calls, 10);
    }

    #[tokio::test]
    async fn deny_list_removes_tools() {
        let policy = AllowlistPolicy::new(vec![], vec!["svc.ts.danger".into()]);
        let decision = policy
            .decide(input(metadata(&["svc.ts.safe", "svc.ts.danger"]), None))
            .await
            .unwrap();
        assert_eq!(decision.allowed_tools, vec!["svc.ts.safe"]);
    }

    #[tokio::test]
    async fn explicit_allow_list_filters() {
        let policy = AllowlistPolicy::new(vec!["svc.ts.a".into()], vec![]);
        let decision = policy
            .decide(input(metadata(&["svc.ts.a", "svc.ts.b"]), None))
            .await
            .unwrap();
        assert_eq!(decision.allowed_tools, vec!["svc.ts.a"]);
    }

    #[tokio::test]
    async fn restrict_to_tool_collapses_the_allowlist() {
        let policy = AllowlistPolicy::allow_all();
        let hint = RetryHint::new(RetryReason::MissingFields).restrict_to("svc.ts.b");
        let decision = policy
            .decide(input(metadata(&["svc.ts.a", "svc.ts.b"]), Some(hint)))
            .await
            .unwrap();
        assert_eq!(decision.allowed_tools, vec!["svc.ts.b"]);
    }
}
