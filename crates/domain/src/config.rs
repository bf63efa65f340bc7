//! Runtime configuration.
//!
//! Serde structs with per-field defaults so a sparse TOML (or none at all)
//! yields a working kernel.

use serde::{Deserialize, Serialize};

use crate::reminder::Reminder;
use crate::run::RunPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    /// Reminders injected around the transcript before planner calls.
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_25")]
    pub max_tool_calls: u32,
    #[serde(default = "d_3")]
    pub max_consecutive_failures: u32,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    /// Explicit allowlist. Empty means every registered tool is allowed.
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: d_25(),
            max_consecutive_failures: d_3(),
            time_budget_ms: None,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

impl PolicyConfig {
    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            max_tool_calls: self.max_tool_calls,
            max_consecutive_failures: self.max_consecutive_failures,
            time_budget_ms: self.time_budget_ms,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream gating
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "d_true")]
    pub thoughts: bool,
    #[serde(default = "d_true")]
    pub tool_events: bool,
    #[serde(default = "d_true")]
    pub assistant: bool,
    #[serde(default = "d_true")]
    pub usage: bool,
    #[serde(default = "d_true")]
    pub workflow: bool,
    #[serde(default = "d_140")]
    pub preview_max_chars: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            thoughts: true,
            tool_events: true,
            assistant: true,
            usage: true,
            workflow: true,
            preview_max_chars: d_140(),
        }
    }
}

fn d_25() -> u32 {
    25
}
fn d_3() -> u32 {
    3
}
fn d_140() -> usize {
    140
}
fn d_true() -> bool {
    true
}
