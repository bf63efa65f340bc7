//! Reminder definitions.
//!
//! Reminders are system-message snippets injected around the transcript
//! before each planner call. Safety-tier reminders bypass the per-run cap
//! but still honor turn spacing; the injection rules live in the runtime's
//! reminder engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPriority {
    Safety,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderAttachment {
    RunStart,
    PerTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub text: String,
    #[serde(default = "d_priority")]
    pub priority: ReminderPriority,
    #[serde(default = "d_attachment")]
    pub attachment: ReminderAttachment,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_per_run: u32,
    #[serde(default)]
    pub min_turns_between: u32,
}

fn d_priority() -> ReminderPriority {
    ReminderPriority::Normal
}
fn d_attachment() -> ReminderAttachment {
    ReminderAttachment::PerTurn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_sorts_before_normal() {
        assert!(ReminderPriority::Safety < ReminderPriority::Normal);
    }

    #[test]
    fn defaults_apply_on_sparse_input() {
        let r: Reminder = serde_json::from_value(serde_json::json!({
            "id": "tone",
            "text": "be brief",
        }))
        .unwrap();
        assert_eq!(r.priority, ReminderPriority::Normal);
        assert_eq!(r.attachment, ReminderAttachment::PerTurn);
        assert_eq!(r.max_per_run, 0);
        assert_eq!(r.min_turns_between, 0);
    }
}
