//! Reminder engine.
//!
//! Injects system-message reminders around the transcript just before
//! each planner call. Run-start reminders merge into the leading system
//! message; per-turn reminders land next to the last user message without
//! ever splitting a tool_use/tool_result pair. Safety-tier reminders
//! bypass the per-run cap but still honor turn spacing.

use std::collections::HashMap;

use parking_lot::Mutex;

use arbor_domain::message::{Message, Part, Role};
use arbor_domain::reminder::{Reminder, ReminderAttachment, ReminderPriority};

#[derive(Debug, Clone, Copy, Default)]
struct ReminderState {
    emitted: u32,
    last_turn: Option<u64>,
}

#[derive(Default)]
pub struct ReminderEngine {
    reminders: Mutex<Vec<Reminder>>,
    /// run id -> reminder id -> counters. Counters survive config
    /// replacement (`add_reminder` with an existing id).
    state: Mutex<HashMap<String, HashMap<String, ReminderState>>>,
}

impl ReminderEngine {
    pub fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            reminders: Mutex::new(reminders),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace a reminder. Replacement preserves per-run emission
    /// counters (they are keyed by id, not by config).
    pub fn add_reminder(&self, reminder: Reminder) {
        let mut reminders = self.reminders.lock();
        if let Some(existing) = reminders.iter_mut().find(|r| r.id == reminder.id) {
            *existing = reminder;
        } else {
            reminders.push(reminder);
        }
    }

    pub fn remove_reminder(&self, id: &str) -> bool {
        let mut reminders = self.reminders.lock();
        let before = reminders.len();
        reminders.retain(|r| r.id != id);
        reminders.len() != before
    }

    /// Drop per-run counters once a run is finished.
    pub fn forget_run(&self, run_id: &str) {
        self.state.lock().remove(run_id);
    }

    /// Inject applicable reminders for this turn into `messages`.
    pub fn inject(&self, run_id: &str, turn: u64, messages: &mut Vec<Message>) {
        let (run_start, per_turn) = self.select(run_id, turn);

        if !run_start.is_empty() {
            let text = join_tagged(&run_start);
            match messages.first_mut() {
                Some(first) if first.role == Role::System => {
                    first.parts.insert(0, Part::Text { text });
                }
                _ => messages.insert(0, Message::system(text)),
            }
        }

        if !per_turn.is_empty() {
            let reminder = Message::system(join_tagged(&per_turn));
            match messages.iter().rposition(|m| m.role == Role::User) {
                None => messages.push(reminder),
                Some(idx) => {
                    // Never between a tool_use message and its results:
                    // a results-bearing user message keeps the reminder
                    // after it.
                    if messages[idx].has_tool_results() {
                        messages.insert(idx + 1, reminder);
                    } else {
                        messages.insert(idx, reminder);
                    }
                }
            }
        }
    }

    /// Pick the reminders that fire this turn, grouped by attachment,
    /// safety tier first and then by id, updating counters.
    fn select(&self, run_id: &str, turn: u64) -> (Vec<String>, Vec<String>) {
        let reminders = self.reminders.lock();
        let mut state = self.state.lock();
        let run_state = state.entry(run_id.to_owned()).or_default();

        let mut candidates: Vec<&Reminder> = reminders.iter().collect();
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let mut run_start = Vec::new();
        let mut per_turn = Vec::new();
        for reminder in candidates {
            if reminder.attachment == ReminderAttachment::RunStart && turn != 1 {
                continue;
            }
            let entry = run_state.entry(reminder.id.clone()).or_default();
            if let Some(last) = entry.last_turn {
                if turn.saturating_sub(last) < reminder.min_turns_between as u64 {
                    continue;
                }
            }
            let capped = reminder.max_per_run > 0 && entry.emitted >= reminder.max_per_run;
            if capped && reminder.priority != ReminderPriority::Safety {
                continue;
            }
            entry.emitted += 1;
            entry.last_turn = Some(turn);
            match reminder.attachment {
                ReminderAttachment::RunStart => run_start.push(reminder.text.clone()),
                ReminderAttachment::PerTurn => per_turn.push(reminder.text.clone()),
            }
        }
        (run_start, per_turn)
    }
}

fn join_tagged(texts: &[String]) -> String {
    texts
        .iter()
        .map(|text| wrap_tag(text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_tag(text: &str) -> String {
    if text.contains("<system-reminder>") {
        text.to_owned()
    } else {
        format!("<system-reminder>\n{text}\n</system-reminder>")
    }
}
