//! Child tracker.
//!
//! Per parent tool call, the set of discovered child call ids and the
//! last announced total. Announcements are batched: after a nested turn
//! schedules its calls, one `ToolCallUpdated{expected_children_total}` is
//! emitted if the total grew. Consumers count completed child results
//! against the running total; no "X of Y" events exist.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ChildSet {
    discovered: HashSet<String>,
    last_announced: usize,
}

#[derive(Debug, Default)]
pub struct ChildTracker {
    parents: Mutex<HashMap<String, ChildSet>>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered child. Idempotent per `(parent, child)` pair.
    pub fn record(&self, parent_call_id: &str, child_call_id: &str) {
        let mut parents = self.parents.lock();
        parents
            .entry(parent_call_id.to_owned())
            .or_default()
            .discovered
            .insert(child_call_id.to_owned());
    }

    /// Announce growth: when more children are discovered than last
    /// announced, advance the mark and return the new total.
    pub fn announce(&self, parent_call_id: &str) -> Option<usize> {
        let mut parents = self.parents.lock();
        let set = parents.get_mut(parent_call_id)?;
        if set.discovered.len() > set.last_announced {
            set.last_announced = set.discovered.len();
            Some(set.last_announced)
        } else {
            None
        }
    }

    pub fn discovered(&self, parent_call_id: &str) -> usize {
        self.parents
            .lock()
            .get(parent_call_id)
            .map(|set| set.discovered.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announces_batched_totals() {
        let tracker = ChildTracker::new();

        tracker.record("parent", "c1");
        tracker.record("parent", "c2");
        assert_eq!(tracker.announce("parent"), Some(2));

        // Nothing new: no announcement.
        assert_eq!(tracker.announce("parent"), None);

        tracker.record("parent", "c3");
        assert_eq!(tracker.announce("parent"), Some(3));
    }

    #[test]
    fn duplicate_children_are_counted_once() {
        let tracker = ChildTracker::new();
        tracker.record("parent", "c1");
        tracker.record("parent", "c1");
        assert_eq!(tracker.discovered("parent"), 1);
        assert_eq!(tracker.announce("parent"), Some(1));
    }

    #[test]
    fn unknown_parent_announces_nothing() {
        let tracker = ChildTracker::new();
        assert_eq!(tracker.announce("ghost"), None);
        assert_eq!(tracker.discovered("ghost"), 0);
    }
}
