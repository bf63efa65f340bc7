//! Turn sequencer.
//!
//! A monotonic `(turn, seq)` clock per run. Every hook event carries the
//! pair, which is the canonical total order across parallel fan-out.
//! Nested agents share the parent's sequencer so their events interleave
//! deterministically with the parent's.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TurnSequencer {
    turn: AtomicU64,
    seq: AtomicU64,
}

impl TurnSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next turn: bumps the turn counter and resets the
    /// in-turn sequence.
    pub fn begin_turn(&self) -> u64 {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        self.seq.store(0, Ordering::SeqCst);
        turn
    }

    pub fn current_turn(&self) -> u64 {
        self.turn.load(Ordering::SeqCst)
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_resets_each_turn() {
        let sequencer = TurnSequencer::new();
        assert_eq!(sequencer.current_turn(), 0);

        assert_eq!(sequencer.begin_turn(), 1);
        assert_eq!(sequencer.next_seq(), 0);
        assert_eq!(sequencer.next_seq(), 1);

        assert_eq!(sequencer.begin_turn(), 2);
        assert_eq!(sequencer.next_seq(), 0);
    }

    #[test]
    fn turn_seq_pairs_are_lexicographically_increasing() {
        let sequencer = TurnSequencer::new();
        let mut clock = Vec::new();
        for _ in 0..3 {
            let turn = sequencer.begin_turn();
            for _ in 0..4 {
                clock.push((turn, sequencer.next_seq()));
            }
        }
        let mut sorted = clock.clone();
        sorted.sort();
        assert_eq!(clock, sorted);
        let unique: std::collections::HashSet<_> = clock.iter().collect();
        assert_eq!(unique.len(), clock.len());
    }
}
