//! Deterministic id derivation.
//!
//! Tool-call ids are a function of `(run, turn id, turn, attempt, tool,
//! index)`, so replaying a workflow with the same input yields the same id
//! sequence. Nested run ids are likewise derived from the parent run and
//! the scheduling call.

use sha2::{Digest, Sha256};

fn short_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part);
    }
    hex::encode(hasher.finalize())[..16].to_owned()
}

pub fn tool_call_id(
    run_id: &str,
    turn_id: &str,
    turn: u64,
    attempt: u32,
    tool_name: &str,
    index: usize,
) -> String {
    format!(
        "tc_{}",
        short_digest(&[
            run_id.as_bytes(),
            turn_id.as_bytes(),
            &turn.to_be_bytes(),
            &attempt.to_be_bytes(),
            tool_name.as_bytes(),
            &(index as u64).to_be_bytes(),
        ])
    )
}

pub fn child_run_id(parent_run_id: &str, tool_name: &str, parent_call_id: &str) -> String {
    format!(
        "run_{}",
        short_digest(&[
            parent_run_id.as_bytes(),
            tool_name.as_bytes(),
            parent_call_id.as_bytes(),
        ])
    )
}
