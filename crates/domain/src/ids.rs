//! Opaque identifier aliases and minting helpers.
//!
//! All ids are opaque strings. Agent ids are dotted `service.agent`; tool
//! ids are dotted `service.toolset.tool`. Tool-call ids are derived
//! deterministically by the runtime (see `arbor-runtime::ids`), never here.

use uuid::Uuid;

pub type RunId = String;
pub type SessionId = String;
pub type TurnId = String;
pub type ToolCallId = String;
pub type AgentId = String;
pub type ToolId = String;

/// Mint a fresh run id (`run_<uuid>`). Used only when the caller did not
/// supply one; replayed workflows always carry their original id.
pub fn mint_run_id() -> RunId {
    format!("run_{}", Uuid::new_v4().simple())
}

/// Mint a fresh session id.
pub fn mint_session_id() -> SessionId {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// Mint a fresh turn id.
pub fn mint_turn_id() -> TurnId {
    format!("turn_{}", Uuid::new_v4().simple())
}

/// The unqualified tail of a dotted id (`svc.ts.echo` -> `echo`).
///
/// Hint-template lookup falls back to the tail when the fully qualified id
/// has no entry.
pub fn tool_tail(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_tail_of_dotted_id() {
        assert_eq!(tool_tail("svc.ts.echo"), "echo");
        assert_eq!(tool_tail("echo"), "echo");
        assert_eq!(tool_tail(""), "");
    }

    #[test]
    fn minted_ids_are_prefixed_and_unique() {
        let a = mint_run_id();
        let b = mint_run_id();
        assert!(a.starts_with("run_"));
        assert_ne!(a, b);
    }
}
