//! Storage plug-points for the Arbor kernel.
//!
//! Three narrow store traits (run log, memory/transcript, sessions) with
//! in-memory reference implementations. The run log is the canonical,
//! append-only record of a run; memory holds the reconstructable
//! transcript; the session store tracks session lifecycle around runs.
//! Durable adapters implement the same traits out of tree.

pub mod memory;
pub mod runlog;
pub mod session;

pub use memory::{InMemoryMemory, MemoryEvent, MemoryStore, RunSnapshot};
pub use runlog::{InMemoryRunLog, RunLogEvent, RunLogPage, RunLogStore};
pub use session::{InMemorySessions, SessionEntry, SessionStatus, SessionStore};
