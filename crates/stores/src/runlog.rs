//! Append-only per-run event log with cursor pagination.
//!
//! The run log is the canonical record: the store assigns a monotone
//! sequence per run, events carry the full hook payload verbatim as JSON,
//! and append failures fail the run. The in-memory implementation keeps a
//! vector per run and optionally mirrors every event to a JSONL file.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_domain::hook::HookEvent;
use arbor_domain::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEvent {
    pub run_id: String,
    /// Store-assigned monotone sequence within the run.
    #[serde(default)]
    pub seq: u64,
    /// Stable event kind name.
    pub kind: String,
    pub turn: u64,
    pub seq_in_turn: u64,
    pub timestamp: DateTime<Utc>,
    /// Full hook event, verbatim.
    pub payload: Value,
}

impl RunLogEvent {
    pub fn from_hook(event: &HookEvent) -> Result<Self> {
        Ok(Self {
            run_id: event.run_id.clone(),
            seq: 0,
            kind: event.kind.name().to_owned(),
            turn: event.turn,
            seq_in_turn: event.seq,
            timestamp: event.timestamp,
            payload: serde_json::to_value(event)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunLogPage {
    /// Oldest first.
    pub events: Vec<RunLogEvent>,
    /// Opaque cursor for the next page. `None` at the end of the log.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Append one event; the store assigns `seq`. Durable: a failure here
    /// fails the run.
    async fn append(&self, event: RunLogEvent) -> Result<()>;

    /// Page through a run's events oldest-first. `limit` must be positive;
    /// the cursor is opaque.
    async fn list(&self, run_id: &str, cursor: Option<&str>, limit: usize)
        -> Result<RunLogPage>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryRunLog {
    inner: RwLock<HashMap<String, Vec<RunLogEvent>>>,
    jsonl_path: Option<PathBuf>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every appended event to a JSONL file as well.
    pub fn with_jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            jsonl_path: Some(path.into()),
        }
    }

    fn persist(&self, event: &RunLogEvent) -> Result<()> {
        let Some(path) = &self.jsonl_path else {
            return Ok(());
        };
        let json = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }
}

#[async_trait]
impl RunLogStore for InMemoryRunLog {
    async fn append(&self, mut event: RunLogEvent) -> Result<()> {
        {
            let mut inner = self.inner.write();
            let log = inner.entry(event.run_id.clone()).or_default();
            event.seq = log.len() as u64;
            log.push(event.clone());
        }
        self.persist(&event)
    }

    async fn list(
        &self,
        run_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RunLogPage> {
        if limit == 0 {
            return Err(Error::store_failure("list limit must be positive")
                .with_code("invalid_limit"));
        }
        let start = match cursor {
            None | Some("") => 0usize,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| Error::store_failure("invalid cursor").with_code("invalid_cursor"))?,
        };
        let inner = self.inner.read();
        let Some(log) = inner.get(run_id) else {
            return Ok(RunLogPage::default());
        };
        if start >= log.len() {
            return Ok(RunLogPage::default());
        }
        let end = (start + limit).min(log.len());
        Ok(RunLogPage {
            events: log[start..end].to_vec(),
            next_cursor: (end < log.len()).then(|| end.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::hook::HookKind;

    fn hook(run_id: &str, turn: u64, seq: u64) -> HookEvent {
        HookEvent {
            run_id: run_id.into(),
            session_id: "sess_1".into(),
            turn_id: "turn_1".into(),
            turn,
            seq,
            timestamp: Utc::now(),
            kind: HookKind::PlannerNote {
                text: format!("note {turn}/{seq}"),
            },
        }
    }

    async fn fill(store: &InMemoryRunLog, run_id: &str, n: u64) {
        for i in 0..n {
            store
                .append(RunLogEvent::from_hook(&hook(run_id, 1, i)).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn append_assigns_monotone_seq() {
        let store = InMemoryRunLog::new();
        fill(&store, "run_1", 3).await;
        let page = store.list("run_1", None, 10).await.unwrap();
        let seqs: Vec<u64> = page.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn pagination_walks_the_log_oldest_first() {
        let store = InMemoryRunLog::new();
        fill(&store, "run_1", 5).await;

        let page1 = store.list("run_1", None, 2).await.unwrap();
        assert_eq!(page1.events.len(), 2);
        let cursor1 = page1.next_cursor.clone().unwrap();

        let page2 = store.list("run_1", Some(&cursor1), 2).await.unwrap();
        assert_eq!(page2.events.len(), 2);
        let cursor2 = page2.next_cursor.clone().unwrap();

        let page3 = store.list("run_1", Some(&cursor2), 2).await.unwrap();
        assert_eq!(page3.events.len(), 1);
        assert!(page3.next_cursor.is_none());

        assert_eq!(page1.events[0].seq, 0);
        assert_eq!(page3.events[0].seq, 4);
    }

    #[tokio::test]
    async fn cursor_past_end_returns_empty_page() {
        let store = InMemoryRunLog::new();
        fill(&store, "run_1", 2).await;
        let page = store.list("run_1", Some("99"), 5).await.unwrap();
        assert!(page.events.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn unknown_run_returns_empty_page() {
        let store = InMemoryRunLog::new();
        let page = store.list("run_missing", None, 5).await.unwrap();
        assert!(page.events.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let store = InMemoryRunLog::new();
        let err = store.list("run_1", None, 0).await.unwrap_err();
        assert_eq!(err.code, "invalid_limit");
    }

    #[tokio::test]
    async fn invalid_cursor_is_rejected() {
        let store = InMemoryRunLog::new();
        fill(&store, "run_1", 1).await;
        let err = store.list("run_1", Some("not-a-cursor"), 5).await.unwrap_err();
        assert_eq!(err.code, "invalid_cursor");
    }

    #[tokio::test]
    async fn runs_are_isolated() {
        let store = InMemoryRunLog::new();
        fill(&store, "run_a", 2).await;
        fill(&store, "run_b", 1).await;
        assert_eq!(store.list("run_a", None, 10).await.unwrap().events.len(), 2);
        assert_eq!(store.list("run_b", None, 10).await.unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn jsonl_mirror_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");
        let store = InMemoryRunLog::with_jsonl(&path);
        fill(&store, "run_1", 3).await;
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        let first: RunLogEvent = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first.run_id, "run_1");
        assert_eq!(first.kind, "planner_note");
    }

    #[tokio::test]
    async fn payload_is_verbatim_hook_json() {
        let store = InMemoryRunLog::new();
        let event = hook("run_1", 2, 7);
        store
            .append(RunLogEvent::from_hook(&event).unwrap())
            .await
            .unwrap();
        let page = store.list("run_1", None, 1).await.unwrap();
        let payload = &page.events[0].payload;
        assert_eq!(payload["type"], "planner_note");
        assert_eq!(payload["turn"], 2);
        assert_eq!(payload["seq"], 7);
    }
}
