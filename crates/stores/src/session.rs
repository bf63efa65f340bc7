//! Session store.
//!
//! Maps session ids to lifecycle state: status, labels, timestamps, the
//! currently active run, and cumulative token usage. The in-memory
//! implementation optionally flushes to a JSON file after each mutation.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use arbor_domain::run::Usage;
use arbor_domain::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_run_id: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl SessionEntry {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Active,
            labels: HashMap::new(),
            created_at: now,
            updated_at: now,
            active_run_id: None,
            usage: Usage::default(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, entry: SessionEntry) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionEntry>>;

    /// Closure-update an entry. Returns false when the session is unknown.
    async fn update(
        &self,
        session_id: &str,
        f: Box<dyn for<'a> FnOnce(&'a mut SessionEntry) + Send>,
    ) -> Result<bool>;

    /// Accumulate token usage onto a session.
    async fn record_usage(&self, session_id: &str, usage: Usage) -> Result<bool> {
        self.update(
            session_id,
            Box::new(move |entry| {
                entry.usage.add(usage);
            }),
        )
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemorySessions {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    flush_path: Option<PathBuf>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush the full session map to a JSON file after each mutation.
    pub fn with_flush(path: impl Into<PathBuf>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            flush_path: Some(path.into()),
        }
    }

    /// Fetch or create a session. Returns `(entry, is_new)`.
    pub fn resolve_or_create(&self, session_id: &str) -> (SessionEntry, bool) {
        {
            let sessions = self.sessions.read();
            if let Some(entry) = sessions.get(session_id) {
                return (entry.clone(), false);
            }
        }
        let entry = SessionEntry::new(session_id);
        self.sessions
            .write()
            .insert(session_id.to_owned(), entry.clone());
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "session flush failed");
        }
        (entry, true)
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.flush_path else {
            return Ok(());
        };
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)
            .map_err(|e| Error::store_failure(format!("serializing sessions: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn create(&self, entry: SessionEntry) -> Result<()> {
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&entry.session_id) {
                return Err(Error::store_failure(format!(
                    "session already exists: {}",
                    entry.session_id
                ))
                .with_code("session_exists"));
            }
            sessions.insert(entry.session_id.clone(), entry);
        }
        self.flush()
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionEntry>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn update(
        &self,
        session_id: &str,
        f: Box<dyn for<'a> FnOnce(&'a mut SessionEntry) + Send>,
    ) -> Result<bool> {
        let found = {
            let mut sessions = self.sessions.write();
            match sessions.get_mut(session_id) {
                Some(entry) => {
                    f(entry);
                    entry.updated_at = Utc::now();
                    true
                }
                None => false,
            }
        };
        if found {
            self.flush()?;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_update_round_trip() {
        let store = InMemorySessions::new();
        store.create(SessionEntry::new("sess_1")).await.unwrap();

        let entry = store.get("sess_1").await.unwrap().unwrap();
        assert_eq!(entry.status, SessionStatus::Active);
        assert!(entry.active_run_id.is_none());

        let found = store
            .update(
                "sess_1",
                Box::new(|entry| {
                    entry.active_run_id = Some("run_1".into());
                    entry.status = SessionStatus::Idle;
                }),
            )
            .await
            .unwrap();
        assert!(found);

        let entry = store.get("sess_1").await.unwrap().unwrap();
        assert_eq!(entry.active_run_id.as_deref(), Some("run_1"));
        assert_eq!(entry.status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = InMemorySessions::new();
        store.create(SessionEntry::new("sess_1")).await.unwrap();
        let err = store.create(SessionEntry::new("sess_1")).await.unwrap_err();
        assert_eq!(err.code, "session_exists");
    }

    #[tokio::test]
    async fn update_unknown_session_returns_false() {
        let store = InMemorySessions::new();
        let found = store
            .update("ghost", Box::new(|_| {}))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn record_usage_accumulates() {
        let store = InMemorySessions::new();
        store.create(SessionEntry::new("sess_1")).await.unwrap();
        store
            .record_usage(
                "sess_1",
                Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                },
            )
            .await
            .unwrap();
        store
            .record_usage(
                "sess_1",
                Usage {
                    input_tokens: 1,
                    output_tokens: 1,
                    total_tokens: 2,
                },
            )
            .await
            .unwrap();
        let entry = store.get("sess_1").await.unwrap().unwrap();
        assert_eq!(entry.usage.total_tokens, 17);
    }

    #[test]
    fn resolve_or_create_is_idempotent() {
        let store = InMemorySessions::new();
        let (first, is_new) = store.resolve_or_create("sess_1");
        assert!(is_new);
        let (second, is_new) = store.resolve_or_create("sess_1");
        assert!(!is_new);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn flush_writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = InMemorySessions::with_flush(&path);
        store.create(SessionEntry::new("sess_1")).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: HashMap<String, SessionEntry> = serde_json::from_str(&raw).unwrap();
        assert!(parsed.contains_key("sess_1"));
    }
}
