//! Built-in hook subscribers: canonical run log and memory transcript.
//!
//! Both are fail-fast: a store error aborts the publish and fails the
//! run, because the canonical log must not silently diverge from what
//! clients saw.

use std::sync::Arc;

use async_trait::async_trait;

use arbor_domain::hook::HookEvent;
use arbor_domain::Result;
use arbor_stores::memory::{MemoryEvent, MemoryStore};
use arbor_stores::runlog::{RunLogEvent, RunLogStore};

use crate::hooks::HookSubscriber;

/// Appends every hook event verbatim to the run log.
pub struct RunLogSubscriber {
    store: Arc<dyn RunLogStore>,
}

impl RunLogSubscriber {
    pub fn new(store: Arc<dyn RunLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HookSubscriber for RunLogSubscriber {
    fn name(&self) -> &str {
        "run_log"
    }

    async fn on_event(&self, event: &HookEvent) -> Result<()> {
        self.store.append(RunLogEvent::from_hook(event)?).await
    }
}

/// Projects transcript-relevant hook events into the memory store.
pub struct MemorySubscriber {
    store: Arc<dyn MemoryStore>,
}

impl MemorySubscriber {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HookSubscriber for MemorySubscriber {
    fn name(&self) -> &str {
        "memory"
    }

    async fn on_event(&self, event: &HookEvent) -> Result<()> {
        if let Some(memory_event) = MemoryEvent::from_hook(event) {
            self.store
                .append_events(&event.run_id, vec![memory_event])
                .await?;
        }
        Ok(())
    }
}
