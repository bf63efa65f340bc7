//! Hook event bus.
//!
//! Typed, ordered, synchronous fan-out. Delivery order to a subscriber
//! equals publication order per run; the bus is safe for concurrent
//! publishes from different runs, and within a run the loop publishes
//! sequentially. Publication is fail-fast: the first subscriber error
//! aborts the publish and fails the run, preserving audit integrity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;

use arbor_domain::hook::HookEvent;
use arbor_domain::Result;

#[async_trait]
pub trait HookSubscriber: Send + Sync {
    fn name(&self) -> &str;
    async fn on_event(&self, event: &HookEvent) -> Result<()>;
}

#[derive(Default)]
pub struct HookBus {
    subscribers: RwLock<Vec<(u64, Arc<dyn HookSubscriber>)>>,
    next_id: AtomicU64,
}

/// Registration handle. Closing (or dropping) removes the subscriber.
pub struct Subscription {
    id: u64,
    bus: Weak<HookBus>,
}

impl Subscription {
    pub fn close(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self: &Arc<Self>, subscriber: Arc<dyn HookSubscriber>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(subscriber = subscriber.name(), id, "hook subscriber registered");
        self.subscribers.write().push((id, subscriber));
        Subscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.subscribers.write().retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver to every subscriber in registration order. Fail-fast.
    pub async fn publish(&self, event: &HookEvent) -> Result<()> {
        let subscribers: Vec<(u64, Arc<dyn HookSubscriber>)> =
            self.subscribers.read().clone();
        for (_, subscriber) in subscribers {
            if let Err(e) = subscriber.on_event(event).await {
                tracing::error!(
                    subscriber = subscriber.name(),
                    run_id = %event.run_id,
                    error = %e,
                    "hook subscriber failed; failing the run"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::hook::HookKind;
    use arbor_domain::Error;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct Recorder {
        name: String,
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl Recorder {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                seen: Mutex::new(Vec::new()),
                fail_on: None,
            })
        }

        fn failing_on(name: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                seen: Mutex::new(Vec::new()),
                fail_on: Some(text.into()),
            })
        }
    }

    #[async_trait]
    impl HookSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_event(&self, event: &HookEvent) -> Result<()> {
            if let HookKind::PlannerNote { text } = &event.kind {
                if self.fail_on.as_deref() == Some(text.as_str()) {
                    return Err(Error::store_failure("subscriber rejected event"));
                }
                self.seen.lock().push(text.clone());
            }
            Ok(())
        }
    }

    fn note(text: &str, seq: u64) -> HookEvent {
        HookEvent {
            run_id: "run_1".into(),
            session_id: "sess_1".into(),
            turn_id: "turn_1".into(),
            turn: 1,
            seq,
            timestamp: Utc::now(),
            kind: HookKind::PlannerNote { text: text.into() },
        }
    }

    #[tokio::test]
    async fn delivery_preserves_publication_order() {
        let bus = Arc::new(HookBus::new());
        let recorder = Recorder::new("rec");
        let _sub = bus.register(recorder.clone());

        for i in 0..5 {
            bus.publish(&note(&format!("n{i}"), i)).await.unwrap();
        }
        assert_eq!(
            recorder.seen.lock().clone(),
            vec!["n0", "n1", "n2", "n3", "n4"]
        );
    }

    #[tokio::test]
    async fn fail_fast_stops_later_subscribers() {
        let bus = Arc::new(HookBus::new());
        let failing = Recorder::failing_on("bad", "poison");
        let after = Recorder::new("after");
        let _sub1 = bus.register(failing);
        let _sub2 = bus.register(after.clone());

        bus.publish(&note("fine", 0)).await.unwrap();
        let err = bus.publish(&note("poison", 1)).await.unwrap_err();
        assert_eq!(err.kind, arbor_domain::ErrorKind::StoreFailure);

        // The subscriber registered after the failing one never saw the
        // poisoned event.
        assert_eq!(after.seen.lock().clone(), vec!["fine"]);
    }

    #[tokio::test]
    async fn closing_a_subscription_stops_delivery() {
        let bus = Arc::new(HookBus::new());
        let recorder = Recorder::new("rec");
        let sub = bus.register(recorder.clone());
        assert_eq!(bus.subscriber_count(), 1);

        sub.close();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&note("late", 0)).await.unwrap();
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters() {
        let bus = Arc::new(HookBus::new());
        {
            let _sub = bus.register(Recorder::new("scoped"));
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
