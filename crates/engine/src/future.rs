//! Activity futures: the handle a workflow holds while a parallel
//! activity is in flight.

use arbor_domain::{Error, Result};
use tokio::sync::oneshot;

/// A one-shot future for an activity result. `get` consumes the future;
/// `is_ready` polls without blocking.
pub struct ActivityFuture<T> {
    rx: Option<oneshot::Receiver<Result<T>>>,
    ready: Option<Result<T>>,
}

impl<T> ActivityFuture<T> {
    pub fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            rx: Some(rx),
            ready: None,
        }
    }

    /// A future that is already resolved. Used for validation failures
    /// detected before any task is spawned.
    pub fn resolved(value: Result<T>) -> Self {
        Self {
            rx: None,
            ready: Some(value),
        }
    }

    pub fn is_ready(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        let Some(rx) = self.rx.as_mut() else {
            return true;
        };
        match rx.try_recv() {
            Ok(value) => {
                self.ready = Some(value);
                self.rx = None;
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.ready = Some(Err(Error::engine_failure(
                    "activity task dropped its result",
                )));
                self.rx = None;
                true
            }
        }
    }

    pub async fn get(mut self) -> Result<T> {
        if let Some(value) = self.ready.take() {
            return value;
        }
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(Error::engine_failure("activity task dropped its result"))
            }),
            None => Err(Error::engine_failure("activity future already consumed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_when_sender_completes() {
        let (tx, rx) = oneshot::channel();
        let mut future: ActivityFuture<u32> = ActivityFuture::new(rx);
        assert!(!future.is_ready());
        tx.send(Ok(7)).unwrap();
        assert!(future.is_ready());
        assert_eq!(future.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropped_sender_is_engine_failure() {
        let (tx, rx) = oneshot::channel::<arbor_domain::Result<u32>>();
        let future = ActivityFuture::new(rx);
        drop(tx);
        let err = future.get().await.unwrap_err();
        assert_eq!(err.kind, arbor_domain::ErrorKind::EngineFailure);
    }

    #[tokio::test]
    async fn resolved_future_is_immediately_ready() {
        let mut future = ActivityFuture::resolved(Ok("done"));
        assert!(future.is_ready());
        assert_eq!(future.get().await.unwrap(), "done");
    }
}
