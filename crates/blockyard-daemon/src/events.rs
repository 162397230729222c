//! In-process run event bus
//!
//! Delivery is fire-and-forget and at-most-once. A subscriber that falls more
//! than the channel capacity behind skips the missed events.

use blockyard_types::{LogEntry, ProjectId, RunEvent, RunId, RunJob};
use std::future::Future;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast fan-out of [`RunEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers; having none is fine
    pub fn publish(&self, event: RunEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => trace!(event = name, receivers, "Run event published"),
            Err(_) => trace!(event = name, "Run event dropped, no subscribers"),
        }
    }

    pub fn publish_update(&self, run: &RunJob) {
        self.publish(RunEvent::RunUpdate {
            run: Box::new(run.clone()),
        });
    }

    pub fn publish_log(&self, run_id: RunId, project_id: &ProjectId, entry: LogEntry) {
        self.publish(RunEvent::RunLog {
            run_id,
            project_id: project_id.clone(),
            entry,
        });
    }

    /// Register a subscriber. The snapshot becomes its first `init` event.
    ///
    /// The receiver is attached before the snapshot is taken, so
    /// nothing published in between is lost; it may be seen twice.
    pub async fn subscribe<F, Fut>(&self, snapshot: F) -> Subscription
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<RunJob>>,
    {
        let rx = self.tx.subscribe();
        Subscription {
            init: Some(RunEvent::Init {
                runs: snapshot().await,
            }),
            rx: Some(rx),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One subscriber's view of the bus
#[derive(Debug)]
pub struct Subscription {
    init: Option<RunEvent>,
    rx: Option<broadcast::Receiver<RunEvent>>,
}

impl Subscription {
    /// Next event, starting with the `init` snapshot.
    ///
    /// Returns `None` once unsubscribed or when the bus is gone.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        if let Some(init) = self.init.take() {
            return Some(init);
        }
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "Subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Detach from the bus; calling it again is a no-op
    pub fn unsubscribe(&mut self) {
        self.init = None;
        self.rx = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.rx.is_some()
    }
}
