//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`](crate::events::Event) to multiple
//! subscribers **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow.
//!
//! ```text
//! emit(&Event) ──► Arc<Event> ──┬─► [queue LogWriter] ─► worker ─► on_event()
//!                               └─► [queue custom]    ─► worker ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::Event;

use super::Subscribe;

/// Sending half of one subscriber's queue.
struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out over subscribers, one bounded queue and worker task each.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let (queues, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let queue = Queue {
                    name: sub.name(),
                    tx,
                };
                (queue, tokio::spawn(worker(sub, rx)))
            })
            .unzip();
        Self { queues, workers }
    }

    /// Queues `event` for every subscriber without waiting.
    ///
    /// A full or closed queue drops the event for that subscriber only.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for q in &self.queues {
            let why = match q.tx.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "queue full",
                Err(TrySendError::Closed(_)) => "worker closed",
            };
            tracing::warn!(
                subscriber = q.name,
                kind = ?event.kind,
                service = event.service.as_deref(),
                "dropped event: {why}"
            );
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }
}

/// Delivers queued events in order; a panicking handler loses only that event.
async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if handled.is_err() {
            tracing::error!(
                subscriber = sub.name(),
                seq = ev.seq,
                kind = ?ev.kind,
                "subscriber panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber_in_order() {
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![rec.clone(), Arc::new(Panicker)];
        let set = SubscriberSet::new(subs);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::ServiceLoaded));
        set.emit(&Event::new(EventKind::ServiceStarted));
        set.emit(&Event::new(EventKind::ServiceExited));
        set.shutdown().await;

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![
                EventKind::ServiceLoaded,
                EventKind::ServiceStarted,
                EventKind::ServiceExited
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_set() {
        let set = SubscriberSet::new(Vec::new());
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::AllExited));
        set.shutdown().await;
    }
}
