// src/events.rs

//! Event bus (C9): synchronous publish/subscribe over the three lifecycle
//! topics. Generalizes the teacher's `ProgressTracker` trait family
//! (`CallbackProgress`/`SilentProgress`/`LogProgress`) from "one tracker
//! bound to one operation" to "any number of independent subscribers
//! watching every operation in a run" — the closer fit for an engine whose
//! callers may want to drive a UI, a log line, and a metrics counter off
//! the same run at once.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::op::OperationId;

/// A lifecycle event published by the executor.
#[derive(Debug, Clone)]
pub enum Event {
    Started {
        id: OperationId,
        type_tag: &'static str,
        path: PathBuf,
    },
    Completed {
        id: OperationId,
        type_tag: &'static str,
        path: PathBuf,
        duration: Duration,
    },
    Failed {
        id: OperationId,
        type_tag: &'static str,
        path: PathBuf,
        duration: Duration,
        error: String,
    },
}

impl Event {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            Event::Started { id, .. } | Event::Completed { id, .. } | Event::Failed { id, .. } => id,
        }
    }
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// A subscription handle. Dropping it does not unsubscribe; call
/// `EventBus::unsubscribe` explicitly. Unsubscribing twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Synchronous pub/sub bus. Publication happens on the executor's own
/// thread of control (§5: no internal concurrency), in mutation order, so
/// `Started` always precedes `Completed`/`Failed` for the same operation.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Handler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().unwrap().insert(id, handler);
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        self.handlers.lock().unwrap().remove(&subscription.0);
    }

    /// Publish an event to every current subscriber. A handler that panics
    /// is caught and logged — an observer must never fail the pipeline.
    pub fn publish(&self, event: Event) {
        let handlers: Vec<Handler> = self.handlers.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
            if outcome.is_err() {
                tracing::error!(
                    operation_id = %event.operation_id(),
                    "event handler panicked; continuing pipeline"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.handlers.lock().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        bus.subscribe(Arc::new(move |_event: &Event| {
            counted.fetch_add(1, Ordering::Relaxed);
        }));
        bus.publish(Event::Started {
            id: OperationId::new("op-1"),
            type_tag: "create_file",
            path: PathBuf::from("a.txt"),
        });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let sub = bus.subscribe(Arc::new(move |_event: &Event| {
            counted.fetch_add(1, Ordering::Relaxed);
        }));
        bus.unsubscribe(sub);
        bus.unsubscribe(sub);
        bus.publish(Event::Started {
            id: OperationId::new("op-1"),
            type_tag: "create_file",
            path: PathBuf::from("a.txt"),
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_other_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(|_event: &Event| {
            panic!("boom");
        }));
        let counted = count.clone();
        bus.subscribe(Arc::new(move |_event: &Event| {
            counted.fetch_add(1, Ordering::Relaxed);
        }));
        bus.publish(Event::Started {
            id: OperationId::new("op-1"),
            type_tag: "create_file",
            path: PathBuf::from("a.txt"),
        });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
