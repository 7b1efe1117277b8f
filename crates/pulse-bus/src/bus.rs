//! The `EventBus` trait and the in-memory implementation.

use crate::topic::Topic;
use parking_lot::RwLock;
use pulse_core::BusEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A subscriber callback. Handlers run to completion on the publishing
/// thread; there are no suspension points inside a handler.
pub type EventHandler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Opaque subscription handle returned by [`EventBus::subscribe`].
///
/// Closure equality is not a thing in Rust, so unsubscription is keyed by
/// token instead of by handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    topic: Topic,
    id: u64,
}

impl SubscriptionToken {
    /// Topic this subscription is attached to.
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Minimal pub/sub seam between the aggregator and the host transport.
pub trait EventBus: Send + Sync {
    /// Register a handler for a topic.
    fn subscribe(&self, topic: Topic, handler: EventHandler) -> SubscriptionToken;

    /// Remove a previously registered handler. Unknown tokens are ignored.
    fn unsubscribe(&self, token: SubscriptionToken);

    /// Deliver an event to every handler of the topic, in subscription
    /// order.
    fn publish(&self, topic: Topic, event: &BusEvent);
}

/// In-process bus with synchronous delivery.
///
/// Handlers are invoked in subscription order on the caller's thread.
/// The handler table lock is not held while handlers run, so handlers may
/// publish further events (the aggregator publishes its status from inside
/// an ingest handler).
#[derive(Default)]
pub struct InMemoryBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<Topic, Vec<(u64, EventHandler)>>>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.handlers
            .read()
            .get(&topic)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl EventBus for InMemoryBus {
    fn subscribe(&self, topic: Topic, handler: EventHandler) -> SubscriptionToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((id, handler));
        trace!(%topic, id, "Subscribed");
        SubscriptionToken { topic, id }
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let mut handlers = self.handlers.write();
        if let Some(list) = handlers.get_mut(&token.topic) {
            list.retain(|(id, _)| *id != token.id);
            if list.is_empty() {
                handlers.remove(&token.topic);
            }
        }
    }

    fn publish(&self, topic: Topic, event: &BusEvent) {
        // Snapshot the handler list so delivery runs without the lock and
        // handlers can subscribe/publish reentrantly.
        let snapshot: Vec<EventHandler> = {
            let handlers = self.handlers.read();
            match handlers.get(&topic) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(event);
        }
    }
}
