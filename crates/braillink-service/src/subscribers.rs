//! Registered subscribers and event delivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use braillink_protocol::{ServiceEvent, Subscriber, SubscriberId};
use tracing::{debug, info};

/// Subscribers keyed by id, delivered to in registration order.
///
/// A subscriber whose delivery fails is dropped on the spot.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: BTreeMap<SubscriberId, Arc<dyn Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber, replacing one registered under the same id.
    pub fn insert(&mut self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        if self.subscribers.insert(id, subscriber).is_none() {
            debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
        }
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver to one subscriber. Returns `false` if it was unreachable.
    pub fn send_to(&mut self, id: SubscriberId, event: &ServiceEvent) -> bool {
        let Some(subscriber) = self.subscribers.get(&id) else {
            return false;
        };
        if subscriber.deliver(event).is_ok() {
            return true;
        }
        self.prune(id);
        false
    }

    /// Deliver to every subscriber, returning how many received the event.
    pub fn broadcast(&mut self, event: &ServiceEvent) -> usize {
        self.broadcast_except(event, &[])
    }

    /// Deliver to every subscriber not listed in `skip`.
    pub fn broadcast_except(&mut self, event: &ServiceEvent, skip: &[SubscriberId]) -> usize {
        let mut delivered = 0;
        let mut unreachable = Vec::new();
        for (id, subscriber) in &self.subscribers {
            if skip.contains(id) {
                continue;
            }
            match subscriber.deliver(event) {
                Ok(()) => delivered += 1,
                Err(_) => unreachable.push(*id),
            }
        }

        for id in unreachable {
            self.prune(id);
        }
        delivered
    }

    fn prune(&mut self, id: SubscriberId) {
        self.subscribers.remove(&id);
        info!(subscriber = %id, "Dropped unreachable subscriber");
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("ids", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}
