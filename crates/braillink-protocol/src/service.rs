//! The seam between the display service and the processes that use it.
//!
//! [`DisplayService`] is what a client calls; [`Subscriber`] is what the
//! service calls back. Both are transport-agnostic: the service's own handle
//! implements [`DisplayService`] in-process, and the TCP transport provides
//! remote implementations of both sides.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::{ProtocolError, Result};
use crate::message::ServiceEvent;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Recipient of service broadcasts.
///
/// `deliver` must not block. Returning [`ProtocolError::Unreachable`] tells
/// the service to drop the subscriber.
pub trait Subscriber: Send + Sync + 'static {
    fn id(&self) -> SubscriberId;

    fn deliver(&self, event: &ServiceEvent) -> Result<()>;
}

/// Operations a client may invoke on the display service.
///
/// Every method only enqueues work; none waits for the display.
pub trait DisplayService: Send + Sync + 'static {
    fn register(&self, subscriber: Arc<dyn Subscriber>) -> Result<()>;

    fn unregister(&self, id: SubscriberId) -> Result<()>;

    fn display_dots(&self, pattern: &[u8]) -> Result<()>;

    fn poll(&self) -> Result<()>;
}

/// Subscriber that forwards every event into an unbounded channel.
///
/// Becomes unreachable once the receiver is dropped.
///
/// ```
/// use braillink_protocol::{ChannelSubscriber, ServiceEvent, Subscriber};
///
/// let (subscriber, mut events) = ChannelSubscriber::new();
/// subscriber.deliver(&ServiceEvent::progress(None)).unwrap();
/// assert_eq!(events.try_recv().unwrap(), ServiceEvent::progress(None));
///
/// drop(events);
/// assert!(subscriber.deliver(&ServiceEvent::progress(None)).is_err());
/// ```
#[derive(Debug)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: SubscriberId::next(),
                tx,
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, event: &ServiceEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| ProtocolError::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_ids_are_unique() {
        let a = SubscriberId::next();
        let b = SubscriberId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_channel_subscriber_unreachable_after_drop() {
        let (subscriber, rx) = ChannelSubscriber::new();
        drop(rx);
        let result = subscriber.deliver(&ServiceEvent::progress(Some("x".into())));
        assert!(matches!(result, Err(ProtocolError::Unreachable)));
    }
}
