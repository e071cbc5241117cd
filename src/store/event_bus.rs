//! Event Bus
//!
//! Fans out events produced while applying write commands to every
//! subscriber of the storage event stream.

use tokio::sync::broadcast;

/// Broadcasts applied-state events to subscribers.
///
/// Slow subscribers lose the oldest events once their buffer is full; the
/// replicated keyspace stays the source of truth.
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: E) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Publish events in order, returning the total number of deliveries
    pub fn publish_batch(&self, events: Vec<E>) -> usize {
        events.into_iter().map(|event| self.publish(event)).sum()
    }

    /// Receive all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestEvent {
        Loaded { id: u64 },
        Removed { id: u64 },
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = TestEvent::Loaded { id: 1 };
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus: EventBus<TestEvent> = EventBus::new(10);
        assert_eq!(bus.publish(TestEvent::Loaded { id: 1 }), 0);
    }

    #[tokio::test]
    async fn test_event_bus_publish_batch_keeps_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        let events = vec![TestEvent::Loaded { id: 1 }, TestEvent::Removed { id: 1 }];
        assert_eq!(bus.publish_batch(events.clone()), 2);

        for expected in events {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_event_bus_subscriber_drop() {
        let bus = EventBus::new(10);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.publish(TestEvent::Removed { id: 3 }), 1);
    }
}
