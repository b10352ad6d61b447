//! Async event bus fanning `MetricEvent`s out to subscribers.
//!
//! Grounded on the teacher's `riptide-events::bus::EventBus`: a
//! `tokio::sync::broadcast` channel is the single producer-side ingress,
//! and each call to [`EventBus::subscribe`] hands back an independent
//! receiver so that per-subscriber delivery order is preserved (spec.md
//! §5 "Metric events are observed in ingest order by each subscriber").
//!
//! Unlike the teacher's version this bus has no handler registry or
//! routing table — spec.md's metrics collector is the bus's only
//! structural consumer, and additional subscribers (a live CLI tail, a
//! test harness) just call `subscribe()` directly. That removal is noted
//! in DESIGN.md.

use std::sync::Arc;

use lesca_types::MetricEvent;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity. A slow subscriber that falls behind by more
/// than this many events starts missing events (broadcast semantics);
/// the collector is expected to drain promptly since it only does an
/// in-memory bucket update per event.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Central publisher for `MetricEvent`s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<MetricEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Never blocks and
    /// never fails the caller: with no subscribers this is a no-op, and a
    /// lagging subscriber only affects that subscriber's own stream.
    pub fn publish(&self, event: MetricEvent) {
        trace!(kind = event.payload.kind_name(), "publishing metric event");
        // A send error here only means there are currently zero
        // subscribers; that is not a failure the producer (pool/breaker)
        // should ever observe.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to the event stream. Each subscriber gets its own
    /// receiver with ingest-order delivery independent of other
    /// subscribers.
    pub fn subscribe(&self) -> EventSubscription {
        debug!("new metric event subscriber attached");
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A subscriber's handle on the event stream.
pub struct EventSubscription {
    receiver: broadcast::Receiver<Arc<MetricEvent>>,
}

/// Outcome of a single `recv()` on a subscription, surfacing lag instead
/// of silently dropping it.
pub enum RecvOutcome {
    Event(Arc<MetricEvent>),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
    Closed,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> RecvOutcome {
        match self.receiver.recv().await {
            Ok(event) => RecvOutcome::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => RecvOutcome::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => RecvOutcome::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesca_types::MetricPayload;

    fn sample_event() -> MetricEvent {
        MetricEvent::new(
            1_000,
            Some("session-a".into()),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: true,
                pool_size: 2,
            },
        )
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(16);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.publish(sample_event());

        match sub1.recv().await {
            RecvOutcome::Event(e) => assert_eq!(e.session_name.as_deref(), Some("session-a")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match sub2.recv().await {
            RecvOutcome::Event(e) => assert_eq!(e.payload.kind_name(), "pool:acquire"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_lag_not_panic() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.publish(sample_event());
        }
        let mut saw_lag = false;
        for _ in 0..5 {
            if let RecvOutcome::Lagged(_) = sub.recv().await {
                saw_lag = true;
                break;
            }
        }
        assert!(saw_lag);
    }
}

impl std::fmt::Debug for RecvOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvOutcome::Event(e) => write!(f, "Event({})", e.payload.kind_name()),
            RecvOutcome::Lagged(n) => write!(f, "Lagged({n})"),
            RecvOutcome::Closed => write!(f, "Closed"),
        }
    }
}
