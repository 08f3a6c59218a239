//! Headless, topic-based publish/subscribe bus for patrol status events.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others, and so that a slow or absent reporter never stalls the control
//! loop.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Status`] | State transitions, segment completions, re-plans |
//! | [`Topic::Safety`] | Verdict changes and safety halts |
//! | [`Topic::Telemetry`] | Position updates after each motion primitive |
//!
//! Every event is additionally mirrored on the global channel returned by
//! [`EventBus::subscribe`].

use patrol_types::{EventKind, PatrolEvent, StatusReporter};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Status,
    Safety,
    Telemetry,
}

impl Topic {
    /// The lane an event of `kind` is published on.
    pub fn for_kind(kind: EventKind) -> Topic {
        match kind {
            EventKind::VerdictChanged | EventKind::SafetyHalt => Topic::Safety,
            EventKind::PositionUpdate => Topic::Telemetry,
            EventKind::StateChanged
            | EventKind::SegmentCompleted
            | EventKind::RouteReplanned
            | EventKind::RouteCompleted => Topic::Status,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<PatrolEvent>,
    status: broadcast::Sender<PatrolEvent>,
    safety: broadcast::Sender<PatrolEvent>,
    telemetry: broadcast::Sender<PatrolEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        let (safety, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        Self {
            all,
            status,
            safety,
            telemetry,
        }
    }

    /// Publish `event` on its topic lane and on the global channel.
    ///
    /// Returns the number of receivers handed the event. Zero receivers is a
    /// normal condition, not an error.
    pub fn publish(&self, event: PatrolEvent) -> usize {
        let topic = Topic::for_kind(event.kind);
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_all = self.all.send(event).unwrap_or(0);
        trace!(?topic, receivers = on_topic + on_all, "event published");
        on_topic + on_all
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe(&self) -> broadcast::Receiver<PatrolEvent> {
        self.all.subscribe()
    }

    /// Subscribe to a single [`Topic`] lane.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<PatrolEvent> {
        match topic {
            Topic::Status => &self.status,
            Topic::Safety => &self.safety,
            Topic::Telemetry => &self.telemetry,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StatusReporter for EventBus {
    fn report(&self, event: PatrolEvent) {
        // Fire-and-forget: the receiver count is irrelevant to the loop.
        let _ = self.publish(event);
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<PatrolEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic, skipping over any events lost
    /// to lag.
    ///
    /// Returns `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<PatrolEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`][Self::recv]; `None` when nothing is
    /// queued.
    pub fn try_recv(&mut self) -> Option<PatrolEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_types::{EventPayload, HaltReason, Lifecycle, Pose};

    fn state_event() -> PatrolEvent {
        PatrolEvent::new(
            "patrol-middleware::test",
            EventPayload::StateChanged {
                from: Lifecycle::Idle,
                to: Lifecycle::Planning,
            },
        )
    }

    fn halt_event() -> PatrolEvent {
        PatrolEvent::new(
            "patrol-middleware::test",
            EventPayload::SafetyHalt {
                reason: HaltReason::Hardware,
            },
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(state_event()), 0);
    }

    #[tokio::test]
    async fn global_subscriber_sees_every_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let a = state_event();
        let b = halt_event();
        bus.publish(a.clone());
        bus.publish(b.clone());

        assert_eq!(rx.recv().await?.id, a.id);
        assert_eq!(rx.recv().await?.id, b.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut safety = bus.subscribe_to(Topic::Safety);

        bus.publish(state_event());

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), safety.recv()).await;
        assert!(result.is_err(), "Safety lane must not receive a Status event");
    }

    #[tokio::test]
    async fn halt_events_route_to_safety_lane() {
        let bus = EventBus::default();
        let mut safety = bus.subscribe_to(Topic::Safety);
        let halt = halt_event();
        bus.report(halt.clone());
        let got = safety.recv().await.expect("safety event");
        assert_eq!(got.id, halt.id);
        assert_eq!(safety.topic(), Topic::Safety);
    }

    #[test]
    fn position_updates_route_to_telemetry_lane() {
        let bus = EventBus::default();
        let mut telemetry = bus.subscribe_to(Topic::Telemetry);
        bus.report(PatrolEvent::new(
            "patrol-middleware::test",
            EventPayload::PositionUpdate {
                pose: Pose::new(1.0, 2.0, 0.0),
                primitive: "walk".into(),
            },
        ));
        assert!(telemetry.try_recv().is_some());
        assert!(telemetry.try_recv().is_none());
    }

    #[test]
    fn slow_subscriber_skips_lagged_events() {
        let bus = EventBus::new(4);
        let mut status = bus.subscribe_to(Topic::Status);
        for _ in 0..32 {
            bus.publish(state_event());
        }
        // Lag is absorbed; the newest buffered events are still delivered.
        let mut delivered = 0;
        while status.try_recv().is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 4);
    }
}
