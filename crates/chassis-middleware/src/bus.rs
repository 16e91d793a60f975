//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  A slow subscriber lags and loses the oldest messages; the
//! publisher never waits.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::ComponentStatus`] | Change descriptors from the per-tick scan |
//! | [`Topic::Lifecycle`] | Board state transitions |
//! | [`Topic::Commands`] | Completion of tracked hardware writes |
//! | [`Topic::Alerts`] | FUP grants/reclaims, hardware faults |
//!
//! Every event is also mirrored on a firehose channel available through
//! [`EventBus::subscribe_all`].

use chassis_types::{ChassisError, Event, EventPayload};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ComponentStatus,
    Lifecycle,
    Commands,
    Alerts,
}

impl Topic {
    /// The lane an event payload belongs on by default.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::ComponentChanged(_) => Topic::ComponentStatus,
            EventPayload::LifecycleTransition { .. } => Topic::Lifecycle,
            EventPayload::CommandCompleted { .. } => Topic::Commands,
            EventPayload::FupGranted { .. }
            | EventPayload::FupReleased { .. }
            | EventPayload::HardwareFault { .. } => Topic::Alerts,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    component_status: broadcast::Sender<Event>,
    lifecycle: broadcast::Sender<Event>,
    commands: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        let (component_status, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            all,
            component_status,
            lifecycle,
            commands,
            alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel and the firehose.
    ///
    /// Returns the number of topic subscribers that were handed the event.
    /// `Ok(0)` when nobody is listening is a normal condition, not an error.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, ChassisError> {
        // Firehose delivery is best-effort; topic delivery is what we report.
        let _ = self.all.send(event.clone());
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "no subscribers on topic");
                Ok(0)
            }
        }
    }

    /// Publish `event` on the lane picked by [`Topic::for_payload`].
    pub fn publish(&self, event: Event) -> Result<usize, ChassisError> {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe_all(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.all.subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::ComponentStatus => &self.component_status,
            Topic::Lifecycle => &self.lifecycle,
            Topic::Commands => &self.commands,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receivers
// ---------------------------------------------------------------------------

/// An async receiver bound to one [`Topic`] channel, or to the firehose.
///
/// Obtained via [`EventBus::subscribe_to`] or [`EventBus::subscribe_all`].
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this channel.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv] but skips over lag, returning `None` only
    /// once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive of everything currently buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                }
                Err(_) => return out,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to; `None` for the firehose.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chassis_types::BoardState;

    fn lifecycle_event() -> Event {
        Event::new(
            "chassis-middleware::test",
            EventPayload::LifecycleTransition {
                from: BoardState::Activate,
                to: BoardState::Ready,
            },
        )
    }

    fn alert_event() -> Event {
        Event::new(
            "chassis-middleware::test",
            EventPayload::HardwareFault {
                component: "fan".into(),
                code: 3,
                message: "stalled".into(),
            },
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Lifecycle, lifecycle_event()).unwrap(), 0);
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub1 = bus.subscribe_to(Topic::Lifecycle);
        let mut sub2 = bus.subscribe_to(Topic::Lifecycle);

        let event = lifecycle_event();
        assert_eq!(bus.publish_to(Topic::Lifecycle, event.clone())?, 2);

        assert_eq!(sub1.recv().await?.id, event.id);
        assert_eq!(sub2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);

        bus.publish_to(Topic::Lifecycle, lifecycle_event())?;

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "Alerts subscriber must not receive a Lifecycle event");
        Ok(())
    }

    #[tokio::test]
    async fn firehose_sees_every_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut all = bus.subscribe_all();
        assert_eq!(all.topic(), None);

        bus.publish(lifecycle_event())?;
        bus.publish(alert_event())?;

        assert!(matches!(all.recv().await?.payload, EventPayload::LifecycleTransition { .. }));
        assert!(matches!(all.recv().await?.payload, EventPayload::HardwareFault { .. }));
        Ok(())
    }

    #[test]
    fn publish_routes_by_payload() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        bus.publish(alert_event()).unwrap();
        bus.publish(lifecycle_event()).unwrap();
        let got = alerts.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(bus.subscriber_count(Topic::Alerts), 1);
    }

    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::Lifecycle);
        for _ in 0..100 {
            let _ = bus.publish_to(Topic::Lifecycle, lifecycle_event());
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
        // `next` skips the lag and keeps delivering.
        assert!(slow.next().await.is_some());
    }
}
