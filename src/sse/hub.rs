//! Topic-partitioned fan-out to connected clients.
//!
//! Every subscriber owns a bounded receiver on one broadcast channel, so a
//! publish is a single enqueue regardless of how many clients are connected.
//! A subscriber that falls behind loses the overflowed messages; it never
//! holds up the publisher. Dropping a `Subscription` deregisters it.
//!
//! `agm-finished` travels on its own small channel so that timer traffic can
//! never push it out of a slow subscriber's buffer. It is delivered ahead of
//! anything still queued on the main channel.

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::sse::models::{HubEvent, Topic, TopicSet};

pub const DEFAULT_CAPACITY: usize = 256;

const TERMINAL_CAPACITY: usize = 4;

#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<HubEvent>,
    terminal: broadcast::Sender<HubEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        let (terminal, _rx) = broadcast::channel(TERMINAL_CAPACITY);
        Self { tx, terminal }
    }

    /// Publishes to every current subscriber and returns how many receivers
    /// the event was queued for.
    pub fn publish(&self, event: HubEvent) -> usize {
        let topic = event.topic();
        let channel = match topic {
            Topic::AgmFinished => &self.terminal,
            _ => &self.tx,
        };
        match channel.send(event) {
            Ok(receivers) => {
                trace!(topic = topic.as_str(), receivers, "published");
                receivers
            }
            // No one is listening.
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self, topics: TopicSet) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            terminal: self.terminal.subscribe(),
            topics,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<HubEvent>,
    terminal: broadcast::Receiver<HubEvent>,
    topics: TopicSet,
}

impl Subscription {
    /// Next event on a subscribed topic. Events on the main channel arrive in
    /// publish order. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<HubEvent> {
        let wants_terminal = self.topics.contains(Topic::AgmFinished);
        loop {
            let received = tokio::select! {
                biased;
                received = self.terminal.recv(), if wants_terminal => received,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(event) if self.topics.contains(event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, dropping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("broadcast hub closed");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyOverlay;
    use tokio::time::{Duration, timeout};

    fn finished(message: &str) -> HubEvent {
        HubEvent::AgmFinished {
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_topics_in_order() {
        let hub = BroadcastHub::new(16);
        let mut sub = hub.subscribe([Topic::AgmFinished].into_iter().collect());

        hub.publish(HubEvent::ProxyUpdated(ProxyOverlay::disabled()));
        hub.publish(finished("first"));
        hub.publish(HubEvent::Timer { remaining_seconds: 12 });
        hub.publish(finished("second"));

        for expected in ["first", "second"] {
            let event = timeout(Duration::from_millis(100), sub.next())
                .await
                .expect("timeout")
                .expect("hub closed");
            match event {
                HubEvent::AgmFinished { message } => assert_eq!(message, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let hub = BroadcastHub::new(16);
        let mut a = hub.subscribe(TopicSet::all());
        let mut b = hub.subscribe(TopicSet::all());

        assert_eq!(hub.publish(finished("bye")), 2);

        assert!(matches!(a.next().await, Some(HubEvent::AgmFinished { .. })));
        assert!(matches!(b.next().await, Some(HubEvent::AgmFinished { .. })));
    }

    #[tokio::test]
    async fn dropped_subscribers_are_deregistered() {
        let hub = BroadcastHub::new(16);
        let sub = hub.subscribe(TopicSet::all());
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(finished("nobody home")), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead_without_blocking_publisher() {
        let hub = BroadcastHub::new(2);
        let mut slow = hub.subscribe(TopicSet::all());

        for remaining in (0..10).rev() {
            hub.publish(HubEvent::Timer {
                remaining_seconds: remaining,
            });
        }

        match slow.next().await {
            Some(HubEvent::Timer { remaining_seconds }) => assert_eq!(remaining_seconds, 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn finish_notice_survives_a_lagged_timer_backlog() {
        let hub = BroadcastHub::new(2);
        let mut slow = hub.subscribe([Topic::AgmFinished].into_iter().collect());

        for remaining in (0..30).rev() {
            hub.publish(HubEvent::Timer {
                remaining_seconds: remaining,
            });
        }
        hub.publish(finished("thanks"));

        let event = timeout(Duration::from_millis(100), slow.next())
            .await
            .expect("timeout")
            .expect("hub closed");
        assert!(matches!(event, HubEvent::AgmFinished { message } if message == "thanks"));
    }
}
