//! Event bus fan-out with a bounded replay window.
//!
//! # Design
//! - Id assignment, buffering and broadcast happen under one lock, so the replay
//!   window is always ordered by id and a subscriber never sees an event twice.
//! - Replay is private to the reconnecting subscriber; live subscribers are not
//!   re-sent old events.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Item yielded to subscribers; an error means the subscriber lagged and missed events.
pub type EventStreamItem = Result<EventEnvelope, BroadcastStreamRecvError>;

/// Stream handed to subscribers: the replayed backlog followed by live events.
pub type EventStream = Pin<Box<dyn Stream<Item = EventStreamItem> + Send>>;

struct BusState {
    next_id: EventId,
    window: VecDeque<EventEnvelope>,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    state: Arc<Mutex<BusState>>,
    capacity: usize,
}

impl EventBus {
    /// Bus retaining at most `capacity` events for replay.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            state: Arc::new(Mutex::new(BusState {
                next_id: 1,
                window: VecDeque::with_capacity(capacity),
            })),
            capacity,
        }
    }

    /// Bus with [`DEFAULT_REPLAY_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to live events, first replaying retained events newer than
    /// `last_event_id` when one is given.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        let state = self.lock_state();
        let receiver = self.sender.subscribe();
        let backlog: Vec<EventEnvelope> = last_event_id
            .map(|last| Self::newer_than(&state, last))
            .unwrap_or_default();
        drop(state);

        let replayed = tokio_stream::iter(backlog.into_iter().map(Ok));
        Box::pin(replayed.chain(BroadcastStream::new(receiver)))
    }

    /// Publish `event` to every subscriber and return its id.
    ///
    /// Publishing never fails; with no subscribers the event is only retained
    /// for replay.
    #[must_use = "the id is needed to resume a subscription"]
    pub fn publish(&self, event: Event) -> EventId {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id = id.saturating_add(1);

        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if state.window.len() == self.capacity {
            let _ = state.window.pop_front();
        }
        state.window.push_back(envelope.clone());
        let _ = self.sender.send(envelope);
        id
    }

    /// Id of the newest retained event.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_state().window.back().map(|envelope| envelope.id)
    }

    /// Retained events with an id greater than `id`, oldest first.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        Self::newer_than(&self.lock_state(), id)
    }

    fn newer_than(state: &BusState, id: EventId) -> Vec<EventEnvelope> {
        state
            .window
            .iter()
            .skip_while(|envelope| envelope.id <= id)
            .cloned()
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn committed(key: &str) -> Event {
        Event::ResourceCommitted {
            completion_id: Uuid::nil(),
            endpoint: "inbox".into(),
            key: key.into(),
        }
    }

    #[test]
    fn backlog_starts_after_given_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(committed("a.csv"));
        let second = bus.publish(committed("b.csv"));

        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);
        assert_eq!(backlog[0].event.key(), "b.csv");
    }

    #[test]
    fn window_drops_oldest_events() {
        let bus = EventBus::with_capacity(2);
        let _ = bus.publish(committed("a.csv"));
        let _ = bus.publish(committed("b.csv"));
        let third = bus.publish(committed("c.csv"));

        let keys: Vec<String> = bus
            .backlog_since(0)
            .iter()
            .map(|envelope| envelope.event.key().to_string())
            .collect();
        assert_eq!(keys, vec!["b.csv", "c.csv"]);
        assert_eq!(bus.last_event_id(), Some(third));
    }

    #[tokio::test]
    async fn reconnecting_subscriber_gets_backlog_then_live_events() {
        let bus = EventBus::new();
        let first = bus.publish(committed("a.csv"));
        let _ = bus.publish(committed("b.csv"));

        let mut stream = bus.subscribe(Some(first));
        let live = bus.publish(Event::CompletionErrorReported {
            key: "x".into(),
            kind: "commit".into(),
            message: "boom".into(),
        });

        let replayed = stream.next().await.expect("replayed item").expect("in window");
        assert_eq!(replayed.event.key(), "b.csv");
        let received = stream.next().await.expect("live item").expect("not lagged");
        assert_eq!(received.id, live);
        assert!(matches!(
            received.event,
            Event::CompletionErrorReported { .. }
        ));
    }

    #[tokio::test]
    async fn replay_is_private_to_the_reconnecting_subscriber() {
        let bus = EventBus::new();
        let mut live = bus.subscribe(None);
        let first = bus.publish(committed("a.csv"));
        let _ = bus.subscribe(Some(0));
        let second = bus.publish(committed("b.csv"));

        let ids = [
            live.next().await.expect("first").expect("not lagged").id,
            live.next().await.expect("second").expect("not lagged").id,
        ];
        assert_eq!(ids, [first, second]);
    }
}
