//! Event bus for exercise fan-out.
//!
//! One-way pub/sub over a Tokio broadcast channel. Publishers never
//! wait for acknowledgement and never block on slow subscribers; an
//! event with no receivers is dropped silently.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ExerciseEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<ExerciseEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Never fails; no receivers
    /// is a normal condition.
    pub fn publish(&self, event: ExerciseEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ExerciseEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by owning team
    pub team_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by owning team
    pub fn team(mut self, team_id: &str) -> Self {
        self.team_id = Some(team_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ExerciseEvent) -> bool {
        if let Some(ref team) = self.team_id {
            if event.team_id() != team {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<ExerciseEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<ExerciseEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<ExerciseEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

impl EventBus {
    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Priority;
    use chrono::Utc;

    fn created_event(team: &str) -> ExerciseEvent {
        ExerciseEvent::IncidentCreated {
            incident_id: "inc-1".into(),
            team_id: team.into(),
            priority: Priority::High,
            source_change_id: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(created_event("team-1"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "incident_created");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(created_event("team-1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(created_event("team-1"));

        assert_eq!(
            rx1.recv().await.unwrap().event_type(),
            rx2.recv().await.unwrap().event_type()
        );
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .team("team-1")
            .types(vec!["incident_created"]);

        assert!(filter.matches(&created_event("team-1")));
        assert!(!filter.matches(&created_event("team-2")));

        let wrong_type = ExerciseEvent::PointsAwarded {
            team_id: "team-1".into(),
            points: 10,
            reason: "test".into(),
            timestamp: Utc::now(),
        };
        assert!(!filter.matches(&wrong_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver_skips_non_matching() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().team("team-2"));

        bus.publish(created_event("team-1"));
        bus.publish(created_event("team-2"));

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.team_id(), "team-2");
    }
}
