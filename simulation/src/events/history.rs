//! Append-only event history.
//!
//! The progress evaluators read this log instead of polling external
//! services. Appends are cheap and never fail; queries return clones so
//! callers hold no references into the log.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::types::ExerciseEvent;

/// Shared reference to the event log
pub type SharedEventLog = Arc<EventLog>;

/// In-memory append-only event log
#[derive(Default)]
pub struct EventLog {
    events: RwLock<Vec<ExerciseEvent>>,
}

impl EventLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this log
    pub fn shared(self) -> SharedEventLog {
        Arc::new(self)
    }

    /// Append an event
    pub fn append(&self, event: ExerciseEvent) {
        self.events
            .write()
            .expect("event log lock poisoned")
            .push(event);
    }

    /// Total number of recorded events
    pub fn len(&self) -> usize {
        self.events.read().expect("event log lock poisoned").len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All events, in append order
    pub fn all(&self) -> Vec<ExerciseEvent> {
        self.events
            .read()
            .expect("event log lock poisoned")
            .clone()
    }

    /// Events for a specific team
    pub fn for_team(&self, team_id: &str) -> Vec<ExerciseEvent> {
        self.filtered(|e| e.team_id() == team_id)
    }

    /// Events of a specific type for a team
    pub fn for_team_of_type(&self, team_id: &str, event_type: &str) -> Vec<ExerciseEvent> {
        self.filtered(|e| e.team_id() == team_id && e.event_type() == event_type)
    }

    /// Count of events of a specific type for a team
    pub fn count_for_team(&self, team_id: &str, event_type: &str) -> usize {
        self.events
            .read()
            .expect("event log lock poisoned")
            .iter()
            .filter(|e| e.team_id() == team_id && e.event_type() == event_type)
            .count()
    }

    /// Events at or after the given instant
    pub fn since(&self, start: DateTime<Utc>) -> Vec<ExerciseEvent> {
        self.filtered(|e| e.timestamp() >= start)
    }

    fn filtered(&self, predicate: impl Fn(&ExerciseEvent) -> bool) -> Vec<ExerciseEvent> {
        self.events
            .read()
            .expect("event log lock poisoned")
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }
}
