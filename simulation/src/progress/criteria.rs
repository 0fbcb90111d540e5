//! Named criteria for challenges and achievements.
//!
//! A criterion is either a counting rule over event types or a
//! clear-the-queue rule over current entity state. Evaluation is driven
//! by events from the append-only history, never by polling external
//! services.

use serde::{Deserialize, Serialize};

use crate::events::ExerciseEvent;
use crate::store::GameStore;

/// Source of current-state counts for queue-style criteria.
pub trait QueueProbe {
    /// Unresolved incidents currently owned by the team.
    fn open_incident_count(&self, team_id: &str) -> usize;
}

impl QueueProbe for GameStore {
    fn open_incident_count(&self, team_id: &str) -> usize {
        GameStore::open_incident_count(self, team_id)
    }
}

/// A named progress criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// Count occurrences of an event type; satisfied at `>=` target.
    EventCount { event_type: String },
    /// Count occurrences of a scored event type at or above a minimum
    /// score; satisfied at `>=` target.
    ScoreAtLeast { event_type: String, min_score: f64 },
    /// Satisfied when the team's open-incident queue is empty
    /// (`== 0` comparator); re-checked on every resolution event.
    QueueCleared,
}

impl Criterion {
    /// Event types that trigger re-evaluation of this criterion.
    pub fn triggers_on(&self, event: &ExerciseEvent) -> bool {
        match self {
            Self::EventCount { event_type } => event.event_type() == event_type,
            Self::ScoreAtLeast { event_type, .. } => event.event_type() == event_type,
            Self::QueueCleared => {
                matches!(
                    event,
                    ExerciseEvent::IncidentResolved { .. }
                        | ExerciseEvent::IncidentTransitioned { .. }
                )
            }
        }
    }

    /// Progress contributed by a single event. Queue criteria carry no
    /// per-event increment; they are judged on current state.
    pub fn increment_for(&self, event: &ExerciseEvent) -> u32 {
        match self {
            Self::EventCount { event_type } => (event.event_type() == event_type) as u32,
            Self::ScoreAtLeast {
                event_type,
                min_score,
            } => {
                if event.event_type() != event_type {
                    return 0;
                }
                let score = match event {
                    ExerciseEvent::PirGraded { score, .. } => Some(*score),
                    ExerciseEvent::PlanGraded { score, .. } => Some(*score),
                    _ => None,
                };
                score.map(|s| (s >= *min_score) as u32).unwrap_or(0)
            }
            Self::QueueCleared => 0,
        }
    }

    /// Criterion-specific completion comparator.
    pub fn is_satisfied(&self, current_value: u32, target_value: u32, open_queue: usize) -> bool {
        match self {
            Self::EventCount { .. } | Self::ScoreAtLeast { .. } => current_value >= target_value,
            Self::QueueCleared => open_queue == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resolved() -> ExerciseEvent {
        ExerciseEvent::IncidentResolved {
            incident_id: "inc-1".into(),
            team_id: "team-1".into(),
            within_sla: true,
            timestamp: Utc::now(),
        }
    }

    fn pir_graded(score: f64) -> ExerciseEvent {
        ExerciseEvent::PirGraded {
            incident_id: "inc-1".into(),
            team_id: "team-1".into(),
            score,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_count_increments_on_matching_type() {
        let criterion = Criterion::EventCount {
            event_type: "incident_resolved".into(),
        };
        assert_eq!(criterion.increment_for(&resolved()), 1);
        assert_eq!(criterion.increment_for(&pir_graded(0.9)), 0);
    }

    #[test]
    fn test_score_criterion_respects_minimum() {
        let criterion = Criterion::ScoreAtLeast {
            event_type: "pir_graded".into(),
            min_score: 0.8,
        };
        assert_eq!(criterion.increment_for(&pir_graded(0.9)), 1);
        assert_eq!(criterion.increment_for(&pir_graded(0.8)), 1);
        assert_eq!(criterion.increment_for(&pir_graded(0.5)), 0);
    }

    #[test]
    fn test_count_satisfaction_is_at_least() {
        let criterion = Criterion::EventCount {
            event_type: "incident_resolved".into(),
        };
        assert!(!criterion.is_satisfied(2, 3, 99));
        assert!(criterion.is_satisfied(3, 3, 99));
        assert!(criterion.is_satisfied(4, 3, 99));
    }

    #[test]
    fn test_queue_cleared_is_exactly_zero() {
        let criterion = Criterion::QueueCleared;
        assert!(criterion.is_satisfied(0, 0, 0));
        assert!(!criterion.is_satisfied(100, 0, 1));
        assert!(criterion.triggers_on(&resolved()));
    }
}
