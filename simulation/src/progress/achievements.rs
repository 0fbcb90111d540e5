//! Achievements derived from event history.
//!
//! Achievement progress is not stored independently; it is computed on
//! demand from the team's event history against the achievement's
//! criterion. "Earned" is a one-time fact per (team, achievement) pair,
//! enforced by a uniqueness set.

use std::collections::HashSet;
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::criteria::{Criterion, QueueProbe};
use crate::entities::TeamId;
use crate::events::{EventLog, ExerciseEvent, SharedEventBus, SharedEventLog};

/// Definition of an achievement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementSpec {
    /// Stable identifier, unique across the session.
    pub id: String,
    pub name: String,
    pub criterion: Criterion,
    pub target_value: u32,
    pub points: u32,
}

/// Derived progress toward one achievement for one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub achievement_id: String,
    pub team_id: TeamId,
    pub current_value: u32,
    pub target_value: u32,
    pub earned: bool,
}

/// The built-in achievement set.
pub fn default_specs() -> Vec<AchievementSpec> {
    vec![
        AchievementSpec {
            id: "first-resolution".into(),
            name: "First Resolution".into(),
            criterion: Criterion::EventCount {
                event_type: "incident_resolved".into(),
            },
            target_value: 1,
            points: 10,
        },
        AchievementSpec {
            id: "steady-hands".into(),
            name: "Steady Hands".into(),
            criterion: Criterion::EventCount {
                event_type: "incident_resolved".into(),
            },
            target_value: 5,
            points: 40,
        },
        AchievementSpec {
            id: "review-excellence".into(),
            name: "Review Excellence".into(),
            criterion: Criterion::ScoreAtLeast {
                event_type: "pir_graded".into(),
                min_score: 0.8,
            },
            target_value: 1,
            points: 25,
        },
        AchievementSpec {
            id: "change-shepherd".into(),
            name: "Change Shepherd".into(),
            criterion: Criterion::EventCount {
                event_type: "change_implemented".into(),
            },
            target_value: 3,
            points: 30,
        },
        AchievementSpec {
            id: "clean-board".into(),
            name: "Clean Board".into(),
            criterion: Criterion::QueueCleared,
            target_value: 0,
            points: 50,
        },
    ]
}

/// Tracks which achievements each team has earned.
pub struct AchievementLedger {
    specs: Vec<AchievementSpec>,
    earned: RwLock<HashSet<(TeamId, String)>>,
    bus: SharedEventBus,
    history: SharedEventLog,
}

impl AchievementLedger {
    /// Create a ledger over the given achievement set.
    pub fn new(specs: Vec<AchievementSpec>, bus: SharedEventBus, history: SharedEventLog) -> Self {
        Self {
            specs,
            earned: RwLock::new(HashSet::new()),
            bus,
            history,
        }
    }

    /// The achievement definitions this ledger evaluates.
    pub fn specs(&self) -> &[AchievementSpec] {
        &self.specs
    }

    /// Whether a team has earned an achievement.
    pub fn is_earned(&self, team_id: &str, achievement_id: &str) -> bool {
        self.earned
            .read()
            .expect("earned set lock poisoned")
            .contains(&(team_id.to_string(), achievement_id.to_string()))
    }

    /// Compute a team's progress toward every achievement from its
    /// event history. Created implicitly on first query; nothing is
    /// stored for unearned progress.
    pub fn progress(&self, team_id: &str, log: &EventLog) -> Vec<AchievementProgress> {
        self.specs
            .iter()
            .map(|spec| AchievementProgress {
                achievement_id: spec.id.clone(),
                team_id: team_id.to_string(),
                current_value: self.derive_value(spec, team_id, log),
                target_value: spec.target_value,
                earned: self.is_earned(team_id, &spec.id),
            })
            .collect()
    }

    /// Evaluate every achievement for a team and award any newly
    /// satisfied ones. Awarding is idempotent: the uniqueness set
    /// guarantees one award per (team, achievement) pair no matter how
    /// often this runs.
    pub fn evaluate(
        &self,
        team_id: &str,
        log: &EventLog,
        queue: &dyn QueueProbe,
    ) -> Vec<AchievementSpec> {
        let mut newly_earned = Vec::new();

        for spec in &self.specs {
            let current = self.derive_value(spec, team_id, log);
            let open_queue = queue.open_incident_count(team_id);
            if !spec
                .criterion
                .is_satisfied(current, spec.target_value, open_queue)
            {
                continue;
            }

            let inserted = self
                .earned
                .write()
                .expect("earned set lock poisoned")
                .insert((team_id.to_string(), spec.id.clone()));
            if !inserted {
                continue;
            }

            info!(team_id, achievement = %spec.id, points = spec.points, "Achievement earned");
            let event = ExerciseEvent::AchievementEarned {
                achievement_id: spec.id.clone(),
                team_id: team_id.to_string(),
                points: spec.points,
                timestamp: Utc::now(),
            };
            self.history.append(event.clone());
            self.bus.publish(event);
            newly_earned.push(spec.clone());
        }

        newly_earned
    }

    fn derive_value(&self, spec: &AchievementSpec, team_id: &str, log: &EventLog) -> u32 {
        log.for_team(team_id)
            .iter()
            .map(|event| spec.criterion.increment_for(event))
            .sum()
    }
}
