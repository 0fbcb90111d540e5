//! Event-scored challenges.
//!
//! A challenge watches its team's events through a criterion,
//! accumulates monotonic progress while active, and completes exactly
//! once through a guarded status transition that awards its points a
//! single time. Replayed or late events after completion change
//! nothing.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::criteria::{Criterion, QueueProbe};
use crate::entities::{EntityId, TeamId, new_entity_id};
use crate::events::{ExerciseEvent, SharedEventBus, SharedEventLog};

/// Challenge lifecycle statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Completed,
    Expired,
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// An event-scored challenge for one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: EntityId,
    pub team_id: TeamId,
    pub name: String,
    pub criterion: Criterion,
    pub target_value: u32,
    /// Monotonic non-decreasing while active.
    pub current_value: u32,
    pub reward_points: u32,
    pub status: ChallengeStatus,
    pub start_time: DateTime<Utc>,
    /// Derived from the scaled challenge window, capped to remaining
    /// session time.
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Challenge {
    /// Create an active challenge running for `window_minutes` from now.
    pub fn new(
        team_id: impl Into<TeamId>,
        name: impl Into<String>,
        criterion: Criterion,
        target_value: u32,
        reward_points: u32,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            team_id: team_id.into(),
            name: name.into(),
            criterion,
            target_value,
            current_value: 0,
            reward_points,
            status: ChallengeStatus::Active,
            start_time: now,
            end_time: now + Duration::minutes(window_minutes as i64),
            completed_at: None,
        }
    }

    /// Add progress. Ignored unless active; the counter never moves
    /// backwards.
    pub fn record_progress(&mut self, delta: u32) {
        if self.status == ChallengeStatus::Active {
            self.current_value += delta;
        }
    }

    /// Guarded completion transition. Returns true only on the single
    /// call that actually completes the challenge.
    pub fn try_complete(&mut self, open_queue: usize, now: DateTime<Utc>) -> bool {
        if self.status != ChallengeStatus::Active {
            return false;
        }
        if !self
            .criterion
            .is_satisfied(self.current_value, self.target_value, open_queue)
        {
            return false;
        }
        self.status = ChallengeStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    /// Expire the challenge if its window has closed. Returns true on
    /// the transition.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ChallengeStatus::Active && now > self.end_time {
            self.status = ChallengeStatus::Expired;
            return true;
        }
        false
    }
}

/// Tracks challenges and the team scoreboard.
///
/// A read-only observer over entity events; its only writes are its own
/// challenge records and point awards.
pub struct ChallengeTracker {
    challenges: RwLock<HashMap<EntityId, Challenge>>,
    scores: RwLock<HashMap<TeamId, u32>>,
    bus: SharedEventBus,
    history: SharedEventLog,
}

impl ChallengeTracker {
    /// Create a tracker wired to the session bus and history.
    pub fn new(bus: SharedEventBus, history: SharedEventLog) -> Self {
        Self {
            challenges: RwLock::new(HashMap::new()),
            scores: RwLock::new(HashMap::new()),
            bus,
            history,
        }
    }

    /// Register a challenge.
    pub fn register(&self, challenge: Challenge) -> EntityId {
        let id = challenge.id.clone();
        debug!(challenge_id = %id, team_id = %challenge.team_id, name = %challenge.name, "Challenge registered");
        self.challenges
            .write()
            .expect("challenge lock poisoned")
            .insert(id.clone(), challenge);
        id
    }

    /// Get a point-in-time copy of a challenge.
    pub fn challenge(&self, id: &str) -> Option<Challenge> {
        self.challenges
            .read()
            .expect("challenge lock poisoned")
            .get(id)
            .cloned()
    }

    /// Current score for a team.
    pub fn score(&self, team_id: &str) -> u32 {
        self.scores
            .read()
            .expect("score lock poisoned")
            .get(team_id)
            .copied()
            .unwrap_or(0)
    }

    /// Feed one entity event through every matching challenge.
    ///
    /// Completion fires at most once per challenge; events arriving
    /// after completion or expiry are ignored.
    pub fn observe(&self, event: &ExerciseEvent, queue: &dyn QueueProbe) {
        // Scoring events are produced by this tracker; feeding them
        // back would recurse.
        if matches!(
            event.event_type(),
            "challenge_completed" | "points_awarded" | "achievement_earned"
        ) {
            return;
        }

        let now = event.timestamp();
        let mut completions = Vec::new();
        {
            let mut challenges = self.challenges.write().expect("challenge lock poisoned");
            for challenge in challenges.values_mut() {
                if challenge.team_id != event.team_id() {
                    continue;
                }
                if challenge.expire_if_due(now) {
                    debug!(challenge_id = %challenge.id, "Challenge expired");
                    continue;
                }
                if !challenge.criterion.triggers_on(event) {
                    continue;
                }
                challenge.record_progress(challenge.criterion.increment_for(event));

                let open_queue = queue.open_incident_count(&challenge.team_id);
                if challenge.try_complete(open_queue, now) {
                    completions.push(challenge.clone());
                }
            }
        }

        for completed in completions {
            self.award(&completed);
        }
    }

    /// Expire every challenge whose window has closed.
    pub fn expire_due(&self, now: DateTime<Utc>) -> usize {
        let mut challenges = self.challenges.write().expect("challenge lock poisoned");
        let mut count = 0;
        for c in challenges.values_mut() {
            if c.expire_if_due(now) {
                count += 1;
            }
        }
        count
    }

    /// Scoreboard snapshot, highest score first.
    pub fn scoreboard(&self) -> Vec<(TeamId, u32)> {
        let mut rows: Vec<(TeamId, u32)> = self
            .scores
            .read()
            .expect("score lock poisoned")
            .iter()
            .map(|(team, score)| (team.clone(), *score))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Credit points to a team and emit the scoring events.
    pub fn award_points(&self, team_id: &str, points: u32, reason: &str) {
        *self
            .scores
            .write()
            .expect("score lock poisoned")
            .entry(team_id.to_string())
            .or_insert(0) += points;

        let event = ExerciseEvent::PointsAwarded {
            team_id: team_id.to_string(),
            points,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        self.history.append(event.clone());
        self.bus.publish(event);
    }

    fn award(&self, challenge: &Challenge) {
        info!(
            challenge_id = %challenge.id,
            team_id = %challenge.team_id,
            points = challenge.reward_points,
            "Challenge completed"
        );
        let event = ExerciseEvent::ChallengeCompleted {
            challenge_id: challenge.id.clone(),
            team_id: challenge.team_id.clone(),
            points: challenge.reward_points,
            timestamp: challenge.completed_at.unwrap_or_else(Utc::now),
        };
        self.history.append(event.clone());
        self.bus.publish(event);

        self.award_points(
            &challenge.team_id,
            challenge.reward_points,
            &format!("challenge: {}", challenge.name),
        );
    }
}
