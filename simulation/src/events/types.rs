//! Exercise event types.
//!
//! Every committed entity transition and every scoring action appends
//! one of these to the session history and publishes it on the bus.
//! Progress evaluators key off `event_type()` strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{
    ChangeStatus, ChangeType, EntityId, IncidentStatus, PlanStatus, Priority, ReviewDecision,
    TeamId,
};
use crate::outcome::ImplementationOutcome;

/// All exercise events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExerciseEvent {
    /// An incident was created (injected or spawned by a failed change)
    IncidentCreated {
        incident_id: EntityId,
        team_id: TeamId,
        priority: Priority,
        source_change_id: Option<EntityId>,
        timestamp: DateTime<Utc>,
    },

    /// An incident changed status
    IncidentTransitioned {
        incident_id: EntityId,
        team_id: TeamId,
        from: IncidentStatus,
        to: IncidentStatus,
        timestamp: DateTime<Utc>,
    },

    /// An incident reached `resolved`
    IncidentResolved {
        incident_id: EntityId,
        team_id: TeamId,
        within_sla: bool,
        timestamp: DateTime<Utc>,
    },

    /// A resolved incident requires a post-incident review
    PirRequested {
        incident_id: EntityId,
        team_id: TeamId,
        timestamp: DateTime<Utc>,
    },

    /// A submitted post-incident review was graded
    PirGraded {
        incident_id: EntityId,
        team_id: TeamId,
        score: f64,
        timestamp: DateTime<Utc>,
    },

    /// A plan was created
    PlanCreated {
        plan_id: EntityId,
        team_id: TeamId,
        incident_id: Option<EntityId>,
        timestamp: DateTime<Utc>,
    },

    /// A plan changed status
    PlanTransitioned {
        plan_id: EntityId,
        team_id: TeamId,
        from: PlanStatus,
        to: PlanStatus,
        timestamp: DateTime<Utc>,
    },

    /// A plan revision was graded by the content collaborator
    PlanGraded {
        plan_id: EntityId,
        team_id: TeamId,
        decision: ReviewDecision,
        score: f64,
        timestamp: DateTime<Utc>,
    },

    /// A change request was created
    ChangeCreated {
        change_id: EntityId,
        team_id: TeamId,
        change_type: ChangeType,
        timestamp: DateTime<Utc>,
    },

    /// A change request changed status
    ChangeTransitioned {
        change_id: EntityId,
        team_id: TeamId,
        from: ChangeStatus,
        to: ChangeStatus,
        timestamp: DateTime<Utc>,
    },

    /// A change implementation finished with a realized outcome
    ChangeImplemented {
        change_id: EntityId,
        team_id: TeamId,
        outcome: ImplementationOutcome,
        timestamp: DateTime<Utc>,
    },

    /// A challenge completed and its points were awarded
    ChallengeCompleted {
        challenge_id: EntityId,
        team_id: TeamId,
        points: u32,
        timestamp: DateTime<Utc>,
    },

    /// An achievement was earned for the first time
    AchievementEarned {
        achievement_id: String,
        team_id: TeamId,
        points: u32,
        timestamp: DateTime<Utc>,
    },

    /// Points were credited to a team's score
    PointsAwarded {
        team_id: TeamId,
        points: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The decision engine applied an action on behalf of a team
    DecisionApplied {
        team_id: TeamId,
        rule: String,
        action: String,
        target: EntityId,
        timestamp: DateTime<Utc>,
    },
}

impl ExerciseEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::IncidentCreated { timestamp, .. } => *timestamp,
            Self::IncidentTransitioned { timestamp, .. } => *timestamp,
            Self::IncidentResolved { timestamp, .. } => *timestamp,
            Self::PirRequested { timestamp, .. } => *timestamp,
            Self::PirGraded { timestamp, .. } => *timestamp,
            Self::PlanCreated { timestamp, .. } => *timestamp,
            Self::PlanTransitioned { timestamp, .. } => *timestamp,
            Self::PlanGraded { timestamp, .. } => *timestamp,
            Self::ChangeCreated { timestamp, .. } => *timestamp,
            Self::ChangeTransitioned { timestamp, .. } => *timestamp,
            Self::ChangeImplemented { timestamp, .. } => *timestamp,
            Self::ChallengeCompleted { timestamp, .. } => *timestamp,
            Self::AchievementEarned { timestamp, .. } => *timestamp,
            Self::PointsAwarded { timestamp, .. } => *timestamp,
            Self::DecisionApplied { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IncidentCreated { .. } => "incident_created",
            Self::IncidentTransitioned { .. } => "incident_transitioned",
            Self::IncidentResolved { .. } => "incident_resolved",
            Self::PirRequested { .. } => "pir_requested",
            Self::PirGraded { .. } => "pir_graded",
            Self::PlanCreated { .. } => "plan_created",
            Self::PlanTransitioned { .. } => "plan_transitioned",
            Self::PlanGraded { .. } => "plan_graded",
            Self::ChangeCreated { .. } => "change_created",
            Self::ChangeTransitioned { .. } => "change_transitioned",
            Self::ChangeImplemented { .. } => "change_implemented",
            Self::ChallengeCompleted { .. } => "challenge_completed",
            Self::AchievementEarned { .. } => "achievement_earned",
            Self::PointsAwarded { .. } => "points_awarded",
            Self::DecisionApplied { .. } => "decision_applied",
        }
    }

    /// Get the owning team for this event
    pub fn team_id(&self) -> &str {
        match self {
            Self::IncidentCreated { team_id, .. } => team_id,
            Self::IncidentTransitioned { team_id, .. } => team_id,
            Self::IncidentResolved { team_id, .. } => team_id,
            Self::PirRequested { team_id, .. } => team_id,
            Self::PirGraded { team_id, .. } => team_id,
            Self::PlanCreated { team_id, .. } => team_id,
            Self::PlanTransitioned { team_id, .. } => team_id,
            Self::PlanGraded { team_id, .. } => team_id,
            Self::ChangeCreated { team_id, .. } => team_id,
            Self::ChangeTransitioned { team_id, .. } => team_id,
            Self::ChangeImplemented { team_id, .. } => team_id,
            Self::ChallengeCompleted { team_id, .. } => team_id,
            Self::AchievementEarned { team_id, .. } => team_id,
            Self::PointsAwarded { team_id, .. } => team_id,
            Self::DecisionApplied { team_id, .. } => team_id,
        }
    }
}
