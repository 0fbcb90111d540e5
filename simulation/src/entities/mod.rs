//! Work-item entities and their lifecycle state machines.
//!
//! Three coupled kinds: incidents, implementation plans, and change
//! requests. Each exposes `attempt()` which validates the requested edge
//! against a fixed adjacency table, applies it atomically, and returns
//! the side effects attached to that edge as data. Effects are executed
//! by the store after the transition commits, never inside the guard.

pub mod change;
pub mod incident;
pub mod plan;

pub use change::{ChangeRequest, ChangeSeed, ChangeStatus, ChangeType};
pub use incident::{Incident, IncidentSeed, IncidentStatus};
pub use plan::{ImplementationPlan, PlanRevision, PlanSeed, PlanStatus, ReviewDecision};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for teams
pub type TeamId = String;

/// Unique identifier for entities (uuid v4 strings)
pub type EntityId = String;

/// Mint a new entity id.
pub fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// Incident priority tiers, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub fn all() -> &'static [Priority] {
        &[Self::Critical, Self::High, Self::Medium, Self::Low]
    }

    /// Whether this priority counts as urgent regardless of deadline.
    pub fn is_urgent(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Incident severity, independent of priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Sev1,
    Sev2,
    Sev3,
    Sev4,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sev1 => write!(f, "sev1"),
            Self::Sev2 => write!(f, "sev2"),
            Self::Sev3 => write!(f, "sev3"),
            Self::Sev4 => write!(f, "sev4"),
        }
    }
}

/// Risk level for plans and change requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single recorded status transition on an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// The status transitioned from.
    pub from: S,
    /// The status transitioned to.
    pub to: S,
    /// When the transition was applied.
    pub at: DateTime<Utc>,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Side effects attached to specific transition edges.
///
/// Returned by `attempt()` and executed by the store after the edge
/// commits. Keeping effects as data means a rejected transition can
/// never half-apply them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    /// A resolved incident requires a post-incident review.
    RequestPirReview {
        incident_id: EntityId,
        team_id: TeamId,
    },
    /// A plan revision was submitted and needs grading.
    RequestPlanGrading {
        plan_id: EntityId,
        team_id: TeamId,
        revision: u32,
    },
    /// A failed change without a rollback plan spawns a follow-up
    /// incident against the same affected services.
    SpawnIncident(IncidentSeed),
}

/// Common surface shared by the three work-item kinds.
///
/// The perception layer consumes entities through this trait so it can
/// treat them uniformly when building snapshots.
pub trait WorkItem {
    /// Entity id.
    fn id(&self) -> &str;
    /// Owning team.
    fn team_id(&self) -> &str;
    /// Creation timestamp.
    fn created_at(&self) -> DateTime<Utc>;
    /// Deadline, if this item carries one.
    fn deadline(&self) -> Option<DateTime<Utc>>;
    /// Whether the item has reached a terminal status.
    fn is_terminal(&self) -> bool;
    /// Current status as a wire-format name.
    fn status_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
    }

    #[test]
    fn test_priority_urgency() {
        assert!(Priority::Critical.is_urgent());
        assert!(Priority::High.is_urgent());
        assert!(!Priority::Medium.is_urgent());
        assert!(!Priority::Low.is_urgent());
    }

    #[test]
    fn test_entity_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
