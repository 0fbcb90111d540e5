//! Change-request lifecycle state machine.
//!
//! Emergency changes enter `approved` at creation, bypassing `pending`
//! (the bypass is still recorded in the transition log). The
//! `in_progress → {completed,failed,rolled_back}` edge is the only one
//! governed by the probabilistic outcome model; a failure without a
//! captured rollback plan spawns a follow-up incident against the same
//! affected services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityId, IncidentSeed, Priority, RiskLevel, Severity, SideEffect, TeamId, TransitionRecord,
    WorkItem, new_entity_id,
};
use crate::error::{EntityKind, SimError, SimResult};

/// Fixed SLA window for incidents spawned by failed changes.
pub const FAILED_CHANGE_SLA_MINUTES: u32 = 60;

/// Cost rate attributed to a failed-change incident.
const FAILED_CHANGE_COST_PER_MINUTE: f64 = 150.0;

/// Change categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Pre-authorized, low-risk.
    Standard,
    /// Goes through normal approval.
    Normal,
    /// Expedited; auto-approved at creation.
    Emergency,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Normal => write!(f, "normal"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Change lifecycle statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Awaiting approval.
    Pending,
    /// Approved; ready to implement.
    Approved,
    /// Approval denied (terminal state).
    Rejected,
    /// Implementation underway.
    InProgress,
    /// Implemented successfully (terminal state).
    Completed,
    /// Implementation failed (terminal state).
    Failed,
    /// Implementation failed and was rolled back (terminal state).
    RolledBack,
}

impl ChangeStatus {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::RolledBack
        )
    }

    /// Wire-format name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Legal transitions in the change state graph:
/// ```text
/// pending → approved | rejected
/// approved → in_progress
/// in_progress → completed | failed | rolled_back
/// ```
fn is_legal_transition(from: ChangeStatus, to: ChangeStatus) -> bool {
    use ChangeStatus::*;
    matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Approved, InProgress)
            | (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, RolledBack)
    )
}

/// Inputs for creating a change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSeed {
    pub team_id: TeamId,
    pub title: String,
    pub change_type: ChangeType,
    pub risk_level: RiskLevel,
    pub affected_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_plan_id: Option<EntityId>,
    /// Captured rollback procedure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_plan: Option<String>,
    /// Whether a test plan accompanies the change.
    #[serde(default)]
    pub has_test_plan: bool,
}

/// A request to change production services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: EntityId,
    pub team_id: TeamId,
    pub title: String,
    pub change_type: ChangeType,
    pub risk_level: RiskLevel,
    pub status: ChangeStatus,
    pub affected_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_plan_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_plan: Option<String>,
    #[serde(default)]
    pub has_test_plan: bool,
    pub created_at: DateTime<Utc>,
    /// Audit log of every applied transition.
    pub transitions: Vec<TransitionRecord<ChangeStatus>>,
}

impl ChangeRequest {
    /// Create a new change request. Emergency changes start `approved`
    /// with the bypass recorded in the transition log.
    pub fn new(seed: ChangeSeed, now: DateTime<Utc>) -> Self {
        let mut change = Self {
            id: new_entity_id(),
            team_id: seed.team_id,
            title: seed.title,
            change_type: seed.change_type,
            risk_level: seed.risk_level,
            status: ChangeStatus::Pending,
            affected_services: seed.affected_services,
            related_plan_id: seed.related_plan_id,
            rollback_plan: seed.rollback_plan,
            has_test_plan: seed.has_test_plan,
            created_at: now,
            transitions: Vec::new(),
        };

        if change.change_type == ChangeType::Emergency {
            change.transitions.push(TransitionRecord {
                from: ChangeStatus::Pending,
                to: ChangeStatus::Approved,
                at: now,
                reason: Some("emergency auto-approval".into()),
            });
            change.status = ChangeStatus::Approved;
        }

        change
    }

    /// Whether an implementation plan backs this change.
    pub fn has_implementation_plan(&self) -> bool {
        self.related_plan_id.is_some()
    }

    /// Whether a rollback procedure was captured.
    pub fn has_rollback_plan(&self) -> bool {
        self.rollback_plan.is_some()
    }

    /// Attempt a status transition.
    ///
    /// `in_progress → failed` without a rollback plan returns a
    /// spawn-incident effect; `in_progress → rolled_back` requires a
    /// captured rollback plan. Illegal edges return `InvalidTransition`
    /// and leave state untouched.
    pub fn attempt(
        &mut self,
        target: ChangeStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> SimResult<Vec<SideEffect>> {
        if !is_legal_transition(self.status, target) {
            return Err(SimError::InvalidTransition {
                kind: EntityKind::Change,
                id: self.id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        if target == ChangeStatus::RolledBack && !self.has_rollback_plan() {
            return Err(SimError::InvariantViolation(format!(
                "change {} has no rollback plan to execute",
                self.id
            )));
        }

        let mut effects = Vec::new();
        if target == ChangeStatus::Failed && !self.has_rollback_plan() {
            effects.push(SideEffect::SpawnIncident(IncidentSeed {
                team_id: self.team_id.clone(),
                title: format!("Failed change: {}", self.title),
                priority: Priority::High,
                severity: Severity::Sev2,
                cost_per_minute: FAILED_CHANGE_COST_PER_MINUTE,
                requires_pir: false,
                affected_services: self.affected_services.clone(),
                sla_minutes: Some(FAILED_CHANGE_SLA_MINUTES),
                source_change_id: Some(self.id.clone()),
            }));
        }

        self.transitions.push(TransitionRecord {
            from: self.status,
            to: target,
            at: now,
            reason: reason.map(String::from),
        });
        self.status = target;
        Ok(effects)
    }
}

impl WorkItem for ChangeRequest {
    fn id(&self) -> &str {
        &self.id
    }
    fn team_id(&self) -> &str {
        &self.team_id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn deadline(&self) -> Option<DateTime<Utc>> {
        None
    }
    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
    fn status_name(&self) -> &'static str {
        self.status.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(change_type: ChangeType) -> ChangeSeed {
        ChangeSeed {
            team_id: "team-1".into(),
            title: "Bump connection pool size".into(),
            change_type,
            risk_level: RiskLevel::Medium,
            affected_services: vec!["orders-api".into(), "orders-db".into()],
            related_plan_id: Some("plan-1".into()),
            rollback_plan: None,
            has_test_plan: false,
        }
    }

    #[test]
    fn test_normal_change_starts_pending() {
        let change = ChangeRequest::new(seed(ChangeType::Normal), Utc::now());
        assert_eq!(change.status, ChangeStatus::Pending);
        assert!(change.transitions.is_empty());
    }

    #[test]
    fn test_emergency_change_bypasses_pending() {
        let change = ChangeRequest::new(seed(ChangeType::Emergency), Utc::now());
        assert_eq!(change.status, ChangeStatus::Approved);
        // The bypass is auditable.
        assert_eq!(change.transitions.len(), 1);
        assert_eq!(change.transitions[0].from, ChangeStatus::Pending);
    }

    #[test]
    fn test_happy_path_to_completed() {
        let now = Utc::now();
        let mut change = ChangeRequest::new(seed(ChangeType::Normal), now);

        change.attempt(ChangeStatus::Approved, now, None).unwrap();
        change.attempt(ChangeStatus::InProgress, now, None).unwrap();
        let effects = change
            .attempt(ChangeStatus::Completed, now, Some("implementation succeeded"))
            .unwrap();

        assert!(change.status.is_terminal());
        assert!(effects.is_empty());
    }

    #[test]
    fn test_failure_without_rollback_spawns_incident() {
        let now = Utc::now();
        let mut change = ChangeRequest::new(seed(ChangeType::Normal), now);
        change.attempt(ChangeStatus::Approved, now, None).unwrap();
        change.attempt(ChangeStatus::InProgress, now, None).unwrap();

        let effects = change.attempt(ChangeStatus::Failed, now, None).unwrap();

        assert_eq!(effects.len(), 1);
        match &effects[0] {
            SideEffect::SpawnIncident(inc) => {
                assert_eq!(inc.priority, Priority::High);
                assert_eq!(inc.sla_minutes, Some(FAILED_CHANGE_SLA_MINUTES));
                assert_eq!(inc.affected_services, change.affected_services);
                assert_eq!(inc.source_change_id.as_deref(), Some(change.id.as_str()));
            }
            other => panic!("expected SpawnIncident, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_with_rollback_spawns_nothing() {
        let now = Utc::now();
        let mut s = seed(ChangeType::Normal);
        s.rollback_plan = Some("Revert pool size to 32".into());
        let mut change = ChangeRequest::new(s, now);
        change.attempt(ChangeStatus::Approved, now, None).unwrap();
        change.attempt(ChangeStatus::InProgress, now, None).unwrap();

        let effects = change.attempt(ChangeStatus::Failed, now, None).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_rollback_requires_captured_plan() {
        let now = Utc::now();
        let mut change = ChangeRequest::new(seed(ChangeType::Normal), now);
        change.attempt(ChangeStatus::Approved, now, None).unwrap();
        change.attempt(ChangeStatus::InProgress, now, None).unwrap();

        let err = change
            .attempt(ChangeStatus::RolledBack, now, None)
            .unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation(_)));
        assert_eq!(change.status, ChangeStatus::InProgress);
    }

    #[test]
    fn test_illegal_skip_to_completed() {
        let now = Utc::now();
        let mut change = ChangeRequest::new(seed(ChangeType::Normal), now);

        let err = change
            .attempt(ChangeStatus::Completed, now, None)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidTransition { .. }));
        assert_eq!(change.status, ChangeStatus::Pending);
        assert!(change.transitions.is_empty());
    }
}
