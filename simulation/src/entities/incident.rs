//! Incident lifecycle state machine.
//!
//! Incidents move `open → in_progress → resolved → closed`. The direct
//! `open → resolved` edge exists for emergency resolution so the engine
//! can honor it with a single transition. `resolved_at` is stamped on
//! every edge entering `resolved`, keeping the invariant that it is set
//! iff the incident is resolved or closed. The SLA deadline is assigned
//! once at creation and never changes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityId, Priority, Severity, SideEffect, TeamId, TransitionRecord, WorkItem, new_entity_id,
};
use crate::error::{EntityKind, SimError, SimResult};

/// Incident lifecycle statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, nobody working on it yet.
    Open,
    /// A team is actively working the incident.
    InProgress,
    /// Fixed; awaiting closure.
    Resolved,
    /// Closed out (terminal state).
    Closed,
}

impl IncidentStatus {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Wire-format name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Legal transitions in the incident state graph:
/// ```text
/// open → in_progress | resolved
/// in_progress → resolved
/// resolved → closed
/// ```
fn is_legal_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
    use IncidentStatus::*;
    matches!(
        (from, to),
        (Open, InProgress) | (Open, Resolved) | (InProgress, Resolved) | (Resolved, Closed)
    )
}

/// Inputs for creating an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSeed {
    pub team_id: TeamId,
    pub title: String,
    pub priority: Priority,
    pub severity: Severity,
    /// Cost accrued per minute while the incident is unresolved.
    pub cost_per_minute: f64,
    /// Whether resolution must trigger a post-incident review.
    pub requires_pir: bool,
    pub affected_services: Vec<String>,
    /// Fixed SLA window in minutes. `None` means the store derives it
    /// from the priority band and session duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_minutes: Option<u32>,
    /// The failed change this incident was spawned from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_change_id: Option<EntityId>,
}

/// A simulated service incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: EntityId,
    pub team_id: TeamId,
    pub title: String,
    pub priority: Priority,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    /// Immutable once assigned.
    pub sla_deadline: Option<DateTime<Utc>>,
    pub cost_per_minute: f64,
    pub requires_pir: bool,
    pub affected_services: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_change_id: Option<EntityId>,
    /// Audit log of every applied transition.
    pub transitions: Vec<TransitionRecord<IncidentStatus>>,
}

impl Incident {
    /// Create a new open incident. The SLA deadline is `created_at`
    /// plus the given window.
    pub fn new(seed: IncidentSeed, sla_minutes: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: new_entity_id(),
            team_id: seed.team_id,
            title: seed.title,
            priority: seed.priority,
            severity: seed.severity,
            status: IncidentStatus::Open,
            created_at: now,
            sla_deadline: Some(now + Duration::minutes(sla_minutes as i64)),
            cost_per_minute: seed.cost_per_minute,
            requires_pir: seed.requires_pir,
            affected_services: seed.affected_services,
            resolved_at: None,
            source_change_id: seed.source_change_id,
            transitions: Vec::new(),
        }
    }

    /// Attempt a status transition.
    ///
    /// Validates the edge against the adjacency table; on success applies
    /// the edge's side effects locally (stamping `resolved_at`), records
    /// the transition, and returns the effects the store must execute.
    /// Illegal edges return `InvalidTransition` and leave state untouched.
    pub fn attempt(
        &mut self,
        target: IncidentStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> SimResult<Vec<SideEffect>> {
        if !is_legal_transition(self.status, target) {
            return Err(SimError::InvalidTransition {
                kind: EntityKind::Incident,
                id: self.id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let mut effects = Vec::new();
        if target == IncidentStatus::Resolved {
            self.resolved_at = Some(now);
            if self.requires_pir {
                effects.push(SideEffect::RequestPirReview {
                    incident_id: self.id.clone(),
                    team_id: self.team_id.clone(),
                });
            }
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

    /// Whether the SLA deadline has passed without resolution.
    pub fn sla_breached(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.sla_deadline) {
            (IncidentStatus::Open | IncidentStatus::InProgress, Some(deadline)) => now > deadline,
            _ => false,
        }
    }

    /// Minutes until the SLA deadline; negative once breached.
    pub fn sla_remaining_minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        self.sla_deadline
            .map(|d| (d - now).num_seconds() as f64 / 60.0)
    }

    /// Whether resolution happened inside the SLA window.
    pub fn resolved_within_sla(&self) -> bool {
        match (self.resolved_at, self.sla_deadline) {
            (Some(resolved), Some(deadline)) => resolved <= deadline,
            _ => false,
        }
    }
}

impl WorkItem for Incident {
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
        self.sla_deadline
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

    fn seed() -> IncidentSeed {
        IncidentSeed {
            team_id: "team-1".into(),
            title: "Database latency spike".into(),
            priority: Priority::High,
            severity: Severity::Sev2,
            cost_per_minute: 120.0,
            requires_pir: true,
            affected_services: vec!["orders-db".into()],
            sla_minutes: None,
            source_change_id: None,
        }
    }

    #[test]
    fn test_new_incident_is_open_with_deadline() {
        let now = Utc::now();
        let inc = Incident::new(seed(), 30, now);
        assert_eq!(inc.status, IncidentStatus::Open);
        assert_eq!(inc.sla_deadline, Some(now + Duration::minutes(30)));
        assert!(inc.resolved_at.is_none());
    }

    #[test]
    fn test_happy_path() {
        let now = Utc::now();
        let mut inc = Incident::new(seed(), 30, now);

        inc.attempt(IncidentStatus::InProgress, now, None).unwrap();
        let effects = inc
            .attempt(IncidentStatus::Resolved, now, Some("fix deployed"))
            .unwrap();
        inc.attempt(IncidentStatus::Closed, now, None).unwrap();

        assert_eq!(inc.status, IncidentStatus::Closed);
        assert_eq!(inc.resolved_at, Some(now));
        assert_eq!(inc.transitions.len(), 3);
        assert!(matches!(
            effects.as_slice(),
            [SideEffect::RequestPirReview { .. }]
        ));
    }

    #[test]
    fn test_emergency_resolve_from_open() {
        let now = Utc::now();
        let mut inc = Incident::new(seed(), 30, now);

        inc.attempt(IncidentStatus::Resolved, now, Some("emergency resolve"))
            .unwrap();
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert_eq!(inc.resolved_at, Some(now));
    }

    #[test]
    fn test_illegal_transition_leaves_state_untouched() {
        let now = Utc::now();
        let mut inc = Incident::new(seed(), 30, now);

        let err = inc.attempt(IncidentStatus::Closed, now, None).unwrap_err();
        assert!(matches!(err, SimError::InvalidTransition { .. }));
        assert_eq!(inc.status, IncidentStatus::Open);
        assert!(inc.transitions.is_empty());
        assert!(inc.resolved_at.is_none());
    }

    #[test]
    fn test_no_transition_out_of_closed() {
        let now = Utc::now();
        let mut inc = Incident::new(seed(), 30, now);
        inc.attempt(IncidentStatus::InProgress, now, None).unwrap();
        inc.attempt(IncidentStatus::Resolved, now, None).unwrap();
        inc.attempt(IncidentStatus::Closed, now, None).unwrap();

        assert!(inc.attempt(IncidentStatus::Open, now, None).is_err());
        assert!(inc.attempt(IncidentStatus::InProgress, now, None).is_err());
    }

    #[test]
    fn test_no_pir_effect_when_not_required() {
        let now = Utc::now();
        let mut s = seed();
        s.requires_pir = false;
        let mut inc = Incident::new(s, 30, now);
        inc.attempt(IncidentStatus::InProgress, now, None).unwrap();
        let effects = inc.attempt(IncidentStatus::Resolved, now, None).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_sla_breach_detection() {
        let now = Utc::now();
        let inc = Incident::new(seed(), 30, now);

        assert!(!inc.sla_breached(now + Duration::minutes(29)));
        assert!(inc.sla_breached(now + Duration::minutes(31)));
    }

    #[test]
    fn test_resolved_incident_never_breaches() {
        let now = Utc::now();
        let mut inc = Incident::new(seed(), 30, now);
        inc.attempt(IncidentStatus::InProgress, now, None).unwrap();
        inc.attempt(IncidentStatus::Resolved, now + Duration::minutes(10), None)
            .unwrap();

        assert!(!inc.sla_breached(now + Duration::minutes(60)));
        assert!(inc.resolved_within_sla());
    }
}
