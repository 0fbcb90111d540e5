//! Priority-ordered decision rules.
//!
//! Each role carries a fixed, strictly ordered table of
//! `(guard, build-decision)` pairs. Deciding is a single deterministic
//! pass: the first rule whose guard matches produces exactly one
//! decision, later rules are never consulted, and an empty guard falls
//! through to the next rule. No rule is skipped for partial data. Zero
//! matches is a valid outcome ("no decision"), not an error.
//!
//! The numeric priority on each rule is observability metadata only;
//! arbitration is positional, never score-based.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use simulation::{ChangeStatus, EntityId, IncidentStatus, PlanStatus, Priority};

use crate::perception::TeamSnapshot;

/// Actions the engine can take on behalf of a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Resolve an SLA-breached incident immediately.
    EmergencyResolve,
    /// Draft a remediation plan for an incident.
    CreatePlan,
    /// Submit a draft plan for grading.
    SubmitPlan,
    /// Revise a needs-revision plan and resubmit it.
    RevisePlan,
    /// Create a change request from an approved plan.
    CreateChange,
    /// Start work on an open incident.
    StartWork,
    /// Resolve an in-progress incident whose change landed.
    ResolveIncident,
    /// Approve a pending change request.
    ApproveChange,
    /// Implement an approved change request.
    ImplementChange,
}

impl ActionKind {
    /// Wire-format name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmergencyResolve => "emergency_resolve",
            Self::CreatePlan => "create_plan",
            Self::SubmitPlan => "submit_plan",
            Self::RevisePlan => "revise_plan",
            Self::CreateChange => "create_change",
            Self::StartWork => "start_work",
            Self::ResolveIncident => "resolve_incident",
            Self::ApproveChange => "approve_change",
            Self::ImplementChange => "implement_change",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Team roles the engine can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Works incidents: plans, changes, resolution.
    TechnicalOperations,
    /// Shepherds change requests through approval and implementation.
    ChangeManagement,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TechnicalOperations => write!(f, "technical_operations"),
            Self::ChangeManagement => write!(f, "change_management"),
        }
    }
}

/// Behavior profile the engine plays for a team role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: Role,
    /// Aggressive profiles may emergency-resolve breached incidents.
    #[serde(default)]
    pub aggressive: bool,
}

/// One decision produced by a matched rule.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Name of the rule that fired.
    pub rule: &'static str,
    /// The rule's fixed numeric priority (observability only).
    pub priority: u8,
    pub action: ActionKind,
    /// Entity the action applies to.
    pub target: EntityId,
    /// Optional action parameters.
    pub params: Value,
}

type Guard = fn(&TeamSnapshot, &RoleProfile) -> Option<(ActionKind, EntityId, Value)>;

/// A positional rule in a role's table.
pub struct Rule {
    pub name: &'static str,
    pub priority: u8,
    guard: Guard,
}

/// Evaluate a role's rule table against a snapshot. First match wins.
pub fn decide(snapshot: &TeamSnapshot, profile: &RoleProfile) -> Option<Decision> {
    for rule in rule_table(profile.role) {
        if let Some((action, target, params)) = (rule.guard)(snapshot, profile) {
            return Some(Decision {
                rule: rule.name,
                priority: rule.priority,
                action,
                target,
                params,
            });
        }
    }
    None
}

/// The fixed rule table for a role.
pub fn rule_table(role: Role) -> &'static [Rule] {
    match role {
        Role::TechnicalOperations => TECHNICAL_OPERATIONS_RULES,
        Role::ChangeManagement => CHANGE_MANAGEMENT_RULES,
    }
}

// =============================================================================
// Technical operations
// =============================================================================

static TECHNICAL_OPERATIONS_RULES: &[Rule] = &[
    Rule {
        name: "sla-breach-emergency-resolve",
        priority: 1,
        guard: breached_emergency_resolve,
    },
    Rule {
        name: "critical-in-progress-needs-plan",
        priority: 2,
        guard: critical_in_progress_needs_plan,
    },
    Rule {
        name: "submit-draft-plan",
        priority: 3,
        guard: submit_draft_plan,
    },
    Rule {
        name: "approved-plan-to-change",
        priority: 4,
        guard: approved_plan_to_change,
    },
    Rule {
        name: "revise-returned-plan",
        priority: 5,
        guard: revise_returned_plan,
    },
    Rule {
        name: "start-urgent-work",
        priority: 6,
        guard: start_urgent_work,
    },
    Rule {
        name: "resolve-implemented-incident",
        priority: 7,
        guard: resolve_implemented_incident,
    },
    Rule {
        name: "in-progress-needs-plan",
        priority: 8,
        guard: in_progress_needs_plan,
    },
    Rule {
        name: "start-any-open-work",
        priority: 9,
        guard: start_any_open_work,
    },
];

fn breached_emergency_resolve(
    snapshot: &TeamSnapshot,
    profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    if !profile.aggressive {
        return None;
    }
    snapshot.breached_incidents().first().map(|incident| {
        (
            ActionKind::EmergencyResolve,
            incident.id.clone(),
            json!({
                "remaining_minutes": incident.sla_remaining_minutes(snapshot.taken_at),
            }),
        )
    })
}

fn critical_in_progress_needs_plan(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .incidents_in(IncidentStatus::InProgress)
        .into_iter()
        .find(|i| i.priority == Priority::Critical && snapshot.active_plan_for(&i.id).is_none())
        .map(|i| (ActionKind::CreatePlan, i.id.clone(), Value::Null))
}

fn submit_draft_plan(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .plans_in(PlanStatus::Draft)
        .first()
        .map(|p| (ActionKind::SubmitPlan, p.id.clone(), Value::Null))
}

fn approved_plan_to_change(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .plans_in(PlanStatus::AiApproved)
        .first()
        .map(|p| (ActionKind::CreateChange, p.id.clone(), Value::Null))
}

fn revise_returned_plan(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .plans_in(PlanStatus::AiNeedsRevision)
        .first()
        .map(|p| (ActionKind::RevisePlan, p.id.clone(), Value::Null))
}

fn start_urgent_work(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .incidents_in(IncidentStatus::Open)
        .into_iter()
        .find(|i| i.priority.is_urgent())
        .map(|i| (ActionKind::StartWork, i.id.clone(), Value::Null))
}

fn resolve_implemented_incident(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .incidents_in(IncidentStatus::InProgress)
        .into_iter()
        .find(|i| snapshot.implemented_change_for(&i.id).is_some())
        .map(|i| (ActionKind::ResolveIncident, i.id.clone(), Value::Null))
}

fn in_progress_needs_plan(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .incidents_in(IncidentStatus::InProgress)
        .into_iter()
        .find(|i| snapshot.active_plan_for(&i.id).is_none())
        .map(|i| (ActionKind::CreatePlan, i.id.clone(), Value::Null))
}

fn start_any_open_work(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .incidents_in(IncidentStatus::Open)
        .first()
        .map(|i| (ActionKind::StartWork, i.id.clone(), Value::Null))
}

// =============================================================================
// Change management
// =============================================================================

static CHANGE_MANAGEMENT_RULES: &[Rule] = &[
    Rule {
        name: "approve-pending-change",
        priority: 1,
        guard: approve_pending_change,
    },
    Rule {
        name: "implement-approved-change",
        priority: 2,
        guard: implement_approved_change,
    },
    Rule {
        name: "finish-in-progress-change",
        priority: 3,
        guard: finish_in_progress_change,
    },
];

fn approve_pending_change(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .changes_in(ChangeStatus::Pending)
        .first()
        .map(|c| (ActionKind::ApproveChange, c.id.clone(), Value::Null))
}

fn implement_approved_change(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .changes_in(ChangeStatus::Approved)
        .first()
        .map(|c| (ActionKind::ImplementChange, c.id.clone(), Value::Null))
}

/// Picks up changes left mid-implementation by an interrupted cycle.
fn finish_in_progress_change(
    snapshot: &TeamSnapshot,
    _profile: &RoleProfile,
) -> Option<(ActionKind, EntityId, Value)> {
    snapshot
        .changes_in(ChangeStatus::InProgress)
        .first()
        .map(|c| (ActionKind::ImplementChange, c.id.clone(), Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use simulation::entities::{Incident, IncidentSeed, PlanSeed};
    use simulation::{ImplementationPlan, Priority, RiskLevel, Severity};

    fn incident(priority: Priority, sla_minutes: u32) -> Incident {
        Incident::new(
            IncidentSeed {
                team_id: "team-1".into(),
                title: "Incident".into(),
                priority,
                severity: Severity::Sev2,
                cost_per_minute: 100.0,
                requires_pir: false,
                affected_services: vec!["svc".into()],
                sla_minutes: None,
                source_change_id: None,
            },
            sla_minutes,
            Utc::now() - chrono::Duration::minutes(1),
        )
    }

    fn draft_plan() -> ImplementationPlan {
        ImplementationPlan::new(
            PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Low,
                incident_id: None,
            },
            Utc::now(),
        )
    }

    fn snapshot(incidents: Vec<Incident>, plans: Vec<ImplementationPlan>) -> TeamSnapshot {
        TeamSnapshot {
            team_id: "team-1".into(),
            taken_at: Utc::now(),
            session_duration_minutes: 60,
            incidents,
            plans,
            changes: Vec::new(),
        }
    }

    fn tech_ops(aggressive: bool) -> RoleProfile {
        RoleProfile {
            role: Role::TechnicalOperations,
            aggressive,
        }
    }

    #[test]
    fn test_breached_incident_outranks_draft_plan() {
        // Both guards are satisfied; the breach rule is positionally
        // first and must win.
        let snap = snapshot(vec![incident(Priority::Critical, 0)], vec![draft_plan()]);

        let decision = decide(&snap, &tech_ops(true)).unwrap();
        assert_eq!(decision.rule, "sla-breach-emergency-resolve");
        assert_eq!(decision.priority, 1);
        assert_eq!(decision.action, ActionKind::EmergencyResolve);
    }

    #[test]
    fn test_non_aggressive_profile_falls_through_breach_rule() {
        let snap = snapshot(vec![incident(Priority::Critical, 0)], vec![draft_plan()]);

        let decision = decide(&snap, &tech_ops(false)).unwrap();
        assert_eq!(decision.rule, "submit-draft-plan");
        assert_eq!(decision.action, ActionKind::SubmitPlan);
    }

    #[test]
    fn test_empty_snapshot_yields_no_decision() {
        let snap = snapshot(Vec::new(), Vec::new());
        assert!(decide(&snap, &tech_ops(true)).is_none());
    }

    #[test]
    fn test_open_urgent_work_is_started() {
        let snap = snapshot(vec![incident(Priority::High, 60)], Vec::new());
        let decision = decide(&snap, &tech_ops(false)).unwrap();
        assert_eq!(decision.rule, "start-urgent-work");
        assert_eq!(decision.action, ActionKind::StartWork);
    }

    #[test]
    fn test_low_priority_open_work_falls_to_last_rule() {
        let snap = snapshot(vec![incident(Priority::Low, 600)], Vec::new());
        let decision = decide(&snap, &tech_ops(false)).unwrap();
        assert_eq!(decision.rule, "start-any-open-work");
        assert_eq!(decision.priority, 9);
    }

    #[test]
    fn test_rule_tables_are_strictly_ordered() {
        for role in [Role::TechnicalOperations, Role::ChangeManagement] {
            let table = rule_table(role);
            for pair in table.windows(2) {
                assert!(
                    pair[0].priority < pair[1].priority,
                    "{}: {} !< {}",
                    role,
                    pair[0].name,
                    pair[1].name
                );
            }
        }
    }
}
