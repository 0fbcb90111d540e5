//! Team perception snapshots.
//!
//! The engine never reads shared mutable state mid-cycle: Perceive
//! captures an owned snapshot of everything the team's rules can look
//! at, rebuilt fresh every cycle. Urgency is judged against the
//! duration-scaled at-risk thresholds.

use chrono::{DateTime, Utc};

use simulation::store::GameStore;
use simulation::timescale;
use simulation::{
    ChangeRequest, ChangeStatus, ImplementationPlan, Incident, IncidentStatus, PlanStatus, TeamId,
};

/// Read-only view of one team's state at a single instant.
#[derive(Debug, Clone)]
pub struct TeamSnapshot {
    pub team_id: TeamId,
    pub taken_at: DateTime<Utc>,
    pub session_duration_minutes: u32,
    /// Every incident the team owns, terminal or not.
    pub incidents: Vec<Incident>,
    pub plans: Vec<ImplementationPlan>,
    pub changes: Vec<ChangeRequest>,
}

impl TeamSnapshot {
    /// Capture a fresh snapshot for a team.
    pub fn capture(store: &GameStore, team_id: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            taken_at: Utc::now(),
            session_duration_minutes: store.session().duration_minutes,
            incidents: store.incidents_for_team(team_id),
            plans: store.plans_for_team(team_id),
            changes: store.changes_for_team(team_id),
        }
    }

    /// Whether an incident's remaining SLA time is inside the scaled
    /// at-risk window for its priority.
    pub fn is_at_risk(&self, incident: &Incident) -> bool {
        match incident.sla_remaining_minutes(self.taken_at) {
            Some(remaining) => {
                remaining
                    <= timescale::at_risk_threshold_minutes(
                        incident.priority,
                        self.session_duration_minutes,
                    )
            }
            None => false,
        }
    }

    /// Whether an incident has blown its SLA without being resolved.
    pub fn is_breached(&self, incident: &Incident) -> bool {
        incident.sla_breached(self.taken_at)
    }

    /// Unresolved incidents that match the urgency predicate: priority
    /// threshold, at-risk, or already breached. Most urgent first.
    pub fn urgent_incidents(&self) -> Vec<&Incident> {
        let mut urgent: Vec<&Incident> = self
            .incidents
            .iter()
            .filter(|i| {
                matches!(i.status, IncidentStatus::Open | IncidentStatus::InProgress)
                    && (i.priority.is_urgent() || self.is_at_risk(i) || self.is_breached(i))
            })
            .collect();
        urgent.sort_by(|a, b| {
            self.is_breached(b)
                .cmp(&self.is_breached(a))
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| {
                    a.sla_remaining_minutes(self.taken_at)
                        .unwrap_or(f64::MAX)
                        .total_cmp(&b.sla_remaining_minutes(self.taken_at).unwrap_or(f64::MAX))
                })
        });
        urgent
    }

    /// Unresolved urgent incidents that have already breached SLA.
    pub fn breached_incidents(&self) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|i| self.is_breached(i))
            .collect()
    }

    /// Incidents in the given status.
    pub fn incidents_in(&self, status: IncidentStatus) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|i| i.status == status)
            .collect()
    }

    /// Plans in the given status.
    pub fn plans_in(&self, status: PlanStatus) -> Vec<&ImplementationPlan> {
        self.plans.iter().filter(|p| p.status == status).collect()
    }

    /// Changes in the given status.
    pub fn changes_in(&self, status: ChangeStatus) -> Vec<&ChangeRequest> {
        self.changes.iter().filter(|c| c.status == status).collect()
    }

    /// The non-terminal plan attached to an incident, if any.
    pub fn active_plan_for(&self, incident_id: &str) -> Option<&ImplementationPlan> {
        self.plans
            .iter()
            .find(|p| p.incident_id.as_deref() == Some(incident_id) && p.is_active())
    }

    /// A completed change implementing one of the incident's plans.
    pub fn implemented_change_for(&self, incident_id: &str) -> Option<&ChangeRequest> {
        self.changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Completed)
            .find(|c| {
                c.related_plan_id.as_deref().is_some_and(|plan_id| {
                    self.plans
                        .iter()
                        .any(|p| p.id == plan_id && p.incident_id.as_deref() == Some(incident_id))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulation::{
        EventBus, EventLog, IncidentSeed, PlanSeed, Priority, RiskLevel, SessionConfig, Severity,
    };

    fn store() -> GameStore {
        GameStore::new(
            SessionConfig::with_duration(60),
            EventBus::new().shared(),
            EventLog::new().shared(),
        )
    }

    fn seed(team: &str, priority: Priority, sla_minutes: Option<u32>) -> IncidentSeed {
        IncidentSeed {
            team_id: team.into(),
            title: "Incident".into(),
            priority,
            severity: Severity::Sev2,
            cost_per_minute: 100.0,
            requires_pir: false,
            affected_services: vec!["svc".into()],
            sla_minutes,
            source_change_id: None,
        }
    }

    #[test]
    fn test_snapshot_is_scoped_to_team() {
        let store = store();
        store.create_incident(seed("team-1", Priority::Low, None)).unwrap();
        store.create_incident(seed("team-2", Priority::Low, None)).unwrap();

        let snapshot = TeamSnapshot::capture(&store, "team-1");
        assert_eq!(snapshot.incidents.len(), 1);
        assert_eq!(snapshot.incidents[0].team_id, "team-1");
    }

    #[test]
    fn test_urgency_includes_priority_threshold() {
        let store = store();
        store
            .create_incident(seed("team-1", Priority::Critical, None))
            .unwrap();
        store.create_incident(seed("team-1", Priority::Low, None)).unwrap();

        let snapshot = TeamSnapshot::capture(&store, "team-1");
        let urgent = snapshot.urgent_incidents();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].priority, Priority::Critical);
    }

    #[test]
    fn test_breached_incident_is_urgent_regardless_of_priority() {
        let store = store();
        store
            .create_incident(seed("team-1", Priority::Low, Some(0)))
            .unwrap();

        let snapshot = TeamSnapshot::capture(&store, "team-1");
        assert_eq!(snapshot.urgent_incidents().len(), 1);
        assert_eq!(snapshot.breached_incidents().len(), 1);
    }

    #[test]
    fn test_breached_sorts_ahead_of_merely_urgent() {
        let store = store();
        store
            .create_incident(seed("team-1", Priority::Critical, None))
            .unwrap();
        let breached = store
            .create_incident(seed("team-1", Priority::Medium, Some(0)))
            .unwrap();

        let snapshot = TeamSnapshot::capture(&store, "team-1");
        let urgent = snapshot.urgent_incidents();
        assert_eq!(urgent[0].id, breached.id);
    }

    #[test]
    fn test_active_plan_lookup() {
        let store = store();
        let incident = store
            .create_incident(seed("team-1", Priority::High, None))
            .unwrap();
        let plan = store
            .create_plan(PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Low,
                incident_id: Some(incident.id.clone()),
            })
            .unwrap();

        let snapshot = TeamSnapshot::capture(&store, "team-1");
        assert_eq!(
            snapshot.active_plan_for(&incident.id).map(|p| p.id.clone()),
            Some(plan.id)
        );
        assert!(snapshot.active_plan_for("other").is_none());
    }
}
