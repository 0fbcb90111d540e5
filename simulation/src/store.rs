//! In-memory game store.
//!
//! Owns every work item for the session and applies all mutation
//! through the entities' own transition functions. Each entity sits
//! behind its own lock slot so at most one transition is in flight per
//! entity id; the read-then-write of a guarded transition is atomic
//! against the slot. Entity locks are held only for the local state
//! change; side effects and event fan-out run after release.
//!
//! Callers that act on a previously-taken snapshot pass the status they
//! observed; a mismatch at apply time is reported as
//! `ConcurrentModification` so the caller re-runs its whole cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::entities::{
    ChangeRequest, ChangeSeed, ChangeStatus, EntityId, ImplementationPlan, Incident, IncidentSeed,
    IncidentStatus, PlanSeed, PlanStatus, ReviewDecision, SideEffect, TeamId,
};
use crate::error::{EntityKind, SimError, SimResult};
use crate::events::{ExerciseEvent, SharedEventBus, SharedEventLog};
use crate::timescale;

/// A plan revision waiting on the grading collaborator.
///
/// Forwarded to whatever worker the session registered as the grading
/// sink; the store never blocks on grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRequest {
    pub plan_id: EntityId,
    pub team_id: TeamId,
    pub revision: u32,
}

/// Shared reference to GameStore
pub type SharedGameStore = Arc<GameStore>;

type Slot<T> = Arc<Mutex<T>>;

/// The session's entity store
pub struct GameStore {
    session: SessionConfig,
    incidents: RwLock<HashMap<EntityId, Slot<Incident>>>,
    plans: RwLock<HashMap<EntityId, Slot<ImplementationPlan>>>,
    changes: RwLock<HashMap<EntityId, Slot<ChangeRequest>>>,
    bus: SharedEventBus,
    history: SharedEventLog,
    grading_sink: RwLock<Option<mpsc::UnboundedSender<GradingRequest>>>,
}

impl GameStore {
    /// Create a new store for a session.
    pub fn new(session: SessionConfig, bus: SharedEventBus, history: SharedEventLog) -> Self {
        Self {
            session,
            incidents: RwLock::new(HashMap::new()),
            plans: RwLock::new(HashMap::new()),
            changes: RwLock::new(HashMap::new()),
            bus,
            history,
            grading_sink: RwLock::new(None),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedGameStore {
        Arc::new(self)
    }

    /// Session configuration this store was built with.
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Register the channel grading requests are forwarded to.
    pub fn set_grading_sink(&self, sink: mpsc::UnboundedSender<GradingRequest>) {
        *self
            .grading_sink
            .write()
            .expect("grading sink lock poisoned") = Some(sink);
    }

    fn emit(&self, event: ExerciseEvent) {
        self.history.append(event.clone());
        self.bus.publish(event);
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    /// Create an incident. The SLA window comes from the seed when
    /// fixed, otherwise from the priority band scaled to the session
    /// duration; the resulting deadline never changes afterwards.
    pub fn create_incident(&self, seed: IncidentSeed) -> SimResult<Incident> {
        let now = Utc::now();
        let sla_minutes = seed.sla_minutes.unwrap_or_else(|| {
            timescale::sla_target_minutes(seed.priority, self.session.duration_minutes)
        });
        let incident = Incident::new(seed, sla_minutes, now);
        let snapshot = incident.clone();

        self.incidents
            .write()
            .map_err(|_| self.poisoned(EntityKind::Incident, &snapshot.id))?
            .insert(snapshot.id.clone(), Arc::new(Mutex::new(incident)));

        debug!(incident_id = %snapshot.id, team_id = %snapshot.team_id, priority = %snapshot.priority, "Incident created");
        self.emit(ExerciseEvent::IncidentCreated {
            incident_id: snapshot.id.clone(),
            team_id: snapshot.team_id.clone(),
            priority: snapshot.priority,
            source_change_id: snapshot.source_change_id.clone(),
            timestamp: now,
        });
        Ok(snapshot)
    }

    /// Get a point-in-time copy of an incident.
    pub fn incident(&self, id: &str) -> SimResult<Incident> {
        let slot = self.incident_slot(id)?;
        let guard = slot
            .lock()
            .map_err(|_| self.poisoned(EntityKind::Incident, id))?;
        Ok(guard.clone())
    }

    /// All incidents owned by a team.
    pub fn incidents_for_team(&self, team_id: &str) -> Vec<Incident> {
        self.collect(&self.incidents, |i: &Incident| i.team_id == team_id)
    }

    /// Count of unresolved (open or in-progress) incidents for a team.
    pub fn open_incident_count(&self, team_id: &str) -> usize {
        self.incidents_for_team(team_id)
            .iter()
            .filter(|i| {
                matches!(
                    i.status,
                    IncidentStatus::Open | IncidentStatus::InProgress
                )
            })
            .count()
    }

    /// Apply an incident transition.
    ///
    /// `expected_from` is the status the caller observed in its
    /// snapshot; a mismatch means another cycle got there first.
    pub fn transition_incident(
        &self,
        id: &str,
        expected_from: Option<IncidentStatus>,
        target: IncidentStatus,
        reason: Option<&str>,
    ) -> SimResult<Incident> {
        let slot = self.incident_slot(id)?;
        let (snapshot, effects, events) = {
            let mut incident = slot
                .lock()
                .map_err(|_| self.poisoned(EntityKind::Incident, id))?;

            if let Some(expected) = expected_from {
                if incident.status != expected {
                    return Err(SimError::ConcurrentModification {
                        kind: EntityKind::Incident,
                        id: id.to_string(),
                    });
                }
            }

            let now = Utc::now();
            let from = incident.status;
            let effects = incident.attempt(target, now, reason)?;

            let mut events = vec![ExerciseEvent::IncidentTransitioned {
                incident_id: incident.id.clone(),
                team_id: incident.team_id.clone(),
                from,
                to: target,
                timestamp: now,
            }];
            if target == IncidentStatus::Resolved {
                events.push(ExerciseEvent::IncidentResolved {
                    incident_id: incident.id.clone(),
                    team_id: incident.team_id.clone(),
                    within_sla: incident.resolved_within_sla(),
                    timestamp: now,
                });
            }
            (incident.clone(), effects, events)
        };

        for event in events {
            self.emit(event);
        }
        self.run_effects(effects);
        Ok(snapshot)
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Create a draft plan. At most one non-terminal plan may be active
    /// per incident.
    pub fn create_plan(&self, seed: PlanSeed) -> SimResult<ImplementationPlan> {
        if let Some(incident_id) = &seed.incident_id {
            // Validate the incident exists and its active slot is free.
            self.incident(incident_id)?;
            if let Some(existing) = self.active_plan_for_incident(incident_id) {
                return Err(SimError::InvariantViolation(format!(
                    "incident {} already has active plan {}",
                    incident_id, existing.id
                )));
            }
        }

        let now = Utc::now();
        let plan = ImplementationPlan::new(seed, now);
        let snapshot = plan.clone();

        self.plans
            .write()
            .map_err(|_| self.poisoned(EntityKind::Plan, &snapshot.id))?
            .insert(snapshot.id.clone(), Arc::new(Mutex::new(plan)));

        debug!(plan_id = %snapshot.id, team_id = %snapshot.team_id, "Plan created");
        self.emit(ExerciseEvent::PlanCreated {
            plan_id: snapshot.id.clone(),
            team_id: snapshot.team_id.clone(),
            incident_id: snapshot.incident_id.clone(),
            timestamp: now,
        });
        Ok(snapshot)
    }

    /// Get a point-in-time copy of a plan.
    pub fn plan(&self, id: &str) -> SimResult<ImplementationPlan> {
        let slot = self.plan_slot(id)?;
        let guard = slot
            .lock()
            .map_err(|_| self.poisoned(EntityKind::Plan, id))?;
        Ok(guard.clone())
    }

    /// All plans owned by a team.
    pub fn plans_for_team(&self, team_id: &str) -> Vec<ImplementationPlan> {
        self.collect(&self.plans, |p: &ImplementationPlan| p.team_id == team_id)
    }

    /// The non-terminal plan occupying an incident's active slot, if any.
    pub fn active_plan_for_incident(&self, incident_id: &str) -> Option<ImplementationPlan> {
        self.collect(&self.plans, |p: &ImplementationPlan| {
            p.incident_id.as_deref() == Some(incident_id) && p.is_active()
        })
        .into_iter()
        .next()
    }

    /// Plans currently waiting on grading longer than `max_minutes`.
    pub fn plans_reviewing_longer_than(&self, max_minutes: i64) -> Vec<ImplementationPlan> {
        let now = Utc::now();
        self.collect(&self.plans, |p: &ImplementationPlan| {
            p.status == PlanStatus::AiReviewing
                && p.reviewing_for(now)
                    .map(|d| d.num_minutes() >= max_minutes)
                    .unwrap_or(false)
        })
    }

    /// Replace a plan's working body (drafting or revising only).
    pub fn revise_plan_body(&self, id: &str, body: &str) -> SimResult<ImplementationPlan> {
        let slot = self.plan_slot(id)?;
        let mut plan = slot
            .lock()
            .map_err(|_| self.poisoned(EntityKind::Plan, id))?;
        plan.revise_body(body, Utc::now())?;
        Ok(plan.clone())
    }

    /// Apply a plan transition.
    pub fn transition_plan(
        &self,
        id: &str,
        expected_from: Option<PlanStatus>,
        target: PlanStatus,
        reason: Option<&str>,
    ) -> SimResult<ImplementationPlan> {
        let slot = self.plan_slot(id)?;
        let (snapshot, effects, event) = {
            let mut plan = slot
                .lock()
                .map_err(|_| self.poisoned(EntityKind::Plan, id))?;

            if let Some(expected) = expected_from {
                if plan.status != expected {
                    return Err(SimError::ConcurrentModification {
                        kind: EntityKind::Plan,
                        id: id.to_string(),
                    });
                }
            }

            let now = Utc::now();
            let from = plan.status;
            let effects = plan.attempt(target, now, reason)?;
            let event = ExerciseEvent::PlanTransitioned {
                plan_id: plan.id.clone(),
                team_id: plan.team_id.clone(),
                from,
                to: target,
                timestamp: now,
            };
            (plan.clone(), effects, event)
        };

        self.emit(event);
        self.run_effects(effects);
        Ok(snapshot)
    }

    /// Apply a grading result as an independent transition out of
    /// `ai_reviewing`, recording the score and feedback alongside it.
    pub fn apply_plan_grading(
        &self,
        id: &str,
        decision: ReviewDecision,
        score: f64,
        feedback: &str,
    ) -> SimResult<ImplementationPlan> {
        let slot = self.plan_slot(id)?;
        let (snapshot, events) = {
            let mut plan = slot
                .lock()
                .map_err(|_| self.poisoned(EntityKind::Plan, id))?;

            let now = Utc::now();
            let from = plan.status;
            plan.attempt(decision.target_status(), now, Some("grading result"))?;
            plan.record_grading(score, feedback);

            let events = vec![
                ExerciseEvent::PlanTransitioned {
                    plan_id: plan.id.clone(),
                    team_id: plan.team_id.clone(),
                    from,
                    to: plan.status,
                    timestamp: now,
                },
                ExerciseEvent::PlanGraded {
                    plan_id: plan.id.clone(),
                    team_id: plan.team_id.clone(),
                    decision,
                    score,
                    timestamp: now,
                },
            ];
            (plan.clone(), events)
        };

        for event in events {
            self.emit(event);
        }
        Ok(snapshot)
    }

    // =========================================================================
    // Changes
    // =========================================================================

    /// Create a change request. Emergency changes come back already
    /// approved.
    pub fn create_change(&self, seed: ChangeSeed) -> SimResult<ChangeRequest> {
        let now = Utc::now();
        let change = ChangeRequest::new(seed, now);
        let snapshot = change.clone();

        self.changes
            .write()
            .map_err(|_| self.poisoned(EntityKind::Change, &snapshot.id))?
            .insert(snapshot.id.clone(), Arc::new(Mutex::new(change)));

        debug!(change_id = %snapshot.id, team_id = %snapshot.team_id, change_type = %snapshot.change_type, "Change created");
        self.emit(ExerciseEvent::ChangeCreated {
            change_id: snapshot.id.clone(),
            team_id: snapshot.team_id.clone(),
            change_type: snapshot.change_type,
            timestamp: now,
        });
        Ok(snapshot)
    }

    /// Get a point-in-time copy of a change request.
    pub fn change(&self, id: &str) -> SimResult<ChangeRequest> {
        let slot = self.change_slot(id)?;
        let guard = slot
            .lock()
            .map_err(|_| self.poisoned(EntityKind::Change, id))?;
        Ok(guard.clone())
    }

    /// All change requests owned by a team.
    pub fn changes_for_team(&self, team_id: &str) -> Vec<ChangeRequest> {
        self.collect(&self.changes, |c: &ChangeRequest| c.team_id == team_id)
    }

    /// The change request backed by the given plan, if any.
    pub fn change_for_plan(&self, plan_id: &str) -> Option<ChangeRequest> {
        self.collect(&self.changes, |c: &ChangeRequest| {
            c.related_plan_id.as_deref() == Some(plan_id)
        })
        .into_iter()
        .next()
    }

    /// Apply a change transition. A failure without a rollback plan
    /// spawns the follow-up incident before this returns.
    pub fn transition_change(
        &self,
        id: &str,
        expected_from: Option<ChangeStatus>,
        target: ChangeStatus,
        reason: Option<&str>,
    ) -> SimResult<ChangeRequest> {
        let slot = self.change_slot(id)?;
        let (snapshot, effects, event) = {
            let mut change = slot
                .lock()
                .map_err(|_| self.poisoned(EntityKind::Change, id))?;

            if let Some(expected) = expected_from {
                if change.status != expected {
                    return Err(SimError::ConcurrentModification {
                        kind: EntityKind::Change,
                        id: id.to_string(),
                    });
                }
            }

            let now = Utc::now();
            let from = change.status;
            let effects = change.attempt(target, now, reason)?;
            let event = ExerciseEvent::ChangeTransitioned {
                change_id: change.id.clone(),
                team_id: change.team_id.clone(),
                from,
                to: target,
                timestamp: now,
            };
            (change.clone(), effects, event)
        };

        self.emit(event);
        self.run_effects(effects);
        Ok(snapshot)
    }

    /// Record the realized outcome of a change implementation.
    pub fn record_change_implemented(
        &self,
        change_id: &str,
        outcome: crate::outcome::ImplementationOutcome,
    ) -> SimResult<()> {
        let change = self.change(change_id)?;
        self.emit(ExerciseEvent::ChangeImplemented {
            change_id: change.id,
            team_id: change.team_id,
            outcome,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Record a decision applied by the autonomous engine.
    pub fn record_decision(&self, team_id: &str, rule: &str, action: &str, target: &str) {
        self.emit(ExerciseEvent::DecisionApplied {
            team_id: team_id.to_string(),
            rule: rule.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Record a graded post-incident review.
    pub fn record_pir_grade(&self, incident_id: &str, score: f64) -> SimResult<()> {
        let incident = self.incident(incident_id)?;
        self.emit(ExerciseEvent::PirGraded {
            incident_id: incident.id,
            team_id: incident.team_id,
            score,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Execute edge side effects after the owning entity's lock is
    /// released.
    fn run_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::RequestPirReview {
                    incident_id,
                    team_id,
                } => {
                    self.emit(ExerciseEvent::PirRequested {
                        incident_id,
                        team_id,
                        timestamp: Utc::now(),
                    });
                }
                SideEffect::RequestPlanGrading {
                    plan_id,
                    team_id,
                    revision,
                } => {
                    let sink = self
                        .grading_sink
                        .read()
                        .expect("grading sink lock poisoned")
                        .clone();
                    match sink {
                        Some(tx) => {
                            let request = GradingRequest {
                                plan_id: plan_id.clone(),
                                team_id,
                                revision,
                            };
                            if tx.send(request).is_err() {
                                warn!(plan_id = %plan_id, "Grading sink closed; review sweep will recover the plan");
                            }
                        }
                        None => {
                            debug!(plan_id = %plan_id, revision, "No grading sink registered");
                        }
                    }
                }
                SideEffect::SpawnIncident(seed) => {
                    if let Err(e) = self.create_incident(seed) {
                        // Defensive: creation only fails on a poisoned
                        // map lock, which is fatal to the whole store.
                        warn!("Failed to spawn follow-up incident: {}", e);
                    }
                }
            }
        }
    }

    fn incident_slot(&self, id: &str) -> SimResult<Slot<Incident>> {
        self.incidents
            .read()
            .map_err(|_| self.poisoned(EntityKind::Incident, id))?
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::EntityNotFound {
                kind: EntityKind::Incident,
                id: id.to_string(),
            })
    }

    fn plan_slot(&self, id: &str) -> SimResult<Slot<ImplementationPlan>> {
        self.plans
            .read()
            .map_err(|_| self.poisoned(EntityKind::Plan, id))?
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::EntityNotFound {
                kind: EntityKind::Plan,
                id: id.to_string(),
            })
    }

    fn change_slot(&self, id: &str) -> SimResult<Slot<ChangeRequest>> {
        self.changes
            .read()
            .map_err(|_| self.poisoned(EntityKind::Change, id))?
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::EntityNotFound {
                kind: EntityKind::Change,
                id: id.to_string(),
            })
    }

    fn collect<T: Clone + crate::entities::WorkItem>(
        &self,
        map: &RwLock<HashMap<EntityId, Slot<T>>>,
        predicate: impl Fn(&T) -> bool,
    ) -> Vec<T> {
        let Ok(guard) = map.read() else {
            return Vec::new();
        };
        let mut items: Vec<T> = guard
            .values()
            .filter_map(|slot| {
                let entity = slot.lock().ok()?;
                predicate(&entity).then(|| entity.clone())
            })
            .collect();
        // Map iteration order is arbitrary; give callers stable output.
        items.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        items
    }

    fn poisoned(&self, kind: EntityKind, id: &str) -> SimError {
        SimError::ConcurrentModification {
            kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ChangeType, Priority, RiskLevel, Severity};
    use crate::events::{EventBus, EventLog};

    fn store() -> GameStore {
        GameStore::new(
            SessionConfig::with_duration(60),
            EventBus::new().shared(),
            EventLog::new().shared(),
        )
    }

    fn incident_seed(team: &str) -> IncidentSeed {
        IncidentSeed {
            team_id: team.into(),
            title: "Checkout errors".into(),
            priority: Priority::Critical,
            severity: Severity::Sev1,
            cost_per_minute: 500.0,
            requires_pir: true,
            affected_services: vec!["checkout".into()],
            sla_minutes: None,
            source_change_id: None,
        }
    }

    #[test]
    fn test_create_incident_derives_sla_from_session() {
        let store = store();
        let incident = store.create_incident(incident_seed("team-1")).unwrap();

        // Critical at 60 minutes: 10% clamped to [5, 30] = 6 minutes.
        let expected =
            incident.created_at + chrono::Duration::minutes(6);
        assert_eq!(incident.sla_deadline, Some(expected));
    }

    #[test]
    fn test_transition_emits_events() {
        let store = store();
        let incident = store.create_incident(incident_seed("team-1")).unwrap();

        store
            .transition_incident(&incident.id, None, IncidentStatus::InProgress, None)
            .unwrap();
        store
            .transition_incident(&incident.id, None, IncidentStatus::Resolved, None)
            .unwrap();

        assert_eq!(store.history.count_for_team("team-1", "incident_created"), 1);
        assert_eq!(
            store.history.count_for_team("team-1", "incident_transitioned"),
            2
        );
        assert_eq!(store.history.count_for_team("team-1", "incident_resolved"), 1);
        // requires_pir drove the obligation event.
        assert_eq!(store.history.count_for_team("team-1", "pir_requested"), 1);
    }

    #[test]
    fn test_stale_expected_status_is_concurrent_modification() {
        let store = store();
        let incident = store.create_incident(incident_seed("team-1")).unwrap();
        store
            .transition_incident(&incident.id, None, IncidentStatus::InProgress, None)
            .unwrap();

        let err = store
            .transition_incident(
                &incident.id,
                Some(IncidentStatus::Open),
                IncidentStatus::InProgress,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SimError::ConcurrentModification { .. }));
    }

    #[test]
    fn test_concurrent_attempts_one_winner() {
        let store = store().shared();
        let incident = store.create_incident(incident_seed("team-1")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            let id = incident.id.clone();
            handles.push(std::thread::spawn(move || {
                store.transition_incident(&id, None, IncidentStatus::InProgress, None)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejections = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(SimError::InvalidTransition { .. })
                        | Err(SimError::ConcurrentModification { .. })
                )
            })
            .count();
        assert_eq!(successes, 1);
        assert_eq!(rejections, 1);
    }

    #[test]
    fn test_single_active_plan_per_incident() {
        let store = store();
        let incident = store.create_incident(incident_seed("team-1")).unwrap();

        let seed = PlanSeed {
            team_id: "team-1".into(),
            title: "Plan".into(),
            body: "steps".into(),
            risk_level: RiskLevel::Low,
            incident_id: Some(incident.id.clone()),
        };
        store.create_plan(seed.clone()).unwrap();

        let err = store.create_plan(seed).unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation(_)));
    }

    #[test]
    fn test_plan_for_missing_incident_rejected() {
        let store = store();
        let err = store
            .create_plan(PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Low,
                incident_id: Some("no-such-incident".into()),
            })
            .unwrap_err();
        assert!(matches!(err, SimError::EntityNotFound { .. }));
    }

    #[test]
    fn test_grading_request_forwarded_to_sink() {
        let store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.set_grading_sink(tx);

        let plan = store
            .create_plan(PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Low,
                incident_id: None,
            })
            .unwrap();
        store
            .transition_plan(&plan.id, None, PlanStatus::AiReviewing, None)
            .unwrap();

        let request = rx.try_recv().unwrap();
        assert_eq!(request.plan_id, plan.id);
        assert_eq!(request.revision, 1);
    }

    #[test]
    fn test_failed_change_spawns_exactly_one_incident() {
        let store = store();
        let change = store
            .create_change(ChangeSeed {
                team_id: "team-1".into(),
                title: "Risky change".into(),
                change_type: ChangeType::Emergency,
                risk_level: RiskLevel::High,
                affected_services: vec!["payments".into()],
                related_plan_id: None,
                rollback_plan: None,
                has_test_plan: false,
            })
            .unwrap();

        store
            .transition_change(&change.id, None, ChangeStatus::InProgress, None)
            .unwrap();
        store
            .transition_change(&change.id, None, ChangeStatus::Failed, None)
            .unwrap();

        let incidents = store.incidents_for_team("team-1");
        assert_eq!(incidents.len(), 1);
        let spawned = &incidents[0];
        assert_eq!(spawned.priority, Priority::High);
        assert_eq!(spawned.affected_services, vec!["payments".to_string()]);
        assert_eq!(spawned.source_change_id.as_deref(), Some(change.id.as_str()));
    }

    #[test]
    fn test_apply_grading_moves_plan_and_records_score() {
        let store = store();
        let plan = store
            .create_plan(PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Low,
                incident_id: None,
            })
            .unwrap();
        store
            .transition_plan(&plan.id, None, PlanStatus::AiReviewing, None)
            .unwrap();

        let graded = store
            .apply_plan_grading(&plan.id, ReviewDecision::Approve, 0.92, "solid plan")
            .unwrap();

        assert_eq!(graded.status, PlanStatus::AiApproved);
        assert_eq!(graded.last_score, Some(0.92));
        assert_eq!(store.history.count_for_team("team-1", "plan_graded"), 1);
    }
}
