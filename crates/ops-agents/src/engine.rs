//! The perceive → decide → act engine.
//!
//! One cycle per team per tick: capture an owned snapshot, run the
//! role's rule table, apply the single winning decision. Cycles for the
//! same team are serialized behind a per-team async mutex; different
//! teams run independently. Act-phase errors never escape to the
//! scheduler loop: they are logged, the entity keeps its
//! pre-transition status, and the next tick re-perceives. Losing a
//! read-then-write race retries the whole cycle from a fresh snapshot,
//! not just the act step.
//!
//! Every act is idempotent at the granularity of "has the target
//! already reached the requested status": replaying an applied decision
//! is a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use simulation::outcome::{ImplementationOutcome, OutcomeRng, roll_outcome};
use simulation::store::SharedGameStore;
use simulation::{
    ChangeSeed, ChangeStatus, ChangeType, IncidentStatus, PlanSeed, PlanStatus, SimError,
    SimResult, TeamId,
};

use crate::content::{GenerativeService, IncidentSummary};
use crate::perception::TeamSnapshot;
use crate::rules::{ActionKind, Decision, RoleProfile, decide};

/// How often a cycle re-perceives after losing a race before giving up
/// until the next tick.
const MAX_CYCLE_RETRIES: u32 = 2;

/// Result of one perceive-decide-act cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// The decision produced, if any rule matched.
    pub decision: Option<Decision>,
    /// Whether the act phase changed anything.
    pub applied: bool,
}

impl CycleOutcome {
    fn idle() -> Self {
        Self {
            decision: None,
            applied: false,
        }
    }
}

/// Autonomous decision engine playing team behavior.
pub struct DecisionEngine {
    store: SharedGameStore,
    content: Arc<dyn GenerativeService>,
    rng: Mutex<Box<dyn OutcomeRng>>,
    team_locks: Mutex<HashMap<TeamId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DecisionEngine {
    /// Create an engine over a store, a content collaborator, and an
    /// injected outcome random source.
    pub fn new(
        store: SharedGameStore,
        content: Arc<dyn GenerativeService>,
        rng: Box<dyn OutcomeRng>,
    ) -> Self {
        Self {
            store,
            content,
            rng: Mutex::new(rng),
            team_locks: Mutex::new(HashMap::new()),
        }
    }

    fn team_lock(&self, team_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.team_locks
            .lock()
            .expect("team lock map poisoned")
            .entry(team_id.to_string())
            .or_default()
            .clone()
    }

    /// Run one perceive-decide-act cycle for a team role.
    pub async fn run_cycle(&self, team_id: &str, profile: &RoleProfile) -> CycleOutcome {
        let lock = self.team_lock(team_id);
        let _serialized = lock.lock().await;

        let mut last_decision = None;
        for attempt in 0..=MAX_CYCLE_RETRIES {
            let snapshot = TeamSnapshot::capture(&self.store, team_id);
            let Some(decision) = decide(&snapshot, profile) else {
                // No matching rule is a valid terminal outcome for the tick.
                debug!(team_id, role = %profile.role, "No decision this cycle");
                return CycleOutcome::idle();
            };
            debug!(
                team_id,
                rule = decision.rule,
                priority = decision.priority,
                action = %decision.action,
                target = %decision.target,
                "Decision"
            );

            match self.apply_decision(team_id, &decision).await {
                Ok(applied) => {
                    if applied {
                        self.store.record_decision(
                            team_id,
                            decision.rule,
                            decision.action.as_str(),
                            &decision.target,
                        );
                    }
                    return CycleOutcome {
                        decision: Some(decision),
                        applied,
                    };
                }
                Err(e) if e.is_retryable() && attempt < MAX_CYCLE_RETRIES => {
                    debug!(team_id, error = %e, "Cycle lost a race; re-perceiving");
                    last_decision = Some(decision);
                }
                Err(e) => {
                    if e.is_guard_rejection() {
                        debug!(team_id, error = %e, "Act rejected by transition guard");
                    } else {
                        warn!(team_id, error = %e, "Act failed; entity left untouched");
                    }
                    return CycleOutcome {
                        decision: Some(decision),
                        applied: false,
                    };
                }
            }
        }
        CycleOutcome {
            decision: last_decision,
            applied: false,
        }
    }

    /// Apply a single decision. Returns `Ok(false)` when the target has
    /// already reached the requested status (idempotent replay).
    pub async fn apply_decision(&self, team_id: &str, decision: &Decision) -> SimResult<bool> {
        match decision.action {
            ActionKind::EmergencyResolve => self.act_emergency_resolve(&decision.target),
            ActionKind::CreatePlan => self.act_create_plan(team_id, &decision.target).await,
            ActionKind::SubmitPlan => self.act_submit_plan(&decision.target),
            ActionKind::RevisePlan => self.act_revise_plan(&decision.target),
            ActionKind::CreateChange => self.act_create_change(team_id, &decision.target),
            ActionKind::StartWork => self.act_start_work(&decision.target),
            ActionKind::ResolveIncident => self.act_resolve_incident(&decision.target),
            ActionKind::ApproveChange => self.act_approve_change(&decision.target),
            ActionKind::ImplementChange => self.act_implement_change(&decision.target),
        }
    }

    fn act_emergency_resolve(&self, incident_id: &str) -> SimResult<bool> {
        let incident = self.store.incident(incident_id)?;
        match incident.status {
            IncidentStatus::Resolved | IncidentStatus::Closed => Ok(false),
            status => {
                self.store.transition_incident(
                    incident_id,
                    Some(status),
                    IncidentStatus::Resolved,
                    Some("emergency resolve: SLA breached"),
                )?;
                Ok(true)
            }
        }
    }

    async fn act_create_plan(&self, team_id: &str, incident_id: &str) -> SimResult<bool> {
        if self.store.active_plan_for_incident(incident_id).is_some() {
            return Ok(false);
        }
        let incident = self.store.incident(incident_id)?;
        let summary = IncidentSummary::from_incident(&incident);

        // External call happens with no entity lock held.
        let draft = self.content.generate_plan(&summary).await?;

        match self.store.create_plan(PlanSeed {
            team_id: team_id.to_string(),
            title: draft.title,
            body: draft.body,
            risk_level: draft.risk_level,
            incident_id: Some(incident_id.to_string()),
        }) {
            Ok(_) => Ok(true),
            // Another cycle claimed the active slot between the check
            // and the insert.
            Err(SimError::InvariantViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn act_submit_plan(&self, plan_id: &str) -> SimResult<bool> {
        let plan = self.store.plan(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Ok(false);
        }
        self.store.transition_plan(
            plan_id,
            Some(PlanStatus::Draft),
            PlanStatus::AiReviewing,
            Some("submitted for review"),
        )?;
        Ok(true)
    }

    fn act_revise_plan(&self, plan_id: &str) -> SimResult<bool> {
        let plan = self.store.plan(plan_id)?;
        if plan.status != PlanStatus::AiNeedsRevision {
            return Ok(false);
        }
        let feedback = plan
            .last_feedback
            .as_deref()
            .unwrap_or("no feedback recorded");
        let revised = format!(
            "{}\n\nRevision {}: addressed feedback: {}",
            plan.body,
            plan.revisions.len() + 1,
            feedback
        );
        self.store.revise_plan_body(plan_id, &revised)?;
        self.store.transition_plan(
            plan_id,
            Some(PlanStatus::AiNeedsRevision),
            PlanStatus::AiReviewing,
            Some("resubmitted after revision"),
        )?;
        Ok(true)
    }

    fn act_create_change(&self, team_id: &str, plan_id: &str) -> SimResult<bool> {
        let plan = self.store.plan(plan_id)?;
        match plan.status {
            PlanStatus::AiApproved => {}
            // Interrupted after the change was created but before the
            // plan moved on: finish the plan transition below.
            PlanStatus::Implementing if self.store.change_for_plan(plan_id).is_none() => {}
            _ => return Ok(false),
        }

        if self.store.change_for_plan(plan_id).is_none() {
            let affected_services = match &plan.incident_id {
                Some(incident_id) => self.store.incident(incident_id)?.affected_services,
                None => Vec::new(),
            };
            let body = plan.body.to_lowercase();
            self.store.create_change(ChangeSeed {
                team_id: team_id.to_string(),
                title: format!("Implement: {}", plan.title),
                change_type: ChangeType::Normal,
                risk_level: plan.risk_level,
                affected_services,
                related_plan_id: Some(plan_id.to_string()),
                // Artifacts only count when the plan actually documents them.
                rollback_plan: body
                    .contains("rollback")
                    .then(|| "As documented in the implementation plan".to_string()),
                has_test_plan: body.contains("test"),
            })?;
        }

        if plan.status == PlanStatus::AiApproved {
            self.store.transition_plan(
                plan_id,
                Some(PlanStatus::AiApproved),
                PlanStatus::Implementing,
                Some("change request created"),
            )?;
        }
        Ok(true)
    }

    fn act_start_work(&self, incident_id: &str) -> SimResult<bool> {
        let incident = self.store.incident(incident_id)?;
        if incident.status != IncidentStatus::Open {
            return Ok(false);
        }
        self.store.transition_incident(
            incident_id,
            Some(IncidentStatus::Open),
            IncidentStatus::InProgress,
            Some("work started"),
        )?;
        Ok(true)
    }

    fn act_resolve_incident(&self, incident_id: &str) -> SimResult<bool> {
        let incident = self.store.incident(incident_id)?;
        if incident.status != IncidentStatus::InProgress {
            return Ok(false);
        }
        self.store.transition_incident(
            incident_id,
            Some(IncidentStatus::InProgress),
            IncidentStatus::Resolved,
            Some("corrective change implemented"),
        )?;
        Ok(true)
    }

    fn act_approve_change(&self, change_id: &str) -> SimResult<bool> {
        let change = self.store.change(change_id)?;
        if change.status != ChangeStatus::Pending {
            return Ok(false);
        }
        self.store.transition_change(
            change_id,
            Some(ChangeStatus::Pending),
            ChangeStatus::Approved,
            Some("change approved"),
        )?;
        Ok(true)
    }

    fn act_implement_change(&self, change_id: &str) -> SimResult<bool> {
        let change = self.store.change(change_id)?;
        match change.status {
            ChangeStatus::Approved => {
                self.store.transition_change(
                    change_id,
                    Some(ChangeStatus::Approved),
                    ChangeStatus::InProgress,
                    Some("implementation started"),
                )?;
            }
            // Resume a change left mid-implementation.
            ChangeStatus::InProgress => {}
            _ => return Ok(false),
        }

        let change = self.store.change(change_id)?;
        let outcome = {
            let mut rng = self.rng.lock().expect("outcome rng poisoned");
            roll_outcome(&change, rng.as_mut())
        };

        let (target, reason) = match outcome {
            ImplementationOutcome::Succeeded => {
                (ChangeStatus::Completed, "implementation succeeded")
            }
            ImplementationOutcome::Failed if change.has_rollback_plan() => {
                (ChangeStatus::RolledBack, "implementation failed; rollback executed")
            }
            ImplementationOutcome::Failed => {
                (ChangeStatus::Failed, "implementation failed; no rollback captured")
            }
        };
        self.store.transition_change(
            change_id,
            Some(ChangeStatus::InProgress),
            target,
            Some(reason),
        )?;
        self.store.record_change_implemented(change_id, outcome)?;

        // The plan's implementation attempt is concluded either way;
        // the failure signal lives on the change and any spawned
        // incident.
        if let Some(plan_id) = &change.related_plan_id {
            match self.store.transition_plan(
                plan_id,
                Some(PlanStatus::Implementing),
                PlanStatus::Completed,
                Some(reason),
            ) {
                Ok(_) => {}
                Err(e) if e.is_guard_rejection() || e.is_retryable() => {
                    debug!(plan_id = %plan_id, error = %e, "Plan already past implementing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}
