//! Asynchronous grading worker.
//!
//! Plan submissions commit immediately (the plan sits in
//! `ai_reviewing`) and the grading request lands on this worker's
//! queue. The external grading call runs with no entity lock held, and
//! the result is applied later as an independent transition. A periodic
//! sweep recovers plans stuck in review past the timeout by forcing
//! them back to `ai_needs_revision`, so no plan waits on a lost grading
//! result forever. Post-incident reviews are graded the same
//! fire-and-forget way, driven by `pir_requested` events off the bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use simulation::events::FilteredReceiver;
use simulation::store::SharedGameStore;
use simulation::{
    EventBus, EventFilter, ExerciseEvent, GradingRequest, Incident, PlanStatus, ReviewDecision,
    SimError,
};

use crate::content::{GenerativeService, IncidentSummary};

/// Feedback attached when grading falls back or times out.
const RECOVERY_FEEDBACK: &str = "Grading unavailable; revise and resubmit.";
const TIMEOUT_FEEDBACK: &str = "Review timed out; revise and resubmit.";

/// Worker configuration
#[derive(Debug, Clone)]
pub struct ReviewWorkerConfig {
    /// Minutes a plan may sit in `ai_reviewing` before the sweep
    /// forces it back to the author.
    pub review_timeout_minutes: i64,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for ReviewWorkerConfig {
    fn default() -> Self {
        Self {
            review_timeout_minutes: 2,
            sweep_interval: Duration::from_secs(15),
        }
    }
}

/// The grading worker
pub struct ReviewWorker {
    ctx: ReviewCtx,
    requests: mpsc::UnboundedReceiver<GradingRequest>,
    pir_events: FilteredReceiver,
}

/// Everything the handlers need, split from the receivers so the
/// select loop and the handlers borrow disjoint state.
struct ReviewCtx {
    store: SharedGameStore,
    content: Arc<dyn GenerativeService>,
    config: ReviewWorkerConfig,
}

impl ReviewWorker {
    /// Register the grading sink on the store, subscribe to PIR
    /// obligations, and spawn the worker loop.
    pub fn start(
        store: SharedGameStore,
        content: Arc<dyn GenerativeService>,
        bus: &EventBus,
        config: ReviewWorkerConfig,
    ) -> tokio::task::JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        store.set_grading_sink(tx);
        let pir_events = bus.subscribe_filtered(EventFilter::new().types(vec!["pir_requested"]));

        let worker = Self {
            ctx: ReviewCtx {
                store,
                content,
                config,
            },
            requests: rx,
            pir_events,
        };
        tokio::spawn(worker.run())
    }

    async fn run(self) {
        let Self {
            ctx,
            mut requests,
            mut pir_events,
        } = self;

        let mut sweep = tokio::time::interval(ctx.config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => ctx.grade_plan(request).await,
                    None => {
                        debug!("Grading queue closed; review worker stopping");
                        break;
                    }
                },
                event = pir_events.recv() => match event {
                    Ok(event) => ctx.grade_pir(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Review worker lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed; review worker stopping");
                        break;
                    }
                },
                _ = sweep.tick() => ctx.sweep_stuck(),
            }
        }
    }
}

impl ReviewCtx {
    async fn grade_plan(&self, request: GradingRequest) {
        let plan = match self.store.plan(&request.plan_id) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(plan_id = %request.plan_id, error = %e, "Grading request for unknown plan");
                return;
            }
        };
        if plan.status != PlanStatus::AiReviewing {
            // Swept or graded through another path already.
            debug!(plan_id = %plan.id, status = %plan.status, "Plan no longer in review");
            return;
        }

        let incident_summary = plan
            .incident_id
            .as_deref()
            .and_then(|id| self.store.incident(id).ok())
            .map(|incident| IncidentSummary::from_incident(&incident));

        // External call; no lock held.
        match self
            .content
            .evaluate_plan(&plan, incident_summary.as_ref())
            .await
        {
            Ok(evaluation) => {
                info!(
                    plan_id = %plan.id,
                    revision = request.revision,
                    decision = %evaluation.decision,
                    score = evaluation.score,
                    "Plan graded"
                );
                self.apply_grading(
                    &plan.id,
                    evaluation.decision,
                    evaluation.score,
                    &evaluation.feedback,
                );
            }
            Err(e) => {
                // Grading failures resolve to a recoverable status,
                // never a stuck review or a rejection.
                warn!(plan_id = %plan.id, error = %e, "Grading failed; returning plan to author");
                self.apply_grading(&plan.id, ReviewDecision::NeedsRevision, 0.0, RECOVERY_FEEDBACK);
            }
        }
    }

    async fn grade_pir(&self, event: ExerciseEvent) {
        let ExerciseEvent::PirRequested { incident_id, .. } = event else {
            return;
        };
        let incident = match self.store.incident(&incident_id) {
            Ok(incident) => incident,
            Err(e) => {
                warn!(incident_id = %incident_id, error = %e, "PIR requested for unknown incident");
                return;
            }
        };

        let body = pir_body(&incident);
        match self.content.grade_review(&body).await {
            Ok(grade) => {
                info!(incident_id = %incident.id, score = grade.score, "PIR graded");
                if let Err(e) = self.store.record_pir_grade(&incident.id, grade.score) {
                    warn!(incident_id = %incident.id, error = %e, "Failed to record PIR grade");
                }
            }
            Err(e) => {
                warn!(incident_id = %incident.id, error = %e, "PIR grading failed; skipping");
            }
        }
    }

    fn sweep_stuck(&self) {
        for plan in self
            .store
            .plans_reviewing_longer_than(self.config.review_timeout_minutes)
        {
            warn!(
                plan_id = %plan.id,
                reviewing_since = ?plan.reviewing_since,
                "Plan stuck in review; forcing back to author"
            );
            self.apply_grading(&plan.id, ReviewDecision::NeedsRevision, 0.0, TIMEOUT_FEEDBACK);
        }
    }

    fn apply_grading(&self, plan_id: &str, decision: ReviewDecision, score: f64, feedback: &str) {
        match self
            .store
            .apply_plan_grading(plan_id, decision, score, feedback)
        {
            Ok(_) => {}
            // The plan moved on (sweep vs. late result); the first
            // transition out of review wins.
            Err(SimError::InvalidTransition { .. }) => {
                debug!(plan_id, "Grading result arrived after the plan moved on");
            }
            Err(e) => {
                warn!(plan_id, error = %e, "Failed to apply grading result");
            }
        }
    }
}

/// Synthesize the review write-up sent for PIR grading.
fn pir_body(incident: &Incident) -> String {
    let resolution = incident
        .resolved_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unresolved".into());
    format!(
        "Post-incident review for '{}'\n\
         Priority: {}, severity: {}\n\
         Affected services: {}\n\
         Opened: {}\n\
         Resolved: {}\n\
         Transitions: {}",
        incident.title,
        incident.priority,
        incident.severity,
        incident.affected_services.join(", "),
        incident.created_at.to_rfc3339(),
        resolution,
        incident.transitions.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use simulation::{IncidentSeed, Priority, Severity};

    #[test]
    fn test_pir_body_includes_context() {
        let incident = Incident::new(
            IncidentSeed {
                team_id: "team-1".into(),
                title: "Cache stampede".into(),
                priority: Priority::High,
                severity: Severity::Sev2,
                cost_per_minute: 50.0,
                requires_pir: true,
                affected_services: vec!["cache".into(), "api".into()],
                sla_minutes: None,
                source_change_id: None,
            },
            30,
            Utc::now(),
        );

        let body = pir_body(&incident);
        assert!(body.contains("Cache stampede"));
        assert!(body.contains("cache, api"));
        assert!(body.contains("unresolved"));
    }
}
