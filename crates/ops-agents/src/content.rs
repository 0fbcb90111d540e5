//! Generative content collaborator.
//!
//! Narrow request/response contract for drafting plans, grading plan
//! revisions, and grading post-incident reviews. The service is treated
//! as possibly slow and possibly failing: the HTTP client maps every
//! transport problem to `CollaboratorUnavailable`, and the resilient
//! wrapper degrades to a deterministic local fallback so entity state
//! is never left indeterminate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use simulation::{
    ImplementationPlan, Incident, Priority, ReviewDecision, RiskLevel, Severity, SimError,
    SimResult,
};

/// Request timeout for the content service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Compact incident context sent to the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub incident_id: String,
    pub title: String,
    pub priority: Priority,
    pub severity: Severity,
    pub affected_services: Vec<String>,
}

impl IncidentSummary {
    /// Build a summary from an incident snapshot.
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            title: incident.title.clone(),
            priority: incident.priority,
            severity: incident.severity,
            affected_services: incident.affected_services.clone(),
        }
    }
}

/// A drafted plan returned by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDraft {
    pub title: String,
    pub body: String,
    pub risk_level: RiskLevel,
}

/// Grading result for a plan revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEvaluation {
    pub score: f64,
    pub decision: ReviewDecision,
    pub feedback: String,
}

/// Grading result for a post-incident review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewGrade {
    pub score: f64,
    pub feedback: String,
}

/// The generative content contract.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Draft a remediation plan for an incident.
    async fn generate_plan(&self, incident: &IncidentSummary) -> SimResult<PlanDraft>;

    /// Grade a submitted plan revision against its incident context.
    async fn evaluate_plan(
        &self,
        plan: &ImplementationPlan,
        incident: Option<&IncidentSummary>,
    ) -> SimResult<PlanEvaluation>;

    /// Grade a post-incident review write-up.
    async fn grade_review(&self, review_body: &str) -> SimResult<ReviewGrade>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// HTTP client for a remote content service.
pub struct HttpContentService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    plan_id: &'a str,
    title: &'a str,
    body: &'a str,
    revision: usize,
    risk_level: RiskLevel,
    incident: Option<&'a IncidentSummary>,
}

#[derive(Serialize)]
struct GradeReviewRequest<'a> {
    body: &'a str,
}

impl HttpContentService {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> SimResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SimError::CollaboratorUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> SimResult<R> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SimError::CollaboratorUnavailable(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| SimError::CollaboratorUnavailable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| SimError::CollaboratorUnavailable(e.to_string()))
    }
}

#[async_trait]
impl GenerativeService for HttpContentService {
    async fn generate_plan(&self, incident: &IncidentSummary) -> SimResult<PlanDraft> {
        self.post_json("plan/generate", incident).await
    }

    async fn evaluate_plan(
        &self,
        plan: &ImplementationPlan,
        incident: Option<&IncidentSummary>,
    ) -> SimResult<PlanEvaluation> {
        let request = EvaluateRequest {
            plan_id: &plan.id,
            title: &plan.title,
            body: &plan.body,
            revision: plan.revisions.len(),
            risk_level: plan.risk_level,
            incident,
        };
        self.post_json("plan/evaluate", &request).await
    }

    async fn grade_review(&self, review_body: &str) -> SimResult<ReviewGrade> {
        self.post_json("review/grade", &GradeReviewRequest { body: review_body })
            .await
    }
}

// =============================================================================
// Deterministic fallback
// =============================================================================

/// Local fallback used when the remote service is unavailable.
///
/// Conservative on purpose: first submissions come back needs-revision
/// with concrete feedback, resubmissions pass with a modest score, and
/// review grades sit in the middle of the scale.
pub struct FallbackContent;

#[async_trait]
impl GenerativeService for FallbackContent {
    async fn generate_plan(&self, incident: &IncidentSummary) -> SimResult<PlanDraft> {
        let services = incident.affected_services.join(", ");
        Ok(PlanDraft {
            title: format!("Remediation plan: {}", incident.title),
            body: format!(
                "1. Confirm impact on {services}\n\
                 2. Identify the most recent change to the affected services\n\
                 3. Apply the corrective change\n\
                 4. Verify service health and error rates\n\
                 Rollback: restore the previous known-good configuration\n\
                 Test: run the service smoke checks before closing",
            ),
            risk_level: match incident.priority {
                Priority::Critical | Priority::High => RiskLevel::High,
                Priority::Medium => RiskLevel::Medium,
                Priority::Low => RiskLevel::Low,
            },
        })
    }

    async fn evaluate_plan(
        &self,
        plan: &ImplementationPlan,
        _incident: Option<&IncidentSummary>,
    ) -> SimResult<PlanEvaluation> {
        if plan.revisions.len() >= 2 {
            Ok(PlanEvaluation {
                score: 0.75,
                decision: ReviewDecision::Approve,
                feedback: "Revision addresses the earlier gaps; approved.".into(),
            })
        } else {
            Ok(PlanEvaluation {
                score: 0.55,
                decision: ReviewDecision::NeedsRevision,
                feedback: "Add explicit verification steps and an owner per step.".into(),
            })
        }
    }

    async fn grade_review(&self, _review_body: &str) -> SimResult<ReviewGrade> {
        Ok(ReviewGrade {
            score: 0.6,
            feedback: "Covers the timeline; add contributing factors and follow-ups.".into(),
        })
    }
}

// =============================================================================
// Degrading wrapper
// =============================================================================

/// Tries the primary service, degrades to the fallback on
/// `CollaboratorUnavailable`. Other errors pass through.
pub struct ResilientContent {
    primary: Option<Arc<dyn GenerativeService>>,
    fallback: FallbackContent,
}

impl ResilientContent {
    /// Wrap an optional primary service.
    pub fn new(primary: Option<Arc<dyn GenerativeService>>) -> Self {
        Self {
            primary,
            fallback: FallbackContent,
        }
    }

    /// Fallback-only instance for offline sessions.
    pub fn offline() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl GenerativeService for ResilientContent {
    async fn generate_plan(&self, incident: &IncidentSummary) -> SimResult<PlanDraft> {
        if let Some(primary) = &self.primary {
            match primary.generate_plan(incident).await {
                Ok(draft) => return Ok(draft),
                Err(SimError::CollaboratorUnavailable(e)) => {
                    warn!(error = %e, "Content service unavailable; using fallback draft");
                }
                Err(e) => return Err(e),
            }
        }
        self.fallback.generate_plan(incident).await
    }

    async fn evaluate_plan(
        &self,
        plan: &ImplementationPlan,
        incident: Option<&IncidentSummary>,
    ) -> SimResult<PlanEvaluation> {
        if let Some(primary) = &self.primary {
            match primary.evaluate_plan(plan, incident).await {
                Ok(evaluation) => return Ok(evaluation),
                Err(SimError::CollaboratorUnavailable(e)) => {
                    warn!(error = %e, "Content service unavailable; using fallback grading");
                }
                Err(e) => return Err(e),
            }
        }
        self.fallback.evaluate_plan(plan, incident).await
    }

    async fn grade_review(&self, review_body: &str) -> SimResult<ReviewGrade> {
        if let Some(primary) = &self.primary {
            match primary.grade_review(review_body).await {
                Ok(grade) => return Ok(grade),
                Err(SimError::CollaboratorUnavailable(e)) => {
                    warn!(error = %e, "Content service unavailable; using fallback grade");
                }
                Err(e) => return Err(e),
            }
        }
        self.fallback.grade_review(review_body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use simulation::{PlanSeed, PlanStatus};

    fn summary() -> IncidentSummary {
        IncidentSummary {
            incident_id: "inc-1".into(),
            title: "Queue backlog".into(),
            priority: Priority::High,
            severity: Severity::Sev2,
            affected_services: vec!["worker-pool".into()],
        }
    }

    fn plan_with_revisions(n: usize) -> ImplementationPlan {
        let now = Utc::now();
        let mut plan = ImplementationPlan::new(
            PlanSeed {
                team_id: "team-1".into(),
                title: "Plan".into(),
                body: "steps".into(),
                risk_level: RiskLevel::Medium,
                incident_id: None,
            },
            now,
        );
        for i in 0..n {
            plan.attempt(PlanStatus::AiReviewing, now, None).unwrap();
            if i + 1 < n {
                plan.attempt(PlanStatus::AiNeedsRevision, now, None).unwrap();
            }
        }
        plan
    }

    #[tokio::test]
    async fn test_fallback_draft_carries_rollback_and_test_lines() {
        let draft = FallbackContent.generate_plan(&summary()).await.unwrap();
        assert!(draft.body.contains("Rollback:"));
        assert!(draft.body.contains("Test:"));
        assert_eq!(draft.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_fallback_grading_is_conservative_then_approves() {
        let first = FallbackContent
            .evaluate_plan(&plan_with_revisions(1), None)
            .await
            .unwrap();
        assert_eq!(first.decision, ReviewDecision::NeedsRevision);

        let second = FallbackContent
            .evaluate_plan(&plan_with_revisions(2), None)
            .await
            .unwrap();
        assert_eq!(second.decision, ReviewDecision::Approve);
    }

    struct FailingPrimary;

    #[async_trait]
    impl GenerativeService for FailingPrimary {
        async fn generate_plan(&self, _incident: &IncidentSummary) -> SimResult<PlanDraft> {
            Err(SimError::CollaboratorUnavailable("timeout".into()))
        }
        async fn evaluate_plan(
            &self,
            _plan: &ImplementationPlan,
            _incident: Option<&IncidentSummary>,
        ) -> SimResult<PlanEvaluation> {
            Err(SimError::CollaboratorUnavailable("timeout".into()))
        }
        async fn grade_review(&self, _review_body: &str) -> SimResult<ReviewGrade> {
            Err(SimError::CollaboratorUnavailable("timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_resilient_degrades_to_fallback() {
        let service = ResilientContent::new(Some(Arc::new(FailingPrimary)));
        let draft = service.generate_plan(&summary()).await.unwrap();
        assert!(draft.body.contains("Rollback:"));

        let grade = service.grade_review("timeline...").await.unwrap();
        assert!(grade.score > 0.0);
    }
}
