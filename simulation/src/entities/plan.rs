//! Implementation-plan lifecycle state machine.
//!
//! Submitting a plan for review snapshots the full body into an
//! immutable revision record before handing off to the grading
//! collaborator. Grading results arrive later as independent
//! transitions out of `ai_reviewing`, never synchronously within the
//! submitting call. A plan may only enter `implementing` from
//! `ai_approved`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityId, RiskLevel, SideEffect, TeamId, TransitionRecord, WorkItem, new_entity_id};
use crate::error::{EntityKind, SimError, SimResult};

/// Plan lifecycle statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Being drafted; not yet submitted.
    Draft,
    /// Submitted; waiting on the grading collaborator.
    AiReviewing,
    /// Graded approve; eligible for a change request.
    AiApproved,
    /// Graded needs-revision; back to the author.
    AiNeedsRevision,
    /// Graded reject (terminal state).
    AiRejected,
    /// Change work underway against this plan.
    Implementing,
    /// Implementation finished (terminal state).
    Completed,
}

impl PlanStatus {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AiRejected | Self::Completed)
    }

    /// Wire-format name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AiReviewing => "ai_reviewing",
            Self::AiApproved => "ai_approved",
            Self::AiNeedsRevision => "ai_needs_revision",
            Self::AiRejected => "ai_rejected",
            Self::Implementing => "implementing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Legal transitions in the plan state graph:
/// ```text
/// draft → ai_reviewing
/// ai_needs_revision → ai_reviewing
/// ai_reviewing → ai_approved | ai_needs_revision | ai_rejected
/// ai_approved → implementing
/// implementing → completed
/// ```
fn is_legal_transition(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::*;
    matches!(
        (from, to),
        (Draft, AiReviewing)
            | (AiNeedsRevision, AiReviewing)
            | (AiReviewing, AiApproved)
            | (AiReviewing, AiNeedsRevision)
            | (AiReviewing, AiRejected)
            | (AiApproved, Implementing)
            | (Implementing, Completed)
    )
}

/// Grading verdict from the content collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    NeedsRevision,
    Reject,
}

impl ReviewDecision {
    /// The plan status this verdict drives the plan into.
    pub fn target_status(self) -> PlanStatus {
        match self {
            Self::Approve => PlanStatus::AiApproved,
            Self::NeedsRevision => PlanStatus::AiNeedsRevision,
            Self::Reject => PlanStatus::AiRejected,
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::NeedsRevision => write!(f, "needs_revision"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Immutable snapshot of a plan body at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRevision {
    /// 1-indexed revision number.
    pub revision: u32,
    /// Full plan body as submitted.
    pub body: String,
    pub submitted_at: DateTime<Utc>,
}

/// Inputs for creating a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSeed {
    pub team_id: TeamId,
    pub title: String,
    pub body: String,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<EntityId>,
}

/// A remediation/implementation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub id: EntityId,
    pub team_id: TeamId,
    pub title: String,
    /// Working body; mutable while drafting or revising.
    pub body: String,
    pub risk_level: RiskLevel,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered revision history; append-only.
    pub revisions: Vec<PlanRevision>,
    /// Set while waiting on grading; used by the stuck-review sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewing_since: Option<DateTime<Utc>>,
    /// Score from the most recent grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_score: Option<f64>,
    /// Feedback from the most recent grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<String>,
    /// Audit log of every applied transition.
    pub transitions: Vec<TransitionRecord<PlanStatus>>,
}

impl ImplementationPlan {
    /// Create a new draft plan.
    pub fn new(seed: PlanSeed, now: DateTime<Utc>) -> Self {
        Self {
            id: new_entity_id(),
            team_id: seed.team_id,
            title: seed.title,
            body: seed.body,
            risk_level: seed.risk_level,
            status: PlanStatus::Draft,
            incident_id: seed.incident_id,
            created_at: now,
            updated_at: now,
            revisions: Vec::new(),
            reviewing_since: None,
            last_score: None,
            last_feedback: None,
            transitions: Vec::new(),
        }
    }

    /// Whether this plan still occupies its incident's active slot.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Attempt a status transition.
    ///
    /// Edges into `ai_reviewing` snapshot the body as a new revision and
    /// return a grading-request effect; edges out of `ai_reviewing`
    /// clear the reviewing timer. Illegal edges return
    /// `InvalidTransition` and leave state untouched.
    pub fn attempt(
        &mut self,
        target: PlanStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> SimResult<Vec<SideEffect>> {
        if !is_legal_transition(self.status, target) {
            return Err(SimError::InvalidTransition {
                kind: EntityKind::Plan,
                id: self.id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let mut effects = Vec::new();
        match target {
            PlanStatus::AiReviewing => {
                let revision = self.revisions.len() as u32 + 1;
                self.revisions.push(PlanRevision {
                    revision,
                    body: self.body.clone(),
                    submitted_at: now,
                });
                self.reviewing_since = Some(now);
                effects.push(SideEffect::RequestPlanGrading {
                    plan_id: self.id.clone(),
                    team_id: self.team_id.clone(),
                    revision,
                });
            }
            PlanStatus::AiApproved | PlanStatus::AiNeedsRevision | PlanStatus::AiRejected => {
                self.reviewing_since = None;
            }
            _ => {}
        }

        self.transitions.push(TransitionRecord {
            from: self.status,
            to: target,
            at: now,
            reason: reason.map(String::from),
        });
        self.status = target;
        self.updated_at = now;
        Ok(effects)
    }

    /// Record the grading result alongside the transition it drove.
    pub fn record_grading(&mut self, score: f64, feedback: impl Into<String>) {
        self.last_score = Some(score);
        self.last_feedback = Some(feedback.into());
    }

    /// Replace the working body while drafting or revising.
    pub fn revise_body(&mut self, body: impl Into<String>, now: DateTime<Utc>) -> SimResult<()> {
        if !matches!(self.status, PlanStatus::Draft | PlanStatus::AiNeedsRevision) {
            return Err(SimError::InvariantViolation(format!(
                "plan {} body is frozen in status {}",
                self.id, self.status
            )));
        }
        self.body = body.into();
        self.updated_at = now;
        Ok(())
    }

    /// How long this plan has been waiting on grading.
    pub fn reviewing_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.reviewing_since.map(|since| now - since)
    }
}

impl WorkItem for ImplementationPlan {
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
