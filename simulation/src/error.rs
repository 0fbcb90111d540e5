//! Error types shared across the simulation core.
//!
//! Transition guards report `InvalidTransition` without mutating the
//! entity; callers treat it as a normal guarded outcome, not a fault.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for simulation operations
pub type SimResult<T> = Result<T, SimError>;

/// The kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Incident,
    Plan,
    Change,
    Challenge,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incident => write!(f, "incident"),
            Self::Plan => write!(f, "plan"),
            Self::Change => write!(f, "change"),
            Self::Challenge => write!(f, "challenge"),
        }
    }
}

/// Error type for simulation core operations
#[derive(Debug, Error)]
pub enum SimError {
    /// The requested status edge is not in the entity's adjacency table.
    /// Entity state is untouched.
    #[error("illegal transition for {kind} {id}: {from} -> {to}")]
    InvalidTransition {
        kind: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: EntityKind, id: String },

    /// Lost a read-then-write race on an entity. Callers retry the whole
    /// perceive-decide-act cycle, not just the act step.
    #[error("concurrent modification on {kind} {id}")]
    ConcurrentModification { kind: EntityKind, id: String },

    /// The generative content service timed out or errored. Callers
    /// degrade to a local fallback rather than leaving the entity in an
    /// indeterminate state.
    #[error("content service unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A defensive check failed. Fatal to the single operation, logged,
    /// never silently ignored.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl SimError {
    /// Whether the caller should retry the full cycle after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Whether this error is a normal guarded outcome rather than a fault.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_edge() {
        let err = SimError::InvalidTransition {
            kind: EntityKind::Incident,
            id: "inc-1".into(),
            from: "resolved".into(),
            to: "open".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("incident"));
        assert!(msg.contains("resolved -> open"));
    }

    #[test]
    fn test_retryable_classification() {
        let cas = SimError::ConcurrentModification {
            kind: EntityKind::Plan,
            id: "plan-1".into(),
        };
        assert!(cas.is_retryable());
        assert!(!cas.is_guard_rejection());

        let guard = SimError::InvalidTransition {
            kind: EntityKind::Change,
            id: "chg-1".into(),
            from: "pending".into(),
            to: "completed".into(),
        };
        assert!(guard.is_guard_rejection());
        assert!(!guard.is_retryable());
    }
}
