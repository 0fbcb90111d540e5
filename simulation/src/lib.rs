//! Exercise Simulation Core
//!
//! This library provides the deterministic core of a timed
//! IT-service-management team exercise:
//! - Duration-relative time scaling (SLA targets, escalation thresholds,
//!   at-risk windows, challenge windows)
//! - Coupled lifecycle state machines for incidents, implementation
//!   plans, and change requests, with edge-attached side effects
//! - The probabilistic change-outcome model behind an injectable random
//!   source
//! - An in-memory game store with per-entity locking and an append-only
//!   event history
//! - Event-scored progress evaluators (challenges and achievements)
//!
//! The autonomous team layer that perceives, decides, and acts over
//! this core lives in the `ops-agents` crate.

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod outcome;
pub mod progress;
pub mod store;
pub mod timescale;

// Re-export key entity types
pub use entities::{
    ChangeRequest, ChangeSeed, ChangeStatus, ChangeType, EntityId, ImplementationPlan, Incident,
    IncidentSeed, IncidentStatus, PlanRevision, PlanSeed, PlanStatus, Priority, ReviewDecision,
    RiskLevel, Severity, SideEffect, TeamId, TransitionRecord, WorkItem,
};

// Re-export error types
pub use error::{EntityKind, SimError, SimResult};

// Re-export event types
pub use events::{EventBus, EventFilter, EventLog, ExerciseEvent, SharedEventBus, SharedEventLog};

// Re-export outcome model
pub use outcome::{
    FixedRolls, ImplementationOutcome, OutcomeRng, RandomSource, failure_probability, roll_outcome,
};

// Re-export progress types
pub use progress::{
    AchievementLedger, AchievementProgress, AchievementSpec, Challenge, ChallengeStatus,
    ChallengeTracker, Criterion, QueueProbe,
};

// Re-export store types
pub use store::{GameStore, GradingRequest, SharedGameStore};

// Re-export session config
pub use config::SessionConfig;
