//! Autonomous Team Agents
//!
//! This library plays absent or under-specified team behavior in a
//! timed ITSM exercise:
//! - Perception snapshots over the simulation store
//! - Priority-ordered rule tables per role (first match wins)
//! - The perceive → decide → act engine with per-team serialization
//! - The generative content collaborator (HTTP client, deterministic
//!   fallback, degrading wrapper)
//! - The asynchronous grading worker with a stuck-review sweep
//!
//! The `drill` binary wires these into a complete exercise session.

pub mod config;
pub mod content;
pub mod engine;
pub mod perception;
pub mod review;
pub mod rules;

// Re-export the engine surface
pub use engine::{CycleOutcome, DecisionEngine};

// Re-export perception types
pub use perception::TeamSnapshot;

// Re-export rule types
pub use rules::{ActionKind, Decision, Role, RoleProfile, Rule, decide, rule_table};

// Re-export content collaborator types
pub use content::{
    FallbackContent, GenerativeService, HttpContentService, IncidentSummary, PlanDraft,
    PlanEvaluation, ResilientContent, ReviewGrade,
};

// Re-export review worker types
pub use review::{ReviewWorker, ReviewWorkerConfig};

// Re-export runner configuration
pub use config::{DrillConfig, TeamSetup};
