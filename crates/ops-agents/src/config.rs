//! Runner configuration.
//!
//! Defaults come from environment variables (`DRILL_*`), optionally
//! overridden by a TOML file. Every field has a sensible default so the
//! runner works out of the box.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rules::Role;

/// One simulated team in the exercise.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamSetup {
    pub id: String,
    /// Aggressive teams may emergency-resolve breached incidents.
    #[serde(default)]
    pub aggressive: bool,
    /// Roles the engine plays for this team, cycled every tick.
    #[serde(default = "default_roles")]
    pub roles: Vec<Role>,
}

fn default_roles() -> Vec<Role> {
    vec![Role::TechnicalOperations, Role::ChangeManagement]
}

/// Top-level runner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrillConfig {
    /// Session duration in minutes.
    pub session_minutes: u32,
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// Number of ticks to run before ending the session.
    pub max_ticks: u32,
    /// Seed for the change-outcome random source.
    pub seed: u64,
    /// Minutes before a stuck review is forced back to the author.
    pub review_timeout_minutes: i64,
    /// Base URL of the generative content service. Unset runs fully
    /// offline on the deterministic fallback.
    pub content_url: Option<String>,
    pub teams: Vec<TeamSetup>,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            session_minutes: env_parsed("DRILL_SESSION_MINUTES").unwrap_or(60),
            tick_interval_secs: env_parsed("DRILL_TICK_SECS").unwrap_or(5),
            max_ticks: env_parsed("DRILL_MAX_TICKS").unwrap_or(36),
            seed: env_parsed("DRILL_SEED").unwrap_or(7),
            review_timeout_minutes: env_parsed("DRILL_REVIEW_TIMEOUT_MINUTES").unwrap_or(2),
            content_url: std::env::var("DRILL_CONTENT_URL").ok(),
            teams: vec![
                TeamSetup {
                    id: "atlas".into(),
                    aggressive: true,
                    roles: default_roles(),
                },
                TeamSetup {
                    id: "borealis".into(),
                    aggressive: false,
                    roles: default_roles(),
                },
            ],
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl DrillConfig {
    /// Load configuration: defaults (plus env overrides), then the TOML
    /// file on top when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}
