//! Session configuration.

use serde::{Deserialize, Serialize};

/// Configuration for one timed exercise session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Total session length in minutes. Every scaled window derives
    /// from this value.
    pub duration_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: std::env::var("DRILL_SESSION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl SessionConfig {
    /// Create a config with an explicit duration.
    pub fn with_duration(duration_minutes: u32) -> Self {
        Self { duration_minutes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_duration() {
        assert_eq!(SessionConfig::with_duration(90).duration_minutes, 90);
    }
}
