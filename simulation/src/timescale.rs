//! Duration-relative time scaling.
//!
//! Pure functions mapping a configured session duration to SLA targets,
//! escalation thresholds, at-risk windows, and challenge-window lengths.
//! Identical inputs always produce identical outputs, every result lies
//! inside its category's `[min,max]` band, and results are monotonic in
//! the session duration within the unclamped region.
//!
//! Escalation thresholds are fixed fractions of the already-scaled SLA
//! target rather than independently scaled bands, so the ordering
//! `at_risk < L1 < L2 < L3 < sla` holds for every duration.

use serde::{Deserialize, Serialize};

use crate::entities::Priority;

/// A scaling band: `clamp(round(duration * percent), min, max)` minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScaleBand {
    /// Fraction of the session duration.
    pub percent: f64,
    /// Floor in minutes.
    pub min_minutes: u32,
    /// Ceiling in minutes.
    pub max_minutes: u32,
}

impl ScaleBand {
    /// Apply this band to a session duration in minutes.
    pub fn apply(&self, duration_minutes: u32) -> u32 {
        let raw = (duration_minutes as f64 * self.percent).round() as u32;
        raw.clamp(self.min_minutes, self.max_minutes)
    }
}

/// SLA band per incident priority.
fn sla_band(priority: Priority) -> ScaleBand {
    match priority {
        Priority::Critical => ScaleBand {
            percent: 0.10,
            min_minutes: 5,
            max_minutes: 30,
        },
        Priority::High => ScaleBand {
            percent: 0.20,
            min_minutes: 10,
            max_minutes: 60,
        },
        Priority::Medium => ScaleBand {
            percent: 0.35,
            min_minutes: 15,
            max_minutes: 120,
        },
        Priority::Low => ScaleBand {
            percent: 0.50,
            min_minutes: 20,
            max_minutes: 240,
        },
    }
}

/// Maximum allowed minutes-to-resolution for a priority at a given
/// session duration.
pub fn sla_target_minutes(priority: Priority, duration_minutes: u32) -> u32 {
    sla_band(priority).apply(duration_minutes)
}

/// Escalation levels, in firing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    L1,
    L2,
    L3,
}

impl EscalationLevel {
    /// Fraction of the scaled SLA target at which this level fires.
    fn fraction(self) -> f64 {
        match self {
            Self::L1 => 0.50,
            Self::L2 => 0.70,
            Self::L3 => 0.85,
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L1 => write!(f, "l1"),
            Self::L2 => write!(f, "l2"),
            Self::L3 => write!(f, "l3"),
        }
    }
}

/// Fraction of the SLA target below which an item counts as at risk.
/// Strictly below the L1 fraction.
const AT_RISK_FRACTION: f64 = 0.25;

/// Minutes of elapsed age at which the given escalation level fires.
///
/// Fractions of the scaled SLA are left unrounded so the strict ordering
/// between levels survives small SLA targets.
pub fn escalation_threshold_minutes(
    priority: Priority,
    duration_minutes: u32,
    level: EscalationLevel,
) -> f64 {
    sla_target_minutes(priority, duration_minutes) as f64 * level.fraction()
}

/// Remaining-time threshold below which an item is SLA-at-risk.
pub fn at_risk_threshold_minutes(priority: Priority, duration_minutes: u32) -> f64 {
    sla_target_minutes(priority, duration_minutes) as f64 * AT_RISK_FRACTION
}

/// Challenge-window categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeWindow {
    /// Quick tactical challenges.
    Sprint,
    /// The default window.
    Standard,
    /// Session-spanning challenges.
    Marathon,
}

impl ChallengeWindow {
    fn band(self) -> ScaleBand {
        match self {
            Self::Sprint => ScaleBand {
                percent: 0.08,
                min_minutes: 5,
                max_minutes: 15,
            },
            Self::Standard => ScaleBand {
                percent: 0.15,
                min_minutes: 10,
                max_minutes: 30,
            },
            Self::Marathon => ScaleBand {
                percent: 0.30,
                min_minutes: 15,
                max_minutes: 60,
            },
        }
    }
}

impl std::fmt::Display for ChallengeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sprint => write!(f, "sprint"),
            Self::Standard => write!(f, "standard"),
            Self::Marathon => write!(f, "marathon"),
        }
    }
}

/// Scaled length of a challenge window in minutes.
pub fn challenge_window_minutes(window: ChallengeWindow, duration_minutes: u32) -> u32 {
    window.band().apply(duration_minutes)
}

/// Buffer kept between a challenge window and the end of the session.
const REMAINING_BUFFER_MINUTES: u32 = 2;

/// Shortest window ever handed out, even when the session is nearly over.
const MIN_WINDOW_MINUTES: u32 = 5;

/// Cap a computed challenge window to the caller's remaining time,
/// leaving a two-minute buffer. Never returns less than five minutes;
/// the floor wins when the buffer cannot be honored.
pub fn cap_to_remaining(window_minutes: u32, remaining_minutes: u32) -> u32 {
    window_minutes
        .min(remaining_minutes.saturating_sub(REMAINING_BUFFER_MINUTES))
        .max(MIN_WINDOW_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATIONS: &[u32] = &[1, 5, 15, 30, 45, 60, 90, 120, 240, 480, 1440];

    #[test]
    fn test_sla_within_band() {
        for &d in DURATIONS {
            for &p in Priority::all() {
                let band = sla_band(p);
                let sla = sla_target_minutes(p, d);
                assert!(
                    sla >= band.min_minutes && sla <= band.max_minutes,
                    "sla {} out of band for {} at {}min",
                    sla,
                    p,
                    d
                );
            }
        }
    }

    #[test]
    fn test_sla_monotonic_in_duration() {
        for &p in Priority::all() {
            let mut prev = 0;
            for &d in DURATIONS {
                let sla = sla_target_minutes(p, d);
                assert!(sla >= prev, "sla not monotonic for {} at {}min", p, d);
                prev = sla;
            }
        }
    }

    #[test]
    fn test_sla_deterministic() {
        for &p in Priority::all() {
            assert_eq!(sla_target_minutes(p, 60), sla_target_minutes(p, 60));
        }
    }

    #[test]
    fn test_threshold_ordering_strict() {
        // at_risk < L1 < L2 < L3 < sla for every duration and priority.
        for &d in DURATIONS {
            for &p in Priority::all() {
                let sla = sla_target_minutes(p, d) as f64;
                let at_risk = at_risk_threshold_minutes(p, d);
                let l1 = escalation_threshold_minutes(p, d, EscalationLevel::L1);
                let l2 = escalation_threshold_minutes(p, d, EscalationLevel::L2);
                let l3 = escalation_threshold_minutes(p, d, EscalationLevel::L3);

                assert!(at_risk < l1, "{} at {}min: at_risk >= l1", p, d);
                assert!(l1 < l2, "{} at {}min: l1 >= l2", p, d);
                assert!(l2 < l3, "{} at {}min: l2 >= l3", p, d);
                assert!(l3 < sla, "{} at {}min: l3 >= sla", p, d);
            }
        }
    }

    #[test]
    fn test_critical_tighter_than_low() {
        for &d in DURATIONS {
            assert!(
                sla_target_minutes(Priority::Critical, d) <= sla_target_minutes(Priority::Low, d)
            );
        }
    }

    #[test]
    fn test_challenge_window_within_band() {
        for &d in DURATIONS {
            for w in [
                ChallengeWindow::Sprint,
                ChallengeWindow::Standard,
                ChallengeWindow::Marathon,
            ] {
                let band = w.band();
                let len = challenge_window_minutes(w, d);
                assert!(len >= band.min_minutes && len <= band.max_minutes);
            }
        }
    }

    #[test]
    fn test_cap_leaves_buffer() {
        // 20-minute window, 12 minutes remaining: capped to 10.
        assert_eq!(cap_to_remaining(20, 12), 10);
        // Plenty of remaining time: window untouched.
        assert_eq!(cap_to_remaining(20, 60), 20);
    }

    #[test]
    fn test_cap_never_below_floor() {
        assert_eq!(cap_to_remaining(20, 6), 5);
        assert_eq!(cap_to_remaining(20, 2), 5);
        assert_eq!(cap_to_remaining(20, 0), 5);
        assert_eq!(cap_to_remaining(3, 60), 5);
    }
}
