//! Change implementation outcome model.
//!
//! The only intentional randomness in the core. A change's failure
//! probability is a fixed per-risk base, discounted by each optional
//! artifact present, realized as a single Bernoulli draw. The random
//! source is an injected capability so tests can force either branch.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entities::{ChangeRequest, RiskLevel};

/// Discount multiplier when an implementation plan is present.
const IMPLEMENTATION_PLAN_DISCOUNT: f64 = 0.7;
/// Discount multiplier when a rollback plan is present.
const ROLLBACK_PLAN_DISCOUNT: f64 = 0.8;
/// Discount multiplier when a test plan is present.
const TEST_PLAN_DISCOUNT: f64 = 0.9;

/// Base failure probability per risk level.
pub fn base_failure_probability(risk: RiskLevel) -> f64 {
    match risk {
        RiskLevel::Low => 0.05,
        RiskLevel::Medium => 0.15,
        RiskLevel::High => 0.30,
        RiskLevel::Critical => 0.45,
    }
}

/// Final failure probability after artifact discounts.
pub fn failure_probability(
    risk: RiskLevel,
    has_implementation_plan: bool,
    has_rollback_plan: bool,
    has_test_plan: bool,
) -> f64 {
    let mut p = base_failure_probability(risk);
    if has_implementation_plan {
        p *= IMPLEMENTATION_PLAN_DISCOUNT;
    }
    if has_rollback_plan {
        p *= ROLLBACK_PLAN_DISCOUNT;
    }
    if has_test_plan {
        p *= TEST_PLAN_DISCOUNT;
    }
    p
}

/// Realized result of implementing a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationOutcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for ImplementationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Injectable random source for outcome draws.
///
/// Production wires a seeded PRNG; tests substitute fixed sequences to
/// force both branches deterministically.
pub trait OutcomeRng: Send {
    /// A uniform sample from `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

/// Adapter exposing any `rand` generator as an outcome source.
pub struct RandomSource<R>(pub R);

impl<R: Rng + Send> OutcomeRng for RandomSource<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }
}

/// Fixed-sequence source for forcing outcomes in tests.
#[derive(Debug, Default)]
pub struct FixedRolls {
    rolls: Vec<f64>,
    next: usize,
}

impl FixedRolls {
    /// Replays the given samples in order, then repeats the last one.
    pub fn new(rolls: Vec<f64>) -> Self {
        Self { rolls, next: 0 }
    }
}

impl OutcomeRng for FixedRolls {
    fn next_unit(&mut self) -> f64 {
        let roll = self
            .rolls
            .get(self.next)
            .or_else(|| self.rolls.last())
            .copied()
            .unwrap_or(1.0);
        self.next += 1;
        roll
    }
}

/// Roll the implementation outcome for a change request.
pub fn roll_outcome(change: &ChangeRequest, rng: &mut dyn OutcomeRng) -> ImplementationOutcome {
    let p = failure_probability(
        change.risk_level,
        change.has_implementation_plan(),
        change.has_rollback_plan(),
        change.has_test_plan,
    );
    if rng.next_unit() < p {
        ImplementationOutcome::Failed
    } else {
        ImplementationOutcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ChangeSeed, ChangeType};
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn change(risk: RiskLevel, rollback: bool, plan: bool, test: bool) -> ChangeRequest {
        ChangeRequest::new(
            ChangeSeed {
                team_id: "team-1".into(),
                title: "Test change".into(),
                change_type: ChangeType::Normal,
                risk_level: risk,
                affected_services: vec!["svc".into()],
                related_plan_id: plan.then(|| "plan-1".into()),
                rollback_plan: rollback.then(|| "revert".into()),
                has_test_plan: test,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_base_probability_table() {
        assert_eq!(base_failure_probability(RiskLevel::Low), 0.05);
        assert_eq!(base_failure_probability(RiskLevel::Medium), 0.15);
        assert_eq!(base_failure_probability(RiskLevel::High), 0.30);
        assert_eq!(base_failure_probability(RiskLevel::Critical), 0.45);
    }

    #[test]
    fn test_all_artifacts_compound() {
        let p = failure_probability(RiskLevel::Critical, true, true, true);
        let expected = 0.45 * 0.7 * 0.8 * 0.9;
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn test_each_artifact_strictly_lowers_probability() {
        for risk in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            let none = failure_probability(risk, false, false, false);
            assert!(failure_probability(risk, true, false, false) < none);
            assert!(failure_probability(risk, false, true, false) < none);
            assert!(failure_probability(risk, false, false, true) < none);
            assert!(failure_probability(risk, true, true, true) < none);
        }
    }

    #[test]
    fn test_fixed_rolls_force_both_branches() {
        let c = change(RiskLevel::High, false, false, false); // p = 0.30

        let mut fail = FixedRolls::new(vec![0.0]);
        assert_eq!(roll_outcome(&c, &mut fail), ImplementationOutcome::Failed);

        let mut succeed = FixedRolls::new(vec![0.99]);
        assert_eq!(
            roll_outcome(&c, &mut succeed),
            ImplementationOutcome::Succeeded
        );
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let c = change(RiskLevel::Critical, false, false, false);

        let outcomes_a: Vec<_> = {
            let mut rng = RandomSource(Pcg64::seed_from_u64(42));
            (0..32).map(|_| roll_outcome(&c, &mut rng)).collect()
        };
        let outcomes_b: Vec<_> = {
            let mut rng = RandomSource(Pcg64::seed_from_u64(42));
            (0..32).map(|_| roll_outcome(&c, &mut rng)).collect()
        };
        assert_eq!(outcomes_a, outcomes_b);
    }

    #[test]
    fn test_artifacts_lower_realized_failure_rate() {
        // Strictly fewer failures with all three artifacts than with
        // none, for identical risk, over many trials.
        const TRIALS: usize = 20_000;
        let bare = change(RiskLevel::Critical, false, false, false);
        let covered = change(RiskLevel::Critical, true, true, true);

        let mut rng = RandomSource(Pcg64::seed_from_u64(7));
        let bare_failures = (0..TRIALS)
            .filter(|_| roll_outcome(&bare, &mut rng) == ImplementationOutcome::Failed)
            .count();

        let mut rng = RandomSource(Pcg64::seed_from_u64(7));
        let covered_failures = (0..TRIALS)
            .filter(|_| roll_outcome(&covered, &mut rng) == ImplementationOutcome::Failed)
            .count();

        assert!(
            covered_failures < bare_failures,
            "covered {} >= bare {}",
            covered_failures,
            bare_failures
        );
    }
}
