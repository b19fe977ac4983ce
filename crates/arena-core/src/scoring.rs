//! Score calculator: performance index to bounded daily score change.
//!
//! The raw target is `performance_index * max_score`. The day's movement is
//! clamped to `±daily_cap` first and the result is then clamped to
//! `[min_score, ceiling(tier)]`.

use arena_state::Tier;
use serde::{Deserialize, Serialize};

use crate::domain::ArenaRunResult;

/// Per-tier score ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCeilings {
    pub alpha: f64,
    pub beta: f64,
    pub omega: f64,
}

impl Default for TierCeilings {
    fn default() -> Self {
        Self {
            alpha: 75.0,
            beta: 90.0,
            omega: 100.0,
        }
    }
}

impl TierCeilings {
    pub fn get(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Alpha => self.alpha,
            Tier::Beta => self.beta,
            Tier::Omega => self.omega,
        }
    }
}

/// Weights of the Universal Performance Index. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpiWeights {
    pub effectiveness: f64,
    pub efficiency: f64,
    pub autonomy: f64,
}

impl Default for UpiWeights {
    fn default() -> Self {
        Self {
            effectiveness: 0.5,
            efficiency: 0.3,
            autonomy: 0.2,
        }
    }
}

impl UpiWeights {
    pub fn sum(&self) -> f64 {
        self.effectiveness + self.efficiency + self.autonomy
    }
}

/// Immutable scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score assigned at registration
    pub starting_score: f64,
    /// Maximum absolute score movement per day
    pub daily_cap: f64,
    pub min_score: f64,
    /// Score corresponding to a performance index of 1.0
    pub max_score: f64,
    pub ceilings: TierCeilings,
    pub weights: UpiWeights,
    /// Fraction of score kept across a tier change
    pub tier_change_carry: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            starting_score: 20.0,
            daily_cap: 5.0,
            min_score: 0.0,
            max_score: 100.0,
            ceilings: TierCeilings::default(),
            weights: UpiWeights::default(),
            tier_change_carry: 0.5,
        }
    }
}

impl ScoringPolicy {
    pub fn ceiling(&self, tier: Tier) -> f64 {
        self.ceilings.get(tier)
    }

    /// Starting score clamped into the tier's range.
    pub fn starting_score_for(&self, tier: Tier) -> f64 {
        self.starting_score.clamp(self.min_score, self.ceiling(tier))
    }

    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        if w.effectiveness < 0.0 || w.efficiency < 0.0 || w.autonomy < 0.0 {
            return Err("UPI weights must be non-negative".into());
        }
        if (w.sum() - 1.0).abs() > 1e-9 {
            return Err(format!("UPI weights must sum to 1.0, got {}", w.sum()));
        }
        if !(self.daily_cap > 0.0) {
            return Err("daily_cap must be positive".into());
        }
        if !(self.max_score > self.min_score) {
            return Err("max_score must exceed min_score".into());
        }
        for tier in Tier::ALL {
            let c = self.ceiling(tier);
            if c <= self.min_score || c > self.max_score {
                return Err(format!(
                    "{tier} ceiling {c} must lie in ({}, {}]",
                    self.min_score, self.max_score
                ));
            }
        }
        if !(self.tier_change_carry > 0.0 && self.tier_change_carry <= 1.0) {
            return Err("tier_change_carry must lie in (0, 1]".into());
        }
        Ok(())
    }
}

/// The bounded score movement for one agent on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub previous_score: f64,
    /// `performance_index * max_score`, rounded to 2 decimals
    pub raw_target: f64,
    pub raw_delta: f64,
    /// `raw_delta` clamped to `±daily_cap`
    pub capped_delta: f64,
    pub new_score: f64,
    /// `|raw_delta| > daily_cap`
    pub was_capped: bool,
    /// The uncapped-by-ceiling result reached or passed the tier ceiling
    pub ceiling_hit: bool,
}

/// Round half away from zero to 2 decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default)]
pub struct ScoreCalculator {
    policy: ScoringPolicy,
}

impl ScoreCalculator {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn compute(&self, previous_score: f64, result: &ArenaRunResult, tier: Tier) -> ScoreChange {
        self.compute_from_index(previous_score, result.performance_index, tier)
    }

    /// Same as [`compute`](Self::compute) from a bare performance index.
    ///
    /// Non-finite indices count as 0.
    pub fn compute_from_index(
        &self,
        previous_score: f64,
        performance_index: f64,
        tier: Tier,
    ) -> ScoreChange {
        let p = &self.policy;
        let index = if performance_index.is_finite() {
            performance_index.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let raw_target = round2(index * p.max_score);
        let raw_delta = raw_target - previous_score;
        let capped_delta = raw_delta.clamp(-p.daily_cap, p.daily_cap);
        let was_capped = raw_delta.abs() > p.daily_cap;

        let ceiling = p.ceiling(tier);
        let unclamped = previous_score + capped_delta;
        let new_score = unclamped.clamp(p.min_score, ceiling);

        ScoreChange {
            previous_score,
            raw_target,
            raw_delta,
            capped_delta,
            new_score,
            was_capped,
            ceiling_hit: unclamped >= ceiling,
        }
    }

    /// Score after moving to `new_tier`: the carried fraction, rounded to
    /// one decimal and clamped into the new tier's range.
    pub fn score_after_tier_change(&self, score: f64, new_tier: Tier) -> f64 {
        let p = &self.policy;
        round1(score * p.tier_change_carry).clamp(p.min_score, p.ceiling(new_tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> ScoreCalculator {
        ScoreCalculator::default()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(ScoringPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut policy = ScoringPolicy::default();
        policy.weights.autonomy = 0.3;
        let err = policy.validate().unwrap_err();
        assert!(err.contains("sum to 1.0"));
    }

    #[test]
    fn test_ceiling_above_max_rejected() {
        let mut policy = ScoringPolicy::default();
        policy.ceilings.omega = 120.0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_upward_move_is_capped() {
        let change = calc().compute_from_index(20.0, 0.40, Tier::Alpha);
        assert_eq!(change.raw_target, 40.0);
        assert_eq!(change.new_score, 25.0);
        assert!(change.was_capped);
        assert!(!change.ceiling_hit);
    }

    #[test]
    fn test_downward_move_is_capped() {
        let change = calc().compute_from_index(25.0, 0.10, Tier::Alpha);
        assert_eq!(change.new_score, 20.0);
        assert_eq!(change.capped_delta, -5.0);
        assert!(change.was_capped);
    }

    #[test]
    fn test_ceiling_applies_after_cap() {
        let change = calc().compute_from_index(74.0, 0.95, Tier::Alpha);
        assert_eq!(change.new_score, 75.0);
        assert!(change.was_capped);
        assert!(change.ceiling_hit);
    }

    #[test]
    fn test_delta_exactly_at_cap_is_not_capped() {
        let change = calc().compute_from_index(20.0, 0.25, Tier::Alpha);
        assert_eq!(change.new_score, 25.0);
        assert!(!change.was_capped);
    }

    #[test]
    fn test_small_move_passes_through() {
        let change = calc().compute_from_index(30.0, 0.3215, Tier::Beta);
        assert_eq!(change.raw_target, 32.15);
        assert!((change.new_score - 32.15).abs() < 1e-9);
        assert!(!change.was_capped);
    }

    #[test]
    fn test_floor_holds_at_zero() {
        let change = calc().compute_from_index(2.0, 0.0, Tier::Alpha);
        assert_eq!(change.new_score, 0.0);
    }

    #[test]
    fn test_non_finite_index_counts_as_zero() {
        let change = calc().compute_from_index(10.0, f64::NAN, Tier::Omega);
        assert_eq!(change.raw_target, 0.0);
        assert_eq!(change.new_score, 5.0);
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(12.345_000_1), 12.35);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
    }

    #[test]
    fn test_tier_change_carries_half() {
        let c = calc();
        assert_eq!(c.score_after_tier_change(60.0, Tier::Beta), 30.0);
        assert_eq!(c.score_after_tier_change(33.4, Tier::Omega), 16.7);
    }

    #[test]
    fn test_starting_score_respects_ceiling() {
        let mut policy = ScoringPolicy::default();
        policy.starting_score = 80.0;
        assert_eq!(policy.starting_score_for(Tier::Alpha), 75.0);
        assert_eq!(policy.starting_score_for(Tier::Omega), 80.0);
    }
}
