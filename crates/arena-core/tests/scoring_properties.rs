//! Score and price invariants over sweeps of scores, indices and tiers.

use arena_core::{PriceCalculator, ScoreCalculator, ScoringPolicy, Tier, TradeSide};
use chrono::Utc;

const EPS: f64 = 1e-9;

fn scores(ceiling: f64) -> impl Iterator<Item = f64> {
    (0..=40).map(|i| i as f64 * 2.5).filter(move |s| *s <= ceiling)
}

fn indices() -> impl Iterator<Item = f64> {
    (0..=20).map(|i| i as f64 * 0.05)
}

// ============================================================================
// Score calculator
// ============================================================================

#[test]
fn daily_movement_never_exceeds_cap() {
    let calc = ScoreCalculator::default();
    let cap = calc.policy().daily_cap;
    for tier in Tier::ALL {
        for prev in scores(calc.policy().ceiling(tier)) {
            for index in indices() {
                let change = calc.compute_from_index(prev, index, tier);
                assert!(
                    (change.new_score - prev).abs() <= cap + EPS,
                    "{tier}: {prev} -> {} at index {index}",
                    change.new_score
                );
            }
        }
    }
}

#[test]
fn new_score_stays_within_tier_range() {
    let calc = ScoreCalculator::default();
    for tier in Tier::ALL {
        let ceiling = calc.policy().ceiling(tier);
        for prev in scores(ceiling) {
            for index in indices() {
                let change = calc.compute_from_index(prev, index, tier);
                assert!(change.new_score >= 0.0);
                assert!(change.new_score <= ceiling);
                if change.ceiling_hit {
                    assert_eq!(change.new_score, ceiling);
                }
            }
        }
    }
}

#[test]
fn capped_flag_matches_raw_delta() {
    let calc = ScoreCalculator::default();
    for prev in scores(75.0) {
        for index in indices() {
            let change = calc.compute_from_index(prev, index, Tier::Alpha);
            assert_eq!(change.was_capped, change.raw_delta.abs() > 5.0);
        }
    }
}

#[test]
fn out_of_range_index_is_clamped() {
    let calc = ScoreCalculator::default();
    let high = calc.compute_from_index(50.0, 7.0, Tier::Omega);
    assert_eq!(high.raw_target, 100.0);
    assert_eq!(high.new_score, 55.0);

    let low = calc.compute_from_index(50.0, -3.0, Tier::Omega);
    assert_eq!(low.raw_target, 0.0);
    assert_eq!(low.new_score, 45.0);
}

#[test]
fn up_then_down_returns_to_start() {
    let calc = ScoreCalculator::default();
    let up = calc.compute_from_index(20.0, 0.40, Tier::Alpha);
    assert_eq!(up.new_score, 25.0);
    let down = calc.compute_from_index(up.new_score, 0.10, Tier::Alpha);
    assert_eq!(down.new_score, 20.0);
    assert!(up.was_capped && down.was_capped);
}

#[test]
fn strong_agent_climbs_to_ceiling_and_stays() {
    let calc = ScoreCalculator::default();
    let mut score = 20.0;
    let mut days = 0;
    while score < 75.0 {
        score = calc.compute_from_index(score, 0.9, Tier::Alpha).new_score;
        days += 1;
        assert!(days <= 20, "never reached the ceiling");
    }
    assert_eq!(days, 11);

    let held = calc.compute_from_index(score, 0.9, Tier::Alpha);
    assert_eq!(held.new_score, 75.0);
    assert!(held.ceiling_hit);
}

#[test]
fn lowered_ceiling_wins_over_cap() {
    let mut policy = ScoringPolicy::default();
    policy.ceilings.alpha = 60.0;
    let calc = ScoreCalculator::new(policy);
    let change = calc.compute_from_index(70.0, 0.70, Tier::Alpha);
    assert_eq!(change.new_score, 60.0);
    assert!(change.ceiling_hit);
}

#[test]
fn tier_change_carry_lands_in_new_tier_range() {
    let calc = ScoreCalculator::default();
    for tier in Tier::ALL {
        for prev in scores(100.0) {
            let carried = calc.score_after_tier_change(prev, tier);
            assert!(carried >= 0.0);
            assert!(carried <= calc.policy().ceiling(tier));
            assert!(carried <= prev);
        }
    }
}

// ============================================================================
// Price calculator
// ============================================================================

#[test]
fn price_is_monotonic_in_score() {
    let pricer = PriceCalculator::default();
    for tier in Tier::ALL {
        let prices: Vec<f64> = scores(100.0).map(|s| pricer.price(s, tier)).collect();
        for pair in prices.windows(2) {
            assert!(pair[0] <= pair[1], "{tier}: {} > {}", pair[0], pair[1]);
        }
    }
}

#[test]
fn quote_lamports_follow_score() {
    let pricer = PriceCalculator::default();
    let quote = pricer.quote(42.0, Tier::Beta, Utc::now());
    assert_eq!(quote.price_lamports, 42 * 67);
    assert!((quote.price - 0.42).abs() < EPS);
    assert!((quote.market_cap_sol - quote.price_sol * 100_000_000.0).abs() < EPS);
}

#[test]
fn trade_fees_never_create_value() {
    let pricer = PriceCalculator::default();
    let quote = pricer.quote(50.0, Tier::Alpha, Utc::now());

    let buy = pricer.trade_quote(&quote, TradeSide::Buy, 1.0);
    assert!(buy.amount_out * quote.price_sol <= 1.0 - buy.fee_sol + EPS);

    let sell = pricer.trade_quote(&quote, TradeSide::Sell, buy.amount_out);
    assert!(sell.amount_out < 1.0);
    assert!(sell.fee_sol > 0.0);
}

#[test]
fn zero_score_quotes_zero() {
    let pricer = PriceCalculator::default();
    let quote = pricer.quote(0.0, Tier::Omega, Utc::now());
    assert_eq!(quote.price_lamports, 0);
    let buy = pricer.trade_quote(&quote, TradeSide::Buy, 5.0);
    assert_eq!(buy.amount_out, 0.0);
}
