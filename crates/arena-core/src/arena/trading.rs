//! Trading arena.
//!
//! Each scenario is a deterministic price path played out in decision
//! rounds. Every [`DECISION_BARS`] bars the agent sees the prices up to and
//! including the current bar, never later ones, and answers with one
//! exposure per bar for the next `horizon` bars (`positions`, each in
//! `[-1, 1]`, where 1 is fully long). Exposure `positions[t]` is held from
//! bar `t` to bar `t + 1`; changes pay half the scenario spread. A round
//! that fails or answers badly ends the scenario with a zero score.
//!
//! Scenario score blends three components with per-scenario weights:
//! return against half the perfect-foresight return, drawdown against a
//! 10 % tolerance, and capital preservation.

use std::time::{Duration, Instant};

use arena_state::{ArenaType, Tier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::upi::clamp01;
use super::AgentInterface;
use crate::domain::{ArenaRunResult, EngineFailure, MarketMetrics, RunMetrics, ScenarioOutcome};
use crate::domain::{ScenarioSpec, REPORT_KEY};
use crate::obs;
use crate::sandbox::SandboxExecutor;

pub const BARS: usize = 60;
/// Bars between two agent decisions.
pub const DECISION_BARS: usize = 10;
const START_PRICE: f64 = 100.0;
const BASE_SPREAD: f64 = 0.001;
const DRAWDOWN_TOLERANCE: f64 = 0.10;
const LOSS_TOLERANCE: f64 = 0.10;
/// Share of the perfect-foresight return that earns a full return score.
const TARGET_CAPTURE: f64 = 0.5;
const MIN_TARGET_RETURN: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    TrendingMarket,
    SidewaysChop,
    FlashCrash,
    LiquidityTrap,
    NewsSpike,
}

impl MarketKind {
    pub const ALL: [MarketKind; 5] = [
        MarketKind::TrendingMarket,
        MarketKind::SidewaysChop,
        MarketKind::FlashCrash,
        MarketKind::LiquidityTrap,
        MarketKind::NewsSpike,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::TrendingMarket => "trending_market",
            MarketKind::SidewaysChop => "sideways_chop",
            MarketKind::FlashCrash => "flash_crash",
            MarketKind::LiquidityTrap => "liquidity_trap",
            MarketKind::NewsSpike => "news_spike",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MarketKind::TrendingMarket => "Strong Trend",
            MarketKind::SidewaysChop => "Sideways Market",
            MarketKind::FlashCrash => "Flash Crash Recovery",
            MarketKind::LiquidityTrap => "Liquidity Trap",
            MarketKind::NewsSpike => "News Event Spike",
        }
    }

    /// Scenarios available to a tier.
    pub fn for_tier(tier: Tier) -> &'static [MarketKind] {
        match tier {
            Tier::Alpha => &Self::ALL[..3],
            Tier::Beta => &Self::ALL[..4],
            Tier::Omega => &Self::ALL,
        }
    }
}

/// Component weights; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub return_capture: f64,
    pub risk: f64,
    pub preservation: f64,
}

impl ComponentWeights {
    const fn new(return_capture: f64, risk: f64, preservation: f64) -> Self {
        Self {
            return_capture,
            risk,
            preservation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketScenario {
    pub kind: MarketKind,
    pub difficulty: f64,
    /// Round-trip spread as a fraction of price
    pub spread: f64,
    pub weights: ComponentWeights,
    pub prices: Vec<f64>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn path(kind: MarketKind) -> Vec<f64> {
    (0..BARS)
        .map(|t| {
            let t = t as f64;
            let p = match kind {
                MarketKind::TrendingMarket => {
                    START_PRICE * (0.004 * t).exp() * (1.0 + 0.003 * (0.9 * t).sin())
                }
                MarketKind::SidewaysChop => START_PRICE * (1.0 + 0.025 * (0.7 * t).sin()),
                MarketKind::FlashCrash => {
                    let wiggle = 1.0 + 0.002 * (1.1 * t).sin();
                    let level = if t < 20.0 {
                        START_PRICE
                    } else if t < 25.0 {
                        START_PRICE * (1.0 - 0.04 * (t - 19.0))
                    } else if t < 40.0 {
                        80.0 + 18.0 * (t - 24.0) / 15.0
                    } else {
                        98.0
                    };
                    level * wiggle
                }
                MarketKind::LiquidityTrap => {
                    START_PRICE * (1.0 - 0.0015 * t) * (1.0 + 0.006 * (1.3 * t).sin())
                }
                MarketKind::NewsSpike => {
                    let wiggle = 1.0 + 0.003 * (1.7 * t).sin();
                    let level = if t < 30.0 {
                        START_PRICE
                    } else {
                        // Spike, then partial give-back.
                        START_PRICE * (1.12 + 0.03 * (-(t - 30.0) / 6.0).exp())
                    };
                    level * wiggle
                }
            };
            round2(p)
        })
        .collect()
}

impl MarketScenario {
    pub fn new(kind: MarketKind) -> Self {
        let (difficulty, spread, weights) = match kind {
            MarketKind::TrendingMarket => (0.9, BASE_SPREAD, ComponentWeights::new(0.5, 0.3, 0.2)),
            MarketKind::SidewaysChop => (1.1, BASE_SPREAD, ComponentWeights::new(0.2, 0.3, 0.5)),
            MarketKind::FlashCrash => (1.2, BASE_SPREAD, ComponentWeights::new(0.3, 0.3, 0.4)),
            MarketKind::LiquidityTrap => (1.3, 0.05, ComponentWeights::new(0.2, 0.3, 0.5)),
            MarketKind::NewsSpike => (1.4, BASE_SPREAD, ComponentWeights::new(0.3, 0.4, 0.3)),
        };
        Self {
            kind,
            difficulty,
            spread,
            weights,
            prices: path(kind),
        }
    }

    /// Bars that hold an exposure (every bar but the last).
    fn traded_bars(&self) -> usize {
        self.prices.len().saturating_sub(1)
    }

    /// Bars at which the agent is asked for a decision.
    pub fn decision_points(&self) -> Vec<usize> {
        (0..self.traded_bars()).step_by(DECISION_BARS).collect()
    }

    /// Exposures the round starting at `bar` decides.
    pub fn horizon(&self, bar: usize) -> usize {
        DECISION_BARS.min(self.traded_bars().saturating_sub(bar))
    }

    /// The decision round at `bar` as handed to the agent. Only prices up
    /// to and including `bar` are visible; `position` is the exposure held
    /// going into the round.
    pub fn round_spec(&self, bar: usize, position: f64) -> ScenarioSpec {
        let visible = &self.prices[..(bar + 1).min(self.prices.len())];
        let horizon = self.horizon(bar);
        let input = json!({
            "scenario": self.kind.as_str(),
            "bar": bar,
            "bars": self.prices.len(),
            "horizon": horizon,
            "prices": visible,
            "spread": self.spread,
            "portfolio": {"balance": 10_000, "position": position},
            REPORT_KEY: {"positions": format!("positions:{horizon}")},
        });
        ScenarioSpec::new(self.kind.as_str(), self.kind.title(), ArenaType::Trading, self.difficulty)
            .with_input(input)
    }

    fn bar_returns(&self) -> Vec<f64> {
        self.prices
            .windows(2)
            .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
            .collect()
    }

    /// Return that perfect hindsight (always on the right side) would earn.
    pub fn perfect_foresight_return(&self) -> f64 {
        self.bar_returns()
            .iter()
            .fold(1.0, |equity, r| equity * (1.0 + r.abs()))
            - 1.0
    }

    /// Replay `positions` over the path.
    pub fn replay(&self, positions: &[f64]) -> Replay {
        let half_spread = self.spread / 2.0;
        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_drawdown = 0.0_f64;
        let mut held = 0.0_f64;

        for (t, r) in self.bar_returns().iter().enumerate() {
            let target = positions.get(t).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            equity *= 1.0 - half_spread * (target - held).abs();
            equity *= 1.0 + target * r;
            held = target;

            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }

        Replay {
            total_return: equity - 1.0,
            max_drawdown,
        }
    }

    pub fn score(&self, replay: &Replay) -> ScenarioScore {
        let target = (self.perfect_foresight_return() * TARGET_CAPTURE).max(MIN_TARGET_RETURN);
        let return_score = clamp01(replay.total_return / target);
        let risk_score = 1.0 - clamp01(replay.max_drawdown / DRAWDOWN_TOLERANCE);
        let preservation = if replay.total_return >= 0.0 {
            1.0
        } else {
            clamp01(1.0 + replay.total_return / LOSS_TOLERANCE)
        };
        let w = &self.weights;
        ScenarioScore {
            return_score,
            risk_score,
            preservation,
            score: clamp01(
                w.return_capture * return_score + w.risk * risk_score + w.preservation * preservation,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replay {
    pub total_return: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioScore {
    pub return_score: f64,
    pub risk_score: f64,
    pub preservation: f64,
    pub score: f64,
}

/// What one scenario's decision rounds produced.
struct Played {
    /// Exposures for every traded bar, or why the scenario failed
    positions: Result<Vec<f64>, String>,
    /// Status label of the last round run
    status: String,
    elapsed_ms: u64,
    retries: u32,
}

/// Extract the exposure vector. Missing trailing bars are flat; any
/// non-numeric entry rejects the whole answer.
pub fn parse_positions(output: &Value) -> Result<Vec<f64>, String> {
    let array = output
        .get("positions")
        .and_then(Value::as_array)
        .ok_or_else(|| "output has no positions array".to_string())?;
    array
        .iter()
        .enumerate()
        .map(|(i, v)| match v.as_f64() {
            Some(x) if x.is_finite() => Ok(x.clamp(-1.0, 1.0)),
            _ => Err(format!("positions[{i}] is not a number")),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TradingArena {
    timeout: Duration,
    battery: Option<Vec<MarketScenario>>,
}

impl TradingArena {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            battery: None,
        }
    }

    pub fn with_battery(mut self, battery: Vec<MarketScenario>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn tier_battery(tier: Tier) -> Vec<MarketScenario> {
        MarketKind::for_tier(tier)
            .iter()
            .map(|kind| MarketScenario::new(*kind))
            .collect()
    }

    /// Play every decision round of `scenario`, stopping at the first
    /// round that fails.
    async fn play(
        &self,
        agent: &AgentInterface,
        scenario: &MarketScenario,
        sandbox: &dyn SandboxExecutor,
    ) -> Played {
        let mut positions = Vec::with_capacity(BARS);
        let mut held = 0.0;
        let mut played = Played {
            positions: Ok(Vec::new()),
            status: String::new(),
            elapsed_ms: 0,
            retries: 0,
        };

        for bar in scenario.decision_points() {
            let spec = scenario.round_spec(bar, held);
            let result = sandbox
                .execute(&agent.code, &spec.payload(), self.timeout)
                .await;
            played.elapsed_ms = played.elapsed_ms.saturating_add(result.elapsed_ms);
            played.retries = played.retries.saturating_add(result.retries);
            played.status = result.status.label().to_string();

            let answer = match result.output() {
                Some(output) => parse_positions(output),
                None => Err(result.failure_reason().unwrap_or_default()),
            };
            let mut decided = match answer {
                Ok(decided) => decided,
                Err(reason) => {
                    if result.is_success() {
                        played.status = "invalid_output".to_string();
                    }
                    played.positions = Err(format!("round at bar {bar}: {reason}"));
                    return played;
                }
            };
            // Missing exposures are flat, extra ones are ignored.
            decided.resize(scenario.horizon(bar), 0.0);
            if let Some(last) = decided.last() {
                held = *last;
            }
            positions.extend(decided);
        }

        played.positions = Ok(positions);
        played
    }

    pub async fn run(
        &self,
        agent: &AgentInterface,
        sandbox: &dyn SandboxExecutor,
    ) -> Result<ArenaRunResult, EngineFailure> {
        let battery = match &self.battery {
            Some(fixed) => fixed.clone(),
            None => Self::tier_battery(agent.tier),
        };
        if battery.is_empty() {
            return Err(EngineFailure::EmptyBattery {
                arena: ArenaType::Trading,
            });
        }

        let started = Instant::now();
        let agent_id = agent.agent_id.to_string();
        let mut scenarios = Vec::with_capacity(battery.len());
        let mut errors = Vec::new();
        let mut weighted = 0.0;
        let mut total_difficulty = 0.0;
        let mut returns = Vec::new();
        let mut risk_scores = Vec::new();
        let mut worst_drawdown = 0.0_f64;

        for scenario in &battery {
            let scenario_id = scenario.kind.as_str().to_string();
            let played = self.play(agent, scenario, sandbox).await;

            let (score, error) = match played.positions {
                Ok(positions) => {
                    let replay = scenario.replay(&positions);
                    let scored = scenario.score(&replay);
                    returns.push(replay.total_return);
                    risk_scores.push(scored.risk_score);
                    worst_drawdown = worst_drawdown.max(replay.max_drawdown);
                    (scored.score, None)
                }
                Err(reason) => {
                    obs::emit_scenario_failed(&agent_id, &scenario_id, &reason);
                    errors.push(format!("{scenario_id}: {reason}"));
                    (0.0, Some(reason))
                }
            };

            weighted += score * scenario.difficulty;
            total_difficulty += scenario.difficulty;
            scenarios.push(ScenarioOutcome {
                scenario_id,
                difficulty: scenario.difficulty,
                score,
                status: played.status,
                elapsed_ms: played.elapsed_ms,
                retries: played.retries,
                upi: None,
                error,
            });
        }

        let mean = |xs: &[f64]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };
        let performance_index = if total_difficulty > 0.0 {
            clamp01(weighted / total_difficulty)
        } else {
            0.0
        };

        Ok(ArenaRunResult {
            agent_id: agent.agent_id.clone(),
            arena_type: ArenaType::Trading,
            performance_index,
            metrics: RunMetrics::Market(MarketMetrics {
                mean_return: mean(&returns),
                max_drawdown: worst_drawdown,
                risk_score: mean(&risk_scores),
            }),
            scenarios,
            errors,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_paths_are_deterministic() {
        for kind in MarketKind::ALL {
            let a = MarketScenario::new(kind);
            let b = MarketScenario::new(kind);
            assert_eq!(a.prices, b.prices);
            assert_eq!(a.prices.len(), BARS);
            assert!(a.prices.iter().all(|p| *p > 0.0));
        }
    }

    #[test]
    fn test_tier_batteries() {
        assert_eq!(MarketKind::for_tier(Tier::Alpha).len(), 3);
        assert_eq!(MarketKind::for_tier(Tier::Beta)[3], MarketKind::LiquidityTrap);
        assert_eq!(MarketKind::for_tier(Tier::Omega).len(), 5);
    }

    #[test]
    fn test_weights_sum_to_one() {
        for kind in MarketKind::ALL {
            let w = MarketScenario::new(kind).weights;
            assert!(approx(w.return_capture + w.risk + w.preservation, 1.0));
        }
    }

    #[test]
    fn test_flat_exposure_is_risk_free() {
        let scenario = MarketScenario::new(MarketKind::FlashCrash);
        let replay = scenario.replay(&[]);
        assert!(approx(replay.total_return, 0.0));
        assert!(approx(replay.max_drawdown, 0.0));
        let s = scenario.score(&replay);
        assert!(approx(s.score, 0.7));
    }

    #[test]
    fn test_long_through_crash_draws_down() {
        let scenario = MarketScenario::new(MarketKind::FlashCrash);
        let replay = scenario.replay(&vec![1.0; BARS]);
        assert!(replay.max_drawdown > 0.15);
        let s = scenario.score(&replay);
        assert!(approx(s.risk_score, 0.0));
        assert!(s.score < 0.7);
    }

    #[test]
    fn test_long_in_trend_beats_flat() {
        let scenario = MarketScenario::new(MarketKind::TrendingMarket);
        let flat = scenario.score(&scenario.replay(&[]));
        let long = scenario.score(&scenario.replay(&vec![1.0; BARS]));
        assert!(long.return_score > 0.0);
        assert!(long.score > flat.score);
    }

    #[test]
    fn test_spread_charged_on_changes() {
        let scenario = MarketScenario::new(MarketKind::LiquidityTrap);
        let flipping: Vec<f64> = (0..BARS).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let replay = scenario.replay(&flipping);
        assert!(replay.total_return < -0.5);
    }

    #[test]
    fn test_parse_positions() {
        assert_eq!(
            parse_positions(&json!({"positions": [0.5, 3.0, -7]})).unwrap(),
            vec![0.5, 1.0, -1.0]
        );
        assert!(parse_positions(&json!({"positions": [0.5, "x"]})).is_err());
        assert!(parse_positions(&json!({"orders": []})).is_err());
    }

    #[test]
    fn test_decision_rounds_cover_every_traded_bar() {
        let scenario = MarketScenario::new(MarketKind::NewsSpike);
        let points = scenario.decision_points();
        assert_eq!(points, vec![0, 10, 20, 30, 40, 50]);
        let covered: usize = points.iter().map(|bar| scenario.horizon(*bar)).sum();
        assert_eq!(covered, BARS - 1);
        assert_eq!(scenario.horizon(50), 9);
    }

    #[test]
    fn test_round_spec_hides_future_bars() {
        let scenario = MarketScenario::new(MarketKind::NewsSpike);
        let payload = scenario.round_spec(20, 0.5).payload();
        let prices = payload["prices"].as_array().unwrap();
        assert_eq!(prices.len(), 21);
        assert_eq!(prices[20].as_f64().unwrap(), scenario.prices[20]);
        assert_eq!(payload["bar"], 20);
        assert_eq!(payload["horizon"], 10);
        assert_eq!(payload["portfolio"]["position"], 0.5);
        assert_eq!(payload["report"]["positions"], "positions:10");

        let last = scenario.round_spec(50, 0.0).payload();
        assert_eq!(last["prices"].as_array().unwrap().len(), 51);
        assert_eq!(last["report"]["positions"], "positions:9");
    }
}
