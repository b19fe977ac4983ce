//! Arena engines.
//!
//! - `trading`: replays price paths and scores the agent's exposure
//! - `utility`: productivity tasks scored by UPI
//! - `coding`: code challenges scored by UPI with test pass rates
//! - `upi`, `rubric`: the shared sub-metrics
//!
//! [`ArenaEngine`] is a closed set; a new arena is a new variant. Scenarios
//! for one agent run sequentially through the shared sandbox.

pub mod coding;
pub mod rubric;
pub mod trading;
pub mod upi;
pub mod utility;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use arena_state::{AgentId, ArenaType, Tier};
use serde_json::Value;

use crate::domain::{
    ArenaRunResult, EngineFailure, RunMetrics, ScenarioOutcome, ScenarioSpec, UpiBreakdown,
};
use crate::obs;
use crate::sandbox::{ArenaTimeouts, ExecutionResult, SandboxExecutor};
use crate::scoring::UpiWeights;

pub use coding::CodingArena;
pub use trading::{MarketKind, MarketScenario, TradingArena};
pub use utility::UtilityArena;

/// Entry point every submitted interface must define.
pub const ENTRY_POINT: &str = "def decide(";

/// Maximum scenarios drawn from an agent's keywords.
pub const MAX_KEYWORD_SCENARIOS: usize = 5;

/// What an engine needs to know about the agent under test.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInterface {
    pub agent_id: AgentId,
    pub tier: Tier,
    pub keywords: Vec<String>,
    pub code: String,
}

impl AgentInterface {
    pub fn new(agent_id: AgentId, tier: Tier, code: impl Into<String>) -> Self {
        Self {
            agent_id,
            tier,
            keywords: Vec::new(),
            code: code.into(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

/// Reject code that cannot be an agent interface.
pub fn validate_interface(code: &str) -> Result<(), EngineFailure> {
    if code.trim().is_empty() {
        return Err(EngineFailure::MalformedInterface(
            "interface code is empty".into(),
        ));
    }
    if !code.contains(ENTRY_POINT) {
        return Err(EngineFailure::MalformedInterface(format!(
            "interface must define an entry point `{ENTRY_POINT}state)`"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum ArenaEngine {
    Trading(TradingArena),
    Utility(UtilityArena),
    Coding(CodingArena),
}

impl ArenaEngine {
    /// Engine for `arena_type` with default weights and timeouts.
    pub fn for_type(arena_type: ArenaType) -> Self {
        let timeout = ArenaTimeouts::default().for_arena(arena_type);
        match arena_type {
            ArenaType::Trading => ArenaEngine::Trading(TradingArena::new(timeout)),
            ArenaType::Utility => {
                ArenaEngine::Utility(UtilityArena::new(UpiWeights::default(), timeout))
            }
            ArenaType::Coding => {
                ArenaEngine::Coding(CodingArena::new(UpiWeights::default(), timeout))
            }
        }
    }

    /// Engine with weights and timeouts taken from configuration.
    pub fn configured(arena_type: ArenaType, weights: UpiWeights, timeouts: &ArenaTimeouts) -> Self {
        let timeout = timeouts.for_arena(arena_type);
        match arena_type {
            ArenaType::Trading => ArenaEngine::Trading(TradingArena::new(timeout)),
            ArenaType::Utility => ArenaEngine::Utility(UtilityArena::new(weights, timeout)),
            ArenaType::Coding => ArenaEngine::Coding(CodingArena::new(weights, timeout)),
        }
    }

    pub fn arena_type(&self) -> ArenaType {
        match self {
            ArenaEngine::Trading(_) => ArenaType::Trading,
            ArenaEngine::Utility(_) => ArenaType::Utility,
            ArenaEngine::Coding(_) => ArenaType::Coding,
        }
    }

    pub async fn run(
        &self,
        agent: &AgentInterface,
        sandbox: &dyn SandboxExecutor,
    ) -> Result<ArenaRunResult, EngineFailure> {
        validate_interface(&agent.code)?;
        match self {
            ArenaEngine::Trading(engine) => engine.run(agent, sandbox).await,
            ArenaEngine::Utility(engine) => engine.run(agent, sandbox).await,
            ArenaEngine::Coding(engine) => engine.run(agent, sandbox).await,
        }
    }
}

/// Resolve keyword-mapped scenario ids: keywords in order, duplicates
/// dropped, at most [`MAX_KEYWORD_SCENARIOS`]. No keywords means
/// `default_keyword`; no match means `fallback`.
pub(crate) fn select_ids(
    keywords: &[String],
    map: &[(&'static str, [&'static str; 3])],
    default_keyword: &str,
    fallback: &[&'static str],
) -> Vec<&'static str> {
    let defaults = [default_keyword.to_string()];
    let keywords = if keywords.is_empty() {
        &defaults[..]
    } else {
        keywords
    };

    let mut seen = HashSet::new();
    let selected: Vec<&'static str> = keywords
        .iter()
        .filter_map(|k| map.iter().find(|(kw, _)| kw.eq_ignore_ascii_case(k.trim())))
        .flat_map(|(_, ids)| ids.iter().copied())
        .filter(|id| seen.insert(*id))
        .take(MAX_KEYWORD_SCENARIOS)
        .collect();

    if selected.is_empty() {
        fallback.to_vec()
    } else {
        selected
    }
}

/// Scores one successful execution.
pub(crate) type UpiScorer = fn(&ScenarioSpec, &ExecutionResult, &Value, &UpiWeights) -> UpiBreakdown;

/// Run a UPI battery; failed scenarios count as UPI 0.
pub(crate) async fn run_upi_battery(
    arena_type: ArenaType,
    battery: &[ScenarioSpec],
    agent: &AgentInterface,
    sandbox: &dyn SandboxExecutor,
    timeout: Duration,
    weights: &UpiWeights,
    scorer: UpiScorer,
) -> Result<ArenaRunResult, EngineFailure> {
    if battery.is_empty() {
        return Err(EngineFailure::EmptyBattery { arena: arena_type });
    }

    let started = Instant::now();
    let mut scenarios = Vec::with_capacity(battery.len());
    let mut errors = Vec::new();
    let mut totals = UpiBreakdown::default();

    for spec in battery {
        let result = sandbox.execute(&agent.code, &spec.payload(), timeout).await;
        let breakdown = result
            .output()
            .map(|output| scorer(spec, &result, output, weights));

        let error = result.failure_reason();
        if let Some(reason) = &error {
            obs::emit_scenario_failed(&agent.agent_id.to_string(), &spec.id, reason);
            errors.push(format!("{}: {reason}", spec.id));
        }

        let b = breakdown.unwrap_or_default();
        totals.effectiveness += b.effectiveness;
        totals.efficiency += b.efficiency;
        totals.autonomy += b.autonomy;
        totals.upi += b.upi;

        scenarios.push(ScenarioOutcome {
            scenario_id: spec.id.clone(),
            difficulty: spec.difficulty,
            score: b.upi,
            status: result.status.label().to_string(),
            elapsed_ms: result.elapsed_ms,
            retries: result.retries,
            upi: breakdown,
            error,
        });
    }

    let n = battery.len() as f64;
    let mean = UpiBreakdown {
        effectiveness: totals.effectiveness / n,
        efficiency: totals.efficiency / n,
        autonomy: totals.autonomy / n,
        upi: totals.upi / n,
    };

    Ok(ArenaRunResult {
        agent_id: agent.agent_id.clone(),
        arena_type,
        performance_index: upi::clamp01(mean.upi),
        metrics: RunMetrics::Upi(mean),
        scenarios,
        errors,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: [(&str, [&str; 3]); 2] = [("a", ["a1", "a2", "shared"]), ("b", ["shared", "b1", "b2"])];

    #[test]
    fn test_validate_interface() {
        assert!(validate_interface("def decide(state):\n    return {}").is_ok());
        assert!(matches!(
            validate_interface("   "),
            Err(EngineFailure::MalformedInterface(_))
        ));
        assert!(matches!(
            validate_interface("def act(state): pass"),
            Err(EngineFailure::MalformedInterface(_))
        ));
    }

    #[test]
    fn test_select_ids_dedupes_and_caps() {
        let keywords = vec!["a".to_string(), "b".to_string()];
        let ids = select_ids(&keywords, &MAP, "a", &["f"]);
        assert_eq!(ids, vec!["a1", "a2", "shared", "b1", "b2"]);
    }

    #[test]
    fn test_select_ids_defaults_and_fallback() {
        assert_eq!(select_ids(&[], &MAP, "b", &["f"]), vec!["shared", "b1", "b2"]);
        let unknown = vec!["zzz".to_string()];
        assert_eq!(select_ids(&unknown, &MAP, "a", &["f"]), vec!["f"]);
    }

    #[test]
    fn test_for_type_matches_arena() {
        for arena in ArenaType::ALL {
            assert_eq!(ArenaEngine::for_type(arena).arena_type(), arena);
        }
    }
}
