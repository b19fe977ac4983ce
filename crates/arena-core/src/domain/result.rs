//! Per-run evaluation results produced by the arena engines.

use arena_state::{AgentId, ArenaType};
use serde::{Deserialize, Serialize};

/// Universal Performance Index breakdown, every field in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpiBreakdown {
    pub effectiveness: f64,
    pub efficiency: f64,
    pub autonomy: f64,
    pub upi: f64,
}

/// Trading metrics aggregated over the scenarios run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    /// Mean realized return across scenarios (fraction, may be negative)
    pub mean_return: f64,
    /// Worst peak-to-trough drawdown seen in any scenario (fraction)
    pub max_drawdown: f64,
    /// Mean risk component score in `[0, 1]`
    pub risk_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunMetrics {
    Upi(UpiBreakdown),
    Market(MarketMetrics),
}

/// How one scenario went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    pub difficulty: f64,
    /// Scenario score in `[0, 1]` (UPI or trading score)
    pub score: f64,
    /// "success" | "timeout" | "crashed" | "resource_exceeded" | "invalid_output"
    pub status: String,
    pub elapsed_ms: u64,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upi: Option<UpiBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one engine pass for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaRunResult {
    pub agent_id: AgentId,
    pub arena_type: ArenaType,
    /// Normalized performance in `[0, 1]`
    pub performance_index: f64,
    pub metrics: RunMetrics,
    pub scenarios: Vec<ScenarioOutcome>,
    /// Non-fatal problems, one line per failed scenario
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl ArenaRunResult {
    pub fn scenarios_failed(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|s| s.status != "success")
            .count()
    }
}
