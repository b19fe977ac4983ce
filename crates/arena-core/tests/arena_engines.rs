//! Arena engines end to end against scripted sandboxes.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use arena_core::arena::{coding, utility, CodingArena, TradingArena, UtilityArena};
use arena_core::{
    AgentId, AgentInterface, ArenaEngine, ArenaType, EngineFailure, Expectation, ExecutionResult,
    MarketKind, MarketScenario, RunMetrics, SandboxExecutor, ScenarioSpec, Tier, UpiWeights,
};
use async_trait::async_trait;
use serde_json::{json, Value};

const AGENT_CODE: &str = "def decide(state):\n    return {}\n";

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn agent(tier: Tier) -> AgentInterface {
    AgentInterface::new(AgentId::from("agent-under-test"), tier, AGENT_CODE)
}

/// Replays canned results in call order; crashes once the script runs out.
struct ScriptedSandbox {
    script: Mutex<VecDeque<ExecutionResult>>,
    inputs: Mutex<Vec<Value>>,
}

impl ScriptedSandbox {
    fn new(script: Vec<ExecutionResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    fn inputs(&self) -> Vec<Value> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn execute(&self, _code: &str, input: &Value, _timeout: Duration) -> ExecutionResult {
        self.inputs.lock().unwrap().push(input.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::crashed("script exhausted", 0))
    }
}

/// Answers every call with the same output.
struct ConstantSandbox(Value);

#[async_trait]
impl SandboxExecutor for ConstantSandbox {
    async fn execute(&self, _code: &str, _input: &Value, _timeout: Duration) -> ExecutionResult {
        ExecutionResult::success(self.0.clone(), 0)
    }
}

fn task(id: &str) -> ScenarioSpec {
    ScenarioSpec::new(id, id, ArenaType::Utility, 1.0)
        .with_input(json!({"task": id}))
        .requires("done", Expectation::Flag(true))
}

// ============================================================================
// Utility
// ============================================================================

#[tokio::test]
async fn test_perfect_plus_timeout_averages_to_half() {
    let sandbox = ScriptedSandbox::new(vec![
        ExecutionResult::success(json!({"done": true}), 0),
        ExecutionResult::timeout(30_000),
    ]);
    let engine = UtilityArena::new(UpiWeights::default(), Duration::from_secs(30))
        .with_battery(vec![task("perfect"), task("hangs")]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    assert!(approx(result.performance_index, 0.5));
    assert_eq!(result.scenarios.len(), 2);
    assert_eq!(result.scenarios_failed(), 1);
    assert_eq!(result.scenarios[1].status, "timeout");
    assert_eq!(result.scenarios[1].score, 0.0);
    assert!(result.errors[0].starts_with("hangs:"));
    match result.metrics {
        RunMetrics::Upi(upi) => assert!(approx(upi.effectiveness, 0.5)),
        other => panic!("expected UPI metrics, got {other:?}"),
    }
}

#[tokio::test]
async fn test_payload_carries_report_schema() {
    let sandbox = ScriptedSandbox::new(vec![ExecutionResult::success(json!({"done": true}), 0)]);
    let engine = UtilityArena::new(UpiWeights::default(), Duration::from_secs(30))
        .with_battery(vec![task("one")]);

    engine.run(&agent(Tier::Beta), &sandbox).await.unwrap();

    let inputs = sandbox.inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0]["task"], "one");
    assert_eq!(inputs[0]["report"]["done"], "bool");
}

#[tokio::test]
async fn test_keywords_pick_utility_battery() {
    let sandbox = ConstantSandbox(json!({}));
    let agent = agent(Tier::Alpha).with_keywords(vec!["email".into()]);

    let result = ArenaEngine::for_type(ArenaType::Utility)
        .run(&agent, &sandbox)
        .await
        .unwrap();

    let ids: Vec<String> = utility::select_battery(&agent.keywords)
        .into_iter()
        .map(|s| s.id)
        .collect();
    let ran: Vec<String> = result.scenarios.iter().map(|s| s.scenario_id.clone()).collect();
    assert_eq!(ran, ids);
    assert_eq!(result.arena_type, ArenaType::Utility);
}

#[tokio::test]
async fn test_empty_battery_is_agent_failure() {
    let sandbox = ConstantSandbox(json!({}));
    let engine = UtilityArena::new(UpiWeights::default(), Duration::from_secs(30))
        .with_battery(Vec::new());

    let err = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap_err();

    assert_eq!(
        err,
        EngineFailure::EmptyBattery {
            arena: ArenaType::Utility
        }
    );
}

// ============================================================================
// Coding
// ============================================================================

#[tokio::test]
async fn test_partial_test_pass_scores_upi() {
    let spec = coding::catalog()
        .into_iter()
        .find(|s| s.id == "fix_failing_tests")
        .unwrap();
    let sandbox = ScriptedSandbox::new(vec![ExecutionResult::success(
        json!({"tests_passed": 2, "compile_success": true}),
        0,
    )]);
    let engine =
        CodingArena::new(UpiWeights::default(), Duration::from_secs(60)).with_battery(vec![spec]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    let upi = result.scenarios[0].upi.unwrap();
    assert!(approx(upi.effectiveness, 0.6));
    assert!(approx(upi.efficiency, 0.96));
    assert!(approx(upi.autonomy, 1.0));
    assert!(approx(result.performance_index, 0.788));
}

#[tokio::test]
async fn test_retries_cost_autonomy() {
    let mut retried = ExecutionResult::success(json!({"done": true}), 0);
    retried.retries = 2;
    let sandbox = ScriptedSandbox::new(vec![retried]);
    let engine = UtilityArena::new(UpiWeights::default(), Duration::from_secs(30))
        .with_battery(vec![task("retried")]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    let upi = result.scenarios[0].upi.unwrap();
    assert!(approx(upi.autonomy, 0.5));
    assert_eq!(result.scenarios[0].retries, 2);
    assert!(approx(result.performance_index, 0.9));
}

// ============================================================================
// Trading
// ============================================================================

#[tokio::test]
async fn test_idle_alpha_trader_scores_risk_and_preservation() {
    let sandbox = ConstantSandbox(json!({"positions": []}));

    let result = ArenaEngine::for_type(ArenaType::Trading)
        .run(&agent(Tier::Alpha), &sandbox)
        .await
        .unwrap();

    let ran: Vec<&str> = result.scenarios.iter().map(|s| s.scenario_id.as_str()).collect();
    assert_eq!(ran, vec!["trending_market", "sideways_chop", "flash_crash"]);
    assert!(approx(result.performance_index, 0.678125));
    match result.metrics {
        RunMetrics::Market(m) => {
            assert!(approx(m.mean_return, 0.0));
            assert!(approx(m.max_drawdown, 0.0));
            assert!(approx(m.risk_score, 1.0));
        }
        other => panic!("expected market metrics, got {other:?}"),
    }
}

#[tokio::test]
async fn test_omega_runs_every_market() {
    let sandbox = ConstantSandbox(json!({"positions": []}));
    let result = TradingArena::new(Duration::from_secs(30))
        .run(&agent(Tier::Omega), &sandbox)
        .await
        .unwrap();
    assert_eq!(result.scenarios.len(), MarketKind::ALL.len());
}

#[tokio::test]
async fn test_unparseable_positions_score_zero() {
    let sandbox = ConstantSandbox(json!({"positions": ["long"]}));
    let engine = TradingArena::new(Duration::from_secs(30))
        .with_battery(vec![MarketScenario::new(MarketKind::FlashCrash)]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    assert_eq!(result.performance_index, 0.0);
    assert_eq!(result.scenarios[0].status, "invalid_output");
    assert_eq!(result.scenarios_failed(), 1);
}

#[tokio::test]
async fn test_trading_timeout_scores_zero_for_that_market() {
    let scenario = MarketScenario::new(MarketKind::FlashCrash);
    let rounds = scenario.decision_points().len();
    // Every round of the first market answers flat; the second market's
    // first round times out.
    let mut script = vec![ExecutionResult::success(json!({"positions": []}), 0); rounds];
    script.push(ExecutionResult::timeout(30_000));
    let sandbox = ScriptedSandbox::new(script);
    let engine = TradingArena::new(Duration::from_secs(30))
        .with_battery(vec![scenario.clone(), scenario]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    assert!(approx(result.performance_index, 0.35));
    assert_eq!(result.scenarios[0].status, "success");
    assert_eq!(result.scenarios[1].status, "timeout");
    assert_eq!(result.scenarios[1].elapsed_ms, 30_000);
    // A failed round ends its market.
    assert_eq!(sandbox.inputs().len(), rounds + 1);
}

#[tokio::test]
async fn test_failed_middle_round_fails_the_market() {
    let scenario = MarketScenario::new(MarketKind::TrendingMarket);
    let sandbox = ScriptedSandbox::new(vec![
        ExecutionResult::success(json!({"positions": vec![1.0; 10]}), 3),
        ExecutionResult::success(json!({"positions": vec![1.0; 10]}), 4),
        ExecutionResult::crashed("segfault", 5),
    ]);
    let engine = TradingArena::new(Duration::from_secs(30)).with_battery(vec![scenario]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    let market = &result.scenarios[0];
    assert_eq!(market.score, 0.0);
    assert_eq!(market.status, "crashed");
    assert_eq!(market.elapsed_ms, 12);
    assert!(market.error.as_deref().unwrap().starts_with("round at bar 20"));
    assert_eq!(sandbox.inputs().len(), 3);
}

/// Goes long before every rise it can see coming, i.e. reads
/// `prices[t + 1]` whenever the input carries it.
struct LookAheadSandbox {
    inputs: Mutex<Vec<Value>>,
}

#[async_trait]
impl SandboxExecutor for LookAheadSandbox {
    async fn execute(&self, _code: &str, input: &Value, _timeout: Duration) -> ExecutionResult {
        self.inputs.lock().unwrap().push(input.clone());
        let prices: Vec<f64> = input["prices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p.as_f64().unwrap())
            .collect();
        let bar = input["bar"].as_u64().unwrap() as usize;
        let horizon = input["horizon"].as_u64().unwrap() as usize;
        let positions: Vec<f64> = (bar..bar + horizon)
            .map(|t| match (prices.get(t), prices.get(t + 1)) {
                (Some(now), Some(next)) => (next - now).signum(),
                _ => 0.0,
            })
            .collect();
        ExecutionResult::success(json!({ "positions": positions }), 0)
    }
}

#[tokio::test]
async fn test_trader_never_sees_future_prices() {
    let scenario = MarketScenario::new(MarketKind::TrendingMarket);
    let sandbox = LookAheadSandbox {
        inputs: Mutex::new(Vec::new()),
    };
    let engine = TradingArena::new(Duration::from_secs(30)).with_battery(vec![scenario.clone()]);

    let result = engine.run(&agent(Tier::Alpha), &sandbox).await.unwrap();

    for input in sandbox.inputs.lock().unwrap().iter() {
        let bar = input["bar"].as_u64().unwrap() as usize;
        assert_eq!(input["prices"].as_array().unwrap().len(), bar + 1);
    }

    // With nothing ahead to read it stays flat, far from the hindsight path.
    let oracle: Vec<f64> = scenario
        .prices
        .windows(2)
        .map(|w| (w[1] - w[0]).signum())
        .collect();
    let flat = scenario.score(&scenario.replay(&[])).score;
    let hindsight = scenario.score(&scenario.replay(&oracle)).score;
    assert!(approx(result.scenarios[0].score, flat));
    assert!(hindsight > flat + 0.3);
}

// ============================================================================
// Interface validation
// ============================================================================

#[tokio::test]
async fn test_malformed_interface_never_reaches_sandbox() {
    let sandbox = ScriptedSandbox::new(Vec::new());
    let agent = AgentInterface::new(AgentId::from("bad"), Tier::Alpha, "print('hello')");

    let err = ArenaEngine::for_type(ArenaType::Coding)
        .run(&agent, &sandbox)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineFailure::MalformedInterface(_)));
    assert!(sandbox.inputs().is_empty());
}
