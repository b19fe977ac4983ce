//! Arena Core Library
//!
//! Evaluates autonomous agents once per day in sandboxed arenas, turns the
//! result into a bounded score change and derives a price from the score.
//!
//! Control flow: [`ArenaOrchestrator`] → [`ArenaEngine`] → [`SandboxExecutor`]
//! (per scenario) → [`ScoreCalculator`] → [`PriceCalculator`] → storage.

pub mod arena;
pub mod backoff;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod pricing;
pub mod sandbox;
pub mod scoring;
pub mod telemetry;

pub use arena::{validate_interface, AgentInterface, ArenaEngine, MarketKind, MarketScenario};

pub use config::ArenaConfig;

pub use domain::{
    ArenaError, ArenaResult, ArenaRunResult, EngineFailure, Expectation, MarketMetrics,
    RunMetrics, Rubric, ScenarioOutcome, ScenarioSpec, UpiBreakdown,
};

pub use orchestrator::{ArenaOrchestrator, BatchReport, OrchestratorSettings};

pub use pricing::{PriceCalculator, PriceQuote, PricingPolicy, TradeQuote, TradeSide};

pub use sandbox::{
    build_sandbox, ExecutionResult, ExecutionStatus, MockSandbox, Resource, SandboxBackend,
    SandboxExecutor, SandboxPool, SandboxSettings,
};

pub use scoring::{ScoreCalculator, ScoreChange, ScoringPolicy, TierCeilings, UpiWeights};

pub use arena_state::{
    AgentId, AgentOutcome, AgentProfile, AgentStore, ArenaType, InterfaceRef, InterfaceStore,
    OutcomeStatus, StorageError, Tier,
};
