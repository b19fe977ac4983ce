//! Domain types shared by the engines, calculators and orchestrator.
//!
//! - [`scenario`]: `ScenarioSpec`, `Rubric`, `Expectation`
//! - [`result`]: `ArenaRunResult`, `ScenarioOutcome`, metric breakdowns
//! - [`error`]: `EngineFailure`, `ArenaError`

pub mod error;
pub mod result;
pub mod scenario;

pub use error::{ArenaError, ArenaResult, EngineFailure};
pub use result::{ArenaRunResult, MarketMetrics, RunMetrics, ScenarioOutcome, UpiBreakdown};
pub use scenario::{Expectation, Rubric, ScenarioSpec, REPORT_KEY};
