//! Agent arena daemon.
//!
//! Runs the daily batch for every due agent on a fixed tick. Agents already
//! scored for the day are skipped by the store, so ticking more often than
//! daily only picks up newly registered agents and agents left over by an
//! aborted batch. An agent whose evaluation failed is not retried by the
//! daemon until the next day; `arena run` retries it on demand.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arena_core::telemetry::init_tracing;
use arena_core::{
    AgentId, AgentStore, ArenaConfig, ArenaOrchestrator, BatchReport, OutcomeStatus,
};
use arena_state::SurrealArenaStore;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, Level};

#[derive(Parser)]
#[command(name = "arenad")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs the agent arena daily batch on a schedule", long_about = None)]
struct Cli {
    /// Seconds between batch runs
    #[arg(long, default_value = "3600", env = "ARENAD_TICK_SECS")]
    tick_secs: u64,

    /// Run a single batch and exit
    #[arg(long)]
    once: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, env = "ARENA_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = ArenaConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load arena configuration")?;
    let store = Arc::new(
        SurrealArenaStore::from_env()
            .await
            .context("Failed to connect to arena database")?,
    );
    let orchestrator = ArenaOrchestrator::from_config(store.clone(), store.clone(), &config)
        .context("Failed to build arena orchestrator")?;
    let mut failed = FailedToday::default();

    if cli.once {
        let day = Utc::now().date_naive();
        return run_once(&orchestrator, store.as_ref(), &mut failed, day).await;
    }

    let tick = Duration::from_secs(cli.tick_secs.max(1));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(tick_secs = tick.as_secs(), "arenad started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // A failed batch is logged; the next tick tries again.
                let day = Utc::now().date_naive();
                if let Err(e) = run_once(&orchestrator, store.as_ref(), &mut failed, day).await {
                    error!(error = %format!("{e:#}"), "daily batch failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    info!("arenad stopped");
    Ok(())
}

/// Agents whose evaluation failed on `day`. Cleared when the day changes.
#[derive(Debug, Default)]
struct FailedToday {
    day: Option<NaiveDate>,
    agents: HashSet<AgentId>,
}

impl FailedToday {
    fn roll_to(&mut self, day: NaiveDate) {
        if self.day != Some(day) {
            self.day = Some(day);
            self.agents.clear();
        }
    }

    fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.contains(agent_id)
    }

    fn record(&mut self, report: &BatchReport) {
        self.agents.extend(
            report
                .outcomes
                .iter()
                .filter(|o| o.status == OutcomeStatus::Failed)
                .map(|o| o.agent_id.clone()),
        );
    }
}

async fn run_once(
    orchestrator: &ArenaOrchestrator,
    store: &dyn AgentStore,
    failed: &mut FailedToday,
    day: NaiveDate,
) -> Result<()> {
    failed.roll_to(day);
    let (held_back, due): (Vec<_>, Vec<_>) = store
        .list_due(day)
        .await
        .with_context(|| format!("listing agents due on {day} failed"))?
        .into_iter()
        .partition(|agent| failed.contains(&agent.agent_id));
    if due.is_empty() {
        debug!(run_date = %day, held_back = held_back.len(), "nothing due");
        return Ok(());
    }

    let report = orchestrator
        .run_daily_batch_on(due, day)
        .await
        .with_context(|| format!("batch for {day} failed"))?;
    failed.record(&report);
    info!(
        batch_id = %report.batch_id,
        run_date = %report.run_date,
        scored = report.scored,
        failed = report.failed,
        already_run = report.already_run,
        held_back = held_back.len(),
        "batch complete"
    );
    Ok(())
}
