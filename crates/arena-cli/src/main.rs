//! Agent Arena CLI
//!
//! The `arena` command registers agents, runs the daily batch and prints
//! scores and prices.
//!
//! ## Commands
//!
//! - `register`: Store an agent's interface code and create its profile
//! - `run`: Evaluate every due agent (or the named ones) for a day
//! - `quote`: Price quote for an agent, or for a bare score and tier
//! - `tier`: Move an agent to another tier
//! - `history`: Daily outcomes (and failures) for one agent
//! - `agents`: List registered agents

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_core::telemetry::init_tracing;
use arena_core::{
    AgentId, AgentOutcome, AgentProfile, ArenaConfig, ArenaOrchestrator, ArenaType, BatchReport,
    OutcomeStatus, PriceCalculator, PriceQuote, Tier, TradeQuote, TradeSide,
};
use arena_state::{AgentStore, SurrealArenaStore};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "arena")]
#[command(author = "Tzurix Engineering")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent arena: daily evaluation, scoring and pricing", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON: log lines on stderr, command results on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "ARENA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new agent from an interface file
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Arena to compete in (trading, utility, coding)
        #[arg(short, long)]
        arena: ArenaType,

        /// Starting tier
        #[arg(short, long, default_value = "alpha")]
        tier: Tier,

        /// Path to the interface code (must define `decide(state)`)
        #[arg(long)]
        code: PathBuf,

        /// Scenario keyword; repeat for several
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
    },

    /// Run the daily batch
    Run {
        /// Calendar day to run (default: today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Only these agents; repeat for several (default: every due agent)
        #[arg(long = "agent")]
        agents: Vec<String>,
    },

    /// Show a price quote
    Quote(QuoteArgs),

    /// Move an agent to another tier
    Tier {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Target tier
        #[arg(long)]
        tier: Tier,
    },

    /// Show outcome history for an agent
    History {
        /// Agent ID
        #[arg(long)]
        agent: String,

        /// Also list failed evaluation attempts
        #[arg(long)]
        failures: bool,
    },

    /// List registered agents
    Agents,
}

#[derive(Args)]
struct QuoteArgs {
    /// Agent ID (quote from the stored score)
    #[arg(long, conflicts_with = "score")]
    agent: Option<String>,

    /// Quote a bare score instead of a stored agent
    #[arg(long, required_unless_present = "agent")]
    score: Option<f64>,

    /// Tier for `--score`
    #[arg(long, default_value = "alpha")]
    tier: Tier,

    /// Also quote a trade (buy: SOL in, sell: tokens in)
    #[arg(long, requires = "amount")]
    side: Option<TradeSide>,

    /// Trade amount for `--side`
    #[arg(long)]
    amount: Option<f64>,
}

#[derive(Serialize)]
struct QuoteReport {
    #[serde(flatten)]
    quote: PriceQuote,
    #[serde(skip_serializing_if = "Option::is_none")]
    trade: Option<TradeQuote>,
}

#[derive(Serialize)]
struct HistoryReport {
    agent: AgentProfile,
    outcomes: Vec<AgentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failures: Option<Vec<arena_state::FailureRecord>>,
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
    let json = cli.json;

    // Quoting a bare score needs no database.
    let command = match cli.command {
        Commands::Quote(args) if args.agent.is_none() => {
            let pricer = PriceCalculator::new(config.pricing.clone());
            let score = args.score.unwrap_or_default();
            let quote = pricer.quote(score, args.tier, Utc::now());
            return print_quote(&pricer, quote, &args, json);
        }
        command => command,
    };

    let store = Arc::new(
        SurrealArenaStore::from_env()
            .await
            .context("Failed to connect to arena database")?,
    );
    let orchestrator = ArenaOrchestrator::from_config(store.clone(), store.clone(), &config)
        .context("Failed to build arena orchestrator")?;

    match command {
        Commands::Register {
            name,
            arena,
            tier,
            code,
            keywords,
        } => cmd_register(&orchestrator, &name, arena, tier, &code, keywords, json).await,
        Commands::Run { date, agents } => {
            let day = date.unwrap_or_else(|| Utc::now().date_naive());
            cmd_run(&orchestrator, store.as_ref(), day, &agents, json).await
        }
        Commands::Quote(args) => cmd_quote(&orchestrator, &args, json).await,
        Commands::Tier { agent, tier } => cmd_tier(&orchestrator, &agent, tier, json).await,
        Commands::History { agent, failures } => {
            cmd_history(store.as_ref(), &agent, failures, json).await
        }
        Commands::Agents => cmd_agents(store.as_ref(), json).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read interface code from disk.
fn read_code(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read interface code: {}", path.display()))
}

async fn cmd_register(
    orchestrator: &ArenaOrchestrator,
    name: &str,
    arena: ArenaType,
    tier: Tier,
    code_path: &Path,
    keywords: Vec<String>,
    json: bool,
) -> Result<()> {
    let code = read_code(code_path)?;
    let profile = orchestrator
        .register_agent(name, arena, tier, &code, keywords)
        .await
        .context("Registration failed")?;

    if json {
        return print_json(&profile);
    }
    println!("Registered {} ({})", profile.name, profile.agent_id);
    println!("Arena:  {}", profile.arena_type);
    println!("Tier:   {}", profile.tier);
    println!("Score:  {:.2}", profile.score);
    println!("Price:  {:.4}", profile.price);
    Ok(())
}

async fn cmd_run(
    orchestrator: &ArenaOrchestrator,
    store: &dyn AgentStore,
    day: NaiveDate,
    agents: &[String],
    json: bool,
) -> Result<()> {
    let batch = if agents.is_empty() {
        orchestrator.run_due(day).await
    } else {
        let mut profiles = Vec::with_capacity(agents.len());
        for id in agents {
            let profile = store
                .get_agent(&AgentId::from(id.as_str()))
                .await
                .with_context(|| format!("Unknown agent: {id}"))?;
            profiles.push(profile);
        }
        orchestrator.run_daily_batch_on(profiles, day).await
    };
    let report = batch.context("Daily batch failed")?;

    info!(batch_id = %report.batch_id, "batch complete");
    if json {
        return print_json(&report);
    }
    println!("{}", render_batch(&report));
    Ok(())
}

fn render_outcome(outcome: &AgentOutcome) -> String {
    match outcome.status {
        OutcomeStatus::Scored => {
            let mut flags = Vec::new();
            if outcome.was_capped {
                flags.push("capped");
            }
            if outcome.ceiling_hit {
                flags.push("ceiling");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            format!(
                "{} {}  {:.2} -> {:.2}  price {:.4}{}",
                outcome.run_date,
                outcome.agent_id,
                outcome.previous_score,
                outcome.new_score,
                outcome.new_price,
                flags
            )
        }
        OutcomeStatus::Failed => format!(
            "{} {}  FAILED: {}",
            outcome.run_date,
            outcome.agent_id,
            outcome.failure_reason.as_deref().unwrap_or("unknown")
        ),
    }
}

fn render_batch(report: &BatchReport) -> String {
    let mut lines: Vec<String> = report.outcomes.iter().map(render_outcome).collect();
    lines.push(format!(
        "Batch {} for {}: {} scored, {} failed, {} already run",
        report.batch_id, report.run_date, report.scored, report.failed, report.already_run
    ));
    lines.join("\n")
}

fn print_quote(
    pricer: &PriceCalculator,
    quote: PriceQuote,
    args: &QuoteArgs,
    json: bool,
) -> Result<()> {
    let trade = match (args.side, args.amount) {
        (Some(side), Some(amount)) => Some(pricer.trade_quote(&quote, side, amount)),
        _ => None,
    };
    if json {
        return print_json(&QuoteReport { quote, trade });
    }
    println!("Score:      {:.2} ({})", quote.score, quote.tier);
    println!("Price:      {:.4}", quote.price);
    println!("Lamports:   {}", quote.price_lamports);
    println!("SOL:        {:.9}", quote.price_sol);
    println!("Market cap: {:.2} SOL", quote.market_cap_sol);
    if let Some(trade) = trade {
        println!(
            "Trade:      {:?} {} -> {:.6} (fee {:.6} SOL)",
            trade.side, trade.amount_in, trade.amount_out, trade.fee_sol
        );
    }
    Ok(())
}

async fn cmd_quote(orchestrator: &ArenaOrchestrator, args: &QuoteArgs, json: bool) -> Result<()> {
    let agent = args.agent.as_deref().unwrap_or_default();
    let quote = orchestrator
        .quote(&AgentId::from(agent))
        .await
        .with_context(|| format!("No quote for agent {agent}"))?;
    print_quote(orchestrator.pricer(), quote, args, json)
}

async fn cmd_tier(
    orchestrator: &ArenaOrchestrator,
    agent: &str,
    tier: Tier,
    json: bool,
) -> Result<()> {
    let profile = orchestrator
        .change_tier(&AgentId::from(agent), tier)
        .await
        .context("Tier change failed")?;
    if json {
        return print_json(&profile);
    }
    println!(
        "{} is now {}: score {:.2}, price {:.4}",
        profile.agent_id, profile.tier, profile.score, profile.price
    );
    Ok(())
}

async fn cmd_history(
    store: &dyn AgentStore,
    agent: &str,
    with_failures: bool,
    json: bool,
) -> Result<()> {
    let agent_id = AgentId::from(agent);
    let profile = store
        .get_agent(&agent_id)
        .await
        .with_context(|| format!("Unknown agent: {agent}"))?;
    let outcomes = store.history(&agent_id).await?;
    let failures = if with_failures {
        Some(store.failures(&agent_id).await?)
    } else {
        None
    };

    if json {
        return print_json(&HistoryReport {
            agent: profile,
            outcomes,
            failures,
        });
    }

    println!(
        "{} ({}, {}): score {:.2}",
        profile.name, profile.arena_type, profile.tier, profile.score
    );
    if outcomes.is_empty() {
        println!("No outcomes recorded yet.");
    }
    for outcome in &outcomes {
        println!("  {}", render_outcome(outcome));
    }
    for failure in failures.iter().flatten() {
        println!("  {} FAILED: {}", failure.run_date, failure.reason);
    }
    Ok(())
}

async fn cmd_agents(store: &dyn AgentStore, json: bool) -> Result<()> {
    let agents = store.list_agents().await?;
    if json {
        return print_json(&agents);
    }
    if agents.is_empty() {
        println!("No agents registered. Run 'arena register' first.");
        return Ok(());
    }
    for agent in &agents {
        let last = agent
            .last_run_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {:<20} {:<8} {:<6} {:>6.2}  last run {}",
            agent.agent_id, agent.name, agent.arena_type, agent.tier, agent.score, last
        );
    }
    Ok(())
}
