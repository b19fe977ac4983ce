//! Daily batch orchestration.
//!
//! One batch call runs three phases:
//!
//! 1. idempotency lookup: agents already scored for the day return their
//!    stored outcome untouched
//! 2. evaluation: remaining agents run concurrently (bounded by
//!    `max_concurrent_agents`), each through its arena engine, then the
//!    score and price calculators
//! 3. write-back: each scored outcome is persisted once, with bounded
//!    retries on transient storage errors
//!
//! Agent-level failures never abort the batch, and neither does a panicking
//! evaluation task: it is logged as that agent's failure. Storage that
//! cannot be read, or a write-back that exhausts its retries, does.
//!
//! Writes are compare-and-set on the tier and score an outcome was computed
//! from. If a tier change lands between evaluation and write-back, the
//! outcome is rescored from the fresh profile with the same performance
//! index and written again.
//!
//! Write-back is sequential and each agent's write is atomic on its own.
//! When a batch aborts part way, agents written before the abort keep their
//! outcome and the rest stay due, so rerunning the batch for the same day
//! finishes exactly the agents that were left.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use arena_state::{
    AgentId, AgentOutcome, AgentProfile, AgentStore, ArenaType, InterfaceStore, OutcomeStatus,
    StorageError, Tier, TierScore,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::arena::{validate_interface, AgentInterface, ArenaEngine};
use crate::backoff::backoff_delay;
use crate::config::ArenaConfig;
use crate::domain::{ArenaError, ArenaResult, EngineFailure};
use crate::metrics::METRICS;
use crate::obs;
use crate::pricing::{PriceCalculator, PriceQuote};
use crate::sandbox::{build_sandbox, ArenaTimeouts, SandboxExecutor};
use crate::scoring::ScoreCalculator;

/// Rescoring rounds allowed when a profile keeps changing under a write.
const MAX_SCORE_CONFLICTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Agents evaluated at the same time
    pub max_concurrent_agents: usize,
    /// Extra attempts for a transient write-back failure
    pub write_retries: u32,
    /// Base delay for write-back backoff
    pub write_backoff_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 8,
            write_retries: 3,
            write_backoff_ms: 100,
        }
    }
}

impl OrchestratorSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_agents == 0 {
            return Err("orchestrator.max_concurrent_agents must be at least 1".into());
        }
        Ok(())
    }
}

/// Everything one batch call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub run_date: NaiveDate,
    /// One outcome per distinct input agent, in input order
    pub outcomes: Vec<AgentOutcome>,
    pub scored: usize,
    pub failed: usize,
    pub already_run: usize,
}

/// Shared state handed to every evaluation task.
struct Engine {
    store: Arc<dyn AgentStore>,
    interfaces: Arc<dyn InterfaceStore>,
    sandbox: Arc<dyn SandboxExecutor>,
    scorer: ScoreCalculator,
    pricer: PriceCalculator,
    timeouts: ArenaTimeouts,
    settings: OrchestratorSettings,
}

enum Slot {
    Existing(AgentOutcome),
    Pending(AgentProfile),
}

pub struct ArenaOrchestrator {
    engine: Arc<Engine>,
}

impl ArenaOrchestrator {
    /// Orchestrator over an already-built sandbox.
    pub fn new(
        store: Arc<dyn AgentStore>,
        interfaces: Arc<dyn InterfaceStore>,
        sandbox: Arc<dyn SandboxExecutor>,
        config: &ArenaConfig,
    ) -> ArenaResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(Engine {
                store,
                interfaces,
                sandbox,
                scorer: ScoreCalculator::new(config.scoring.clone()),
                pricer: PriceCalculator::new(config.pricing.clone()),
                timeouts: config.sandbox.timeouts,
                settings: config.orchestrator.clone(),
            }),
        })
    }

    /// Orchestrator with the sandbox backend named in `config`.
    pub fn from_config(
        store: Arc<dyn AgentStore>,
        interfaces: Arc<dyn InterfaceStore>,
        config: &ArenaConfig,
    ) -> ArenaResult<Self> {
        let sandbox = build_sandbox(&config.sandbox)
            .map_err(|e| ArenaError::InvalidConfig(e.to_string()))?;
        Self::new(store, interfaces, sandbox, config)
    }

    pub fn scorer(&self) -> &ScoreCalculator {
        &self.engine.scorer
    }

    pub fn pricer(&self) -> &PriceCalculator {
        &self.engine.pricer
    }

    /// Validate and store interface code, then register a new agent at the
    /// starting score.
    pub async fn register_agent(
        &self,
        name: &str,
        arena_type: ArenaType,
        tier: Tier,
        code: &str,
        keywords: Vec<String>,
    ) -> ArenaResult<AgentProfile> {
        validate_interface(code)?;
        let e = &self.engine;
        let interface_ref = e.interfaces.put(code).await?;
        let score = e.scorer.policy().starting_score_for(tier);
        let price = e.pricer.price(score, tier);
        let profile = AgentProfile::new(name, arena_type, tier, score, price)
            .with_interface(interface_ref)
            .with_keywords(keywords);
        e.store.register(profile.clone()).await?;
        info!(
            agent_id = %profile.agent_id,
            arena = %arena_type,
            tier = %tier,
            score,
            "agent registered"
        );
        Ok(profile)
    }

    /// Run every agent the store reports as due on `day`.
    pub async fn run_due(&self, day: NaiveDate) -> ArenaResult<BatchReport> {
        let agents = self.engine.store.list_due(day).await?;
        self.run_daily_batch_on(agents, day).await
    }

    /// Run a batch for today (UTC).
    pub async fn run_daily_batch(&self, agents: Vec<AgentProfile>) -> ArenaResult<BatchReport> {
        self.run_daily_batch_on(agents, Utc::now().date_naive()).await
    }

    pub async fn run_daily_batch_on(
        &self,
        agents: Vec<AgentProfile>,
        day: NaiveDate,
    ) -> ArenaResult<BatchReport> {
        let batch_id = Uuid::new_v4();
        let span = obs::batch_span(&batch_id.to_string());
        self.run_batch(batch_id, agents, day).instrument(span).await
    }

    async fn run_batch(
        &self,
        batch_id: Uuid,
        agents: Vec<AgentProfile>,
        day: NaiveDate,
    ) -> ArenaResult<BatchReport> {
        let started = Instant::now();
        let batch = batch_id.to_string();
        let run_date = day.to_string();
        obs::emit_batch_started(&batch, &run_date, agents.len());

        // Phase 1: idempotency lookup.
        let mut slots = Vec::with_capacity(agents.len());
        let mut seen = std::collections::HashSet::new();
        for profile in agents {
            if !seen.insert(profile.agent_id.clone()) {
                debug!(agent_id = %profile.agent_id, "duplicate agent in batch input skipped");
                continue;
            }
            match self.engine.store.outcome_for(&profile.agent_id, day).await? {
                Some(existing) => slots.push(Slot::Existing(existing)),
                None => slots.push(Slot::Pending(profile)),
            }
        }

        // Phase 2: concurrent evaluation.
        let limit = Arc::new(Semaphore::new(self.engine.settings.max_concurrent_agents));
        let mut pending = Vec::new();
        let mut tasks = Vec::new();
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Pending(profile) = slot {
                let engine = Arc::clone(&self.engine);
                let limit = Arc::clone(&limit);
                let task_profile = profile.clone();
                let span = obs::agent_span(&profile.agent_id.to_string());
                tasks.push(tokio::spawn(
                    async move {
                        let _permit = limit
                            .acquire_owned()
                            .await
                            .map_err(|e| ArenaError::Worker(e.to_string()))?;
                        engine.evaluate(&task_profile, day).await
                    }
                    .instrument(span),
                ));
                pending.push((index, profile.clone()));
            }
        }

        let joined = futures::future::join_all(tasks).await;
        let mut evaluated = Vec::with_capacity(joined.len());
        for ((index, profile), joined) in pending.into_iter().zip(joined) {
            let outcome = match joined {
                Ok(evaluation) => evaluation?,
                Err(e) => {
                    let reason = if e.is_panic() {
                        format!("evaluation task panicked: {e}")
                    } else {
                        format!("evaluation task cancelled: {e}")
                    };
                    warn!(agent_id = %profile.agent_id, reason = %reason, "evaluation task lost");
                    AgentOutcome::failed(&profile, day, reason)
                }
            };
            evaluated.push((index, outcome));
        }

        // Phase 3: write-back.
        let mut outcomes: Vec<Option<AgentOutcome>> = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Existing(outcome) => Some(outcome),
                Slot::Pending(_) => None,
            })
            .collect();
        let mut already_run = outcomes.iter().flatten().count();
        for outcome in outcomes.iter().flatten() {
            METRICS.inc_agents_already_run();
            obs::emit_agent_already_run(&outcome.agent_id.to_string(), &run_date);
        }

        let mut scored = 0;
        let mut failed = 0;
        for (index, outcome) in evaluated {
            let agent_id = outcome.agent_id.to_string();
            let status = outcome.status;
            let stored = match status {
                OutcomeStatus::Scored => match self.engine.persist(outcome).await? {
                    Persisted::Written(written) => {
                        scored += 1;
                        METRICS.inc_agents_scored();
                        obs::emit_agent_scored(
                            &agent_id,
                            written.previous_score,
                            written.new_score,
                            written.was_capped,
                            written.ceiling_hit,
                        );
                        written
                    }
                    Persisted::Existing(existing) => {
                        already_run += 1;
                        METRICS.inc_agents_already_run();
                        obs::emit_agent_already_run(&agent_id, &run_date);
                        existing
                    }
                },
                OutcomeStatus::Failed => {
                    let reason = outcome.failure_reason.clone().unwrap_or_default();
                    self.engine.log_failure(&outcome.agent_id, day, &reason).await?;
                    failed += 1;
                    METRICS.inc_agents_failed();
                    obs::emit_agent_failed(&agent_id, &reason);
                    outcome
                }
            };
            outcomes[index] = Some(stored);
        }

        let outcomes: Vec<AgentOutcome> = outcomes.into_iter().flatten().collect();
        obs::emit_batch_finished(
            &batch,
            started.elapsed().as_millis() as u64,
            scored,
            failed,
            already_run,
        );
        METRICS.flush();

        Ok(BatchReport {
            batch_id,
            run_date: day,
            outcomes,
            scored,
            failed,
            already_run,
        })
    }

    /// Move an agent to `tier`, carrying part of its score over.
    ///
    /// The carried score is computed from a fresh read; if a daily outcome
    /// lands first, the change is recomputed from the new score.
    pub async fn change_tier(&self, agent_id: &AgentId, tier: Tier) -> ArenaResult<AgentProfile> {
        let e = &self.engine;
        let mut conflicts = 0;
        loop {
            let profile = e.store.get_agent(agent_id).await?;
            if profile.tier == tier {
                return Ok(profile);
            }
            let score = e.scorer.score_after_tier_change(profile.score, tier);
            let price = e.pricer.price(score, tier);
            let next = TierScore::new(tier, score);
            match e
                .store
                .update_tier(agent_id, TierScore::of(&profile), next, price)
                .await
            {
                Ok(updated) => {
                    info!(
                        agent_id = %agent_id,
                        from = %profile.tier,
                        to = %tier,
                        previous_score = profile.score,
                        new_score = score,
                        "tier changed"
                    );
                    return Ok(updated);
                }
                Err(StorageError::ScoreConflict { .. }) if conflicts < MAX_SCORE_CONFLICTS => {
                    conflicts += 1;
                    debug!(agent_id = %agent_id, conflicts, "profile changed under tier change");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Current price quote, recomputed from the stored score.
    pub async fn quote(&self, agent_id: &AgentId) -> ArenaResult<PriceQuote> {
        let profile = self.engine.store.get_agent(agent_id).await?;
        Ok(self
            .engine
            .pricer
            .quote(profile.score, profile.tier, Utc::now()))
    }
}

enum Persisted {
    /// The outcome as stored, rescored if the profile moved
    Written(AgentOutcome),
    /// Another writer recorded the day first
    Existing(AgentOutcome),
}

impl Engine {
    /// Evaluate one agent. `Err` only for batch-fatal storage problems.
    async fn evaluate(&self, profile: &AgentProfile, day: NaiveDate) -> ArenaResult<AgentOutcome> {
        let code = match self.load_code(profile).await? {
            Ok(code) => code,
            Err(failure) => return Ok(AgentOutcome::failed(profile, day, failure.to_string())),
        };

        let engine = ArenaEngine::configured(
            profile.arena_type,
            self.scorer.policy().weights,
            &self.timeouts,
        );
        let agent = AgentInterface::new(profile.agent_id.clone(), profile.tier, code)
            .with_keywords(profile.keywords.clone());

        let result = match engine.run(&agent, self.sandbox.as_ref()).await {
            Ok(result) => result,
            Err(failure) => return Ok(AgentOutcome::failed(profile, day, failure.to_string())),
        };

        let outcome = self.scored_outcome(profile, day, result.performance_index);
        debug!(
            performance_index = result.performance_index,
            scenarios = result.scenarios.len(),
            scenarios_failed = result.scenarios_failed(),
            new_score = outcome.new_score,
            "agent evaluated"
        );
        Ok(outcome)
    }

    /// Bounded score move for `profile` on `day`, priced in its tier.
    fn scored_outcome(
        &self,
        profile: &AgentProfile,
        day: NaiveDate,
        performance_index: f64,
    ) -> AgentOutcome {
        let change =
            self.scorer
                .compute_from_index(profile.score, performance_index, profile.tier);
        AgentOutcome {
            agent_id: profile.agent_id.clone(),
            run_date: day,
            status: OutcomeStatus::Scored,
            tier: profile.tier,
            previous_score: change.previous_score,
            new_score: change.new_score,
            new_price: self.pricer.price(change.new_score, profile.tier),
            performance_index: Some(performance_index),
            was_capped: change.was_capped,
            ceiling_hit: change.ceiling_hit,
            failure_reason: None,
            run_timestamp: Utc::now(),
        }
    }

    /// Interface code, or the agent-level reason it is unavailable.
    async fn load_code(
        &self,
        profile: &AgentProfile,
    ) -> ArenaResult<Result<String, EngineFailure>> {
        let Some(interface_ref) = &profile.interface_ref else {
            return Ok(Err(EngineFailure::MissingInterface));
        };
        match self.interfaces.get(interface_ref).await {
            Ok(code) => Ok(Ok(code)),
            Err(StorageError::InterfaceNotFound { digest }) => {
                Ok(Err(EngineFailure::InterfaceNotFound { digest }))
            }
            Err(e) => Err(ArenaError::Storage(e)),
        }
    }

    async fn persist(&self, mut outcome: AgentOutcome) -> ArenaResult<Persisted> {
        let mut conflicts = 0;
        loop {
            let written = self
                .with_write_retries(&outcome.agent_id, || self.store.record_outcome(&outcome))
                .await;
            match written {
                Ok(()) => return Ok(Persisted::Written(outcome)),
                Err(ArenaError::Storage(StorageError::AlreadyRecorded { .. })) => {
                    return match self
                        .store
                        .outcome_for(&outcome.agent_id, outcome.run_date)
                        .await?
                    {
                        Some(existing) => Ok(Persisted::Existing(existing)),
                        None => Err(ArenaError::Storage(StorageError::Backend(format!(
                            "outcome for {} reported recorded but not found",
                            outcome.agent_id
                        )))),
                    };
                }
                Err(ArenaError::Storage(StorageError::ScoreConflict { .. }))
                    if conflicts < MAX_SCORE_CONFLICTS =>
                {
                    conflicts += 1;
                    let fresh = self.store.get_agent(&outcome.agent_id).await?;
                    debug!(
                        agent_id = %outcome.agent_id,
                        scored_tier = %outcome.tier,
                        current_tier = %fresh.tier,
                        current_score = fresh.score,
                        "profile changed since evaluation, rescoring"
                    );
                    let index = outcome.performance_index.unwrap_or(0.0);
                    outcome = self.scored_outcome(&fresh, outcome.run_date, index);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn log_failure(&self, agent_id: &AgentId, day: NaiveDate, reason: &str) -> ArenaResult<()> {
        self.with_write_retries(agent_id, || self.store.record_failure(agent_id, day, reason))
            .await
    }

    /// Run a storage write, retrying transient errors with exponential
    /// backoff. Non-transient errors come back as `ArenaError::Storage`.
    async fn with_write_retries<F, Fut>(&self, agent_id: &AgentId, mut write: F) -> ArenaResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        let attempts = self.settings.write_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match write().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    obs::emit_write_retry(&agent_id.to_string(), attempt, &e);
                    tokio::time::sleep(backoff_delay(self.settings.write_backoff_ms, attempt))
                        .await;
                }
                Err(e) if e.is_transient() => {
                    return Err(ArenaError::WriteBack {
                        agent_id: agent_id.to_string(),
                        attempts: attempt,
                        source: e,
                    })
                }
                Err(e) => return Err(ArenaError::Storage(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        assert!(OrchestratorSettings::default().validate().is_ok());
        let zero = OrchestratorSettings {
            max_concurrent_agents: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_batch_report_serializes() {
        let report = BatchReport {
            batch_id: Uuid::nil(),
            run_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            outcomes: Vec::new(),
            scored: 0,
            failed: 0,
            already_run: 0,
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["run_date"], "2026-03-01");
        assert_eq!(v["scored"], 0);
    }
}
