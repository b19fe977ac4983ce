//! Structured lifecycle events for daily batches.
//!
//! - Batch- and agent-scoped spans, attached to futures with
//!   `tracing::Instrument`
//! - Emission functions for batch start/finish and per-agent outcomes
//!
//! Events are emitted at `info!` level (`warn!` for failures). Filter with
//! `RUST_LOG`; the binaries take `--json` for JSON lines.

use tracing::{info, warn, Span};

/// Span covering one batch. Every event inside carries `batch_id`.
///
/// ```ignore
/// run(agents).instrument(batch_span(&batch_id.to_string())).await
/// ```
pub fn batch_span(batch_id: &str) -> Span {
    tracing::info_span!("arena.batch", batch_id = %batch_id)
}

/// Span covering one agent's evaluation; a child of the current span.
pub fn agent_span(agent_id: &str) -> Span {
    tracing::info_span!("arena.agent", agent_id = %agent_id)
}

pub fn emit_batch_started(batch_id: &str, run_date: &str, agents: usize) {
    info!(event = "batch.started", batch_id = %batch_id, run_date = %run_date, agents = agents);
}

pub fn emit_batch_finished(
    batch_id: &str,
    duration_ms: u64,
    scored: usize,
    failed: usize,
    already_run: usize,
) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        duration_ms = duration_ms,
        scored = scored,
        failed = failed,
        already_run = already_run,
    );
}

/// Agent scored: old and new score plus the capping flags.
pub fn emit_agent_scored(
    agent_id: &str,
    previous_score: f64,
    new_score: f64,
    was_capped: bool,
    ceiling_hit: bool,
) {
    info!(
        event = "agent.scored",
        agent_id = %agent_id,
        previous_score = previous_score,
        new_score = new_score,
        was_capped = was_capped,
        ceiling_hit = ceiling_hit,
    );
}

pub fn emit_agent_failed(agent_id: &str, reason: &str) {
    warn!(event = "agent.failed", agent_id = %agent_id, reason = %reason);
}

pub fn emit_agent_already_run(agent_id: &str, run_date: &str) {
    info!(event = "agent.already_run", agent_id = %agent_id, run_date = %run_date);
}

pub fn emit_scenario_failed(agent_id: &str, scenario_id: &str, reason: &str) {
    warn!(
        event = "scenario.failed",
        agent_id = %agent_id,
        scenario_id = %scenario_id,
        reason = %reason,
    );
}

/// Storage write-back failed and will be retried.
pub fn emit_write_retry(agent_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "outcome.write_retry", agent_id = %agent_id, attempt = attempt, error = %error);
}
