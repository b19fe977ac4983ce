//! Global atomic counters for arena batches.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    agents_scored: AtomicU64,
    agents_failed: AtomicU64,
    agents_already_run: AtomicU64,
    sandbox_timeouts: AtomicU64,
    sandbox_crashes: AtomicU64,
    sandbox_resource_exceeded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            agents_scored: AtomicU64::new(0),
            agents_failed: AtomicU64::new(0),
            agents_already_run: AtomicU64::new(0),
            sandbox_timeouts: AtomicU64::new(0),
            sandbox_crashes: AtomicU64::new(0),
            sandbox_resource_exceeded: AtomicU64::new(0),
        }
    }

    pub fn inc_agents_scored(&self) {
        self.agents_scored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agents_scored", "counter incremented");
    }

    pub fn inc_agents_failed(&self) {
        self.agents_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agents_failed", "counter incremented");
    }

    pub fn inc_agents_already_run(&self) {
        self.agents_already_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agents_already_run", "counter incremented");
    }

    pub fn inc_sandbox_timeouts(&self) {
        self.sandbox_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sandbox_timeouts", "counter incremented");
    }

    pub fn inc_sandbox_crashes(&self) {
        self.sandbox_crashes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sandbox_crashes", "counter incremented");
    }

    pub fn inc_sandbox_resource_exceeded(&self) {
        self.sandbox_resource_exceeded
            .fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sandbox_resource_exceeded", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            agents_scored = self.agents_scored(),
            agents_failed = self.agents_failed(),
            agents_already_run = self.agents_already_run(),
            sandbox_timeouts = self.sandbox_timeouts(),
            sandbox_crashes = self.sandbox_crashes(),
            sandbox_resource_exceeded = self.sandbox_resource_exceeded(),
        );
    }

    pub fn agents_scored(&self) -> u64 {
        self.agents_scored.load(Ordering::Relaxed)
    }

    pub fn agents_failed(&self) -> u64 {
        self.agents_failed.load(Ordering::Relaxed)
    }

    pub fn agents_already_run(&self) -> u64 {
        self.agents_already_run.load(Ordering::Relaxed)
    }

    pub fn sandbox_timeouts(&self) -> u64 {
        self.sandbox_timeouts.load(Ordering::Relaxed)
    }

    pub fn sandbox_crashes(&self) -> u64 {
        self.sandbox_crashes.load(Ordering::Relaxed)
    }

    pub fn sandbox_resource_exceeded(&self) -> u64 {
        self.sandbox_resource_exceeded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.agents_scored.store(0, Ordering::Relaxed);
        self.agents_failed.store(0, Ordering::Relaxed);
        self.agents_already_run.store(0, Ordering::Relaxed);
        self.sandbox_timeouts.store(0, Ordering::Relaxed);
        self.sandbox_crashes.store(0, Ordering::Relaxed);
        self.sandbox_resource_exceeded.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.agents_scored(), 0);
        m.inc_agents_scored();
        m.inc_agents_scored();
        assert_eq!(m.agents_scored(), 2);

        m.inc_agents_failed();
        assert_eq!(m.agents_failed(), 1);

        m.inc_sandbox_timeouts();
        m.inc_sandbox_crashes();
        m.inc_sandbox_crashes();
        m.inc_sandbox_resource_exceeded();
        assert_eq!(m.sandbox_timeouts(), 1);
        assert_eq!(m.sandbox_crashes(), 2);
        assert_eq!(m.sandbox_resource_exceeded(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_agents_scored();
        m.inc_agents_failed();
        m.inc_agents_already_run();
        m.inc_sandbox_timeouts();
        m.reset();
        assert_eq!(m.agents_scored(), 0);
        assert_eq!(m.agents_failed(), 0);
        assert_eq!(m.agents_already_run(), 0);
        assert_eq!(m.sandbox_timeouts(), 0);
    }
}
