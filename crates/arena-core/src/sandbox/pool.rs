//! Execution controls shared by every backend: slot limit, hard timeout,
//! retry with exponential backoff.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::executor::SandboxExecutor;
use super::result::{ExecutionResult, ExecutionStatus};
use super::settings::SandboxSettings;
use crate::backoff::backoff_delay;
use crate::metrics::METRICS;

/// Wraps a backend so that at most `max_concurrent` executions run at once.
///
/// Each attempt is bounded by `tokio::time::timeout` regardless of what the
/// backend does. Only `Crashed` attempts are retried; `Timeout` and
/// `ResourceExceeded` are final.
pub struct SandboxPool {
    inner: Arc<dyn SandboxExecutor>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    max_retries: u32,
    backoff_base_ms: u64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SandboxPool {
    pub fn new(inner: Arc<dyn SandboxExecutor>, settings: &SandboxSettings) -> Self {
        let max_concurrent = settings.max_concurrent.max(1);
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Highest number of simultaneously running executions observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn attempt(
        &self,
        code: &str,
        input: &Value,
        timeout: Duration,
        attempt: u32,
    ) -> ExecutionResult {
        let _permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ExecutionResult::crashed("sandbox pool closed", 0),
        };

        let _guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        let run = self.inner.execute_attempt(code, input, timeout, attempt);
        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_elapsed) => ExecutionResult::timeout(timeout.as_millis() as u64),
        }
    }
}

/// Counts a running execution until dropped, including on cancellation.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxExecutor for SandboxPool {
    async fn execute(&self, code: &str, input: &Value, timeout: Duration) -> ExecutionResult {
        let max_attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            let mut result = self.attempt(code, input, timeout, attempt).await;
            result.retries = attempt - 1;

            match &result.status {
                ExecutionStatus::Crashed { reason } if attempt < max_attempts => {
                    debug!(attempt, reason = %reason, "sandbox attempt crashed, retrying");
                    // The slot is free while we wait.
                    tokio::time::sleep(backoff_delay(self.backoff_base_ms, attempt)).await;
                }
                ExecutionStatus::Success { .. } => return result,
                ExecutionStatus::Timeout => {
                    METRICS.inc_sandbox_timeouts();
                    warn!(timeout_ms = result.elapsed_ms, "sandbox execution timed out");
                    return result;
                }
                ExecutionStatus::Crashed { .. } => {
                    METRICS.inc_sandbox_crashes();
                    return result;
                }
                ExecutionStatus::ResourceExceeded { resource, .. } => {
                    METRICS.inc_sandbox_resource_exceeded();
                    warn!(resource = %resource, "sandbox resource ceiling hit");
                    return result;
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        ExecutionResult::crashed("no attempts made", 0)
    }
}
