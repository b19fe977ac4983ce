//! The sandbox seam and backend selection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::error::SandboxResult;
use super::mock::MockSandbox;
use super::pool::SandboxPool;
use super::result::ExecutionResult;
use super::settings::{SandboxBackend, SandboxSettings};

/// Runs untrusted agent code against one input.
///
/// Implementations must not let the code touch the host beyond the call and
/// must report every failure through the returned status.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, code: &str, input: &Value, timeout: Duration) -> ExecutionResult;

    /// One numbered attempt (1-based) at the same request. Backends whose
    /// simulated failures depend on the attempt override this; the outcome
    /// must not depend on how many other requests ran before.
    async fn execute_attempt(
        &self,
        code: &str,
        input: &Value,
        timeout: Duration,
        _attempt: u32,
    ) -> ExecutionResult {
        self.execute(code, input, timeout).await
    }
}

#[async_trait]
impl<T: SandboxExecutor + ?Sized> SandboxExecutor for Arc<T> {
    async fn execute(&self, code: &str, input: &Value, timeout: Duration) -> ExecutionResult {
        (**self).execute(code, input, timeout).await
    }

    async fn execute_attempt(
        &self,
        code: &str,
        input: &Value,
        timeout: Duration,
        attempt: u32,
    ) -> ExecutionResult {
        (**self).execute_attempt(code, input, timeout, attempt).await
    }
}

/// Build the configured backend wrapped in a slot-limited [`SandboxPool`].
pub fn build_sandbox(settings: &SandboxSettings) -> SandboxResult<Arc<SandboxPool>> {
    settings
        .validate()
        .map_err(super::error::SandboxError::InvalidSettings)?;

    let backend: Arc<dyn SandboxExecutor> = match settings.backend {
        SandboxBackend::Mock => Arc::new(MockSandbox::new(settings.mock.clone())?),
        SandboxBackend::Process => process_backend(settings)?,
    };
    info!(
        backend = ?settings.backend,
        slots = settings.max_concurrent,
        max_retries = settings.max_retries,
        "sandbox ready"
    );
    Ok(Arc::new(SandboxPool::new(backend, settings)))
}

#[cfg(unix)]
fn process_backend(settings: &SandboxSettings) -> SandboxResult<Arc<dyn SandboxExecutor>> {
    Ok(Arc::new(super::process::ProcessSandbox::new(
        settings.process.clone(),
    )))
}

#[cfg(not(unix))]
fn process_backend(_settings: &SandboxSettings) -> SandboxResult<Arc<dyn SandboxExecutor>> {
    Err(super::error::SandboxError::Unsupported { backend: "process" })
}
