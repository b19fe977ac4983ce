//! Sandboxed execution of untrusted agent code.
//!
//! - `executor`: the [`SandboxExecutor`] trait and backend selection
//! - `pool`: slot limit, hard timeout and crash retries around any backend
//! - `mock`: deterministic simulation used by default
//! - `process`: child-process backend with rlimits and namespaces (unix)
//! - `result`: [`ExecutionResult`] and its status taxonomy
//! - `settings`: serde-backed configuration

pub mod error;
pub mod executor;
pub mod mock;
pub mod pool;
#[cfg(unix)]
pub mod process;
pub mod result;
pub mod settings;

pub use error::{SandboxError, SandboxResult};
pub use executor::{build_sandbox, SandboxExecutor};
pub use mock::MockSandbox;
pub use pool::SandboxPool;
#[cfg(unix)]
pub use process::ProcessSandbox;
pub use result::{ExecutionResult, ExecutionStatus, Resource, ResourceUsage};
pub use settings::{ArenaTimeouts, MockSettings, ProcessSettings, SandboxBackend, SandboxSettings};
