//! Outcome of a single sandboxed execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource class that tripped a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Memory,
    Cpu,
    Output,
    Network,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resource::Memory => "memory",
            Resource::Cpu => "cpu",
            Resource::Output => "output",
            Resource::Network => "network",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success { output: Value },
    Timeout,
    Crashed { reason: String },
    ResourceExceeded { resource: Resource, detail: String },
}

impl ExecutionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Success { .. } => "success",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Crashed { .. } => "crashed",
            ExecutionStatus::ResourceExceeded { .. } => "resource_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub output_bytes: u64,
    pub peak_memory_bytes: Option<u64>,
}

/// Result of running untrusted code once. Failure is data, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(flatten)]
    pub status: ExecutionStatus,
    pub elapsed_ms: u64,
    /// Retries spent before this result (0 = first attempt)
    pub retries: u32,
    pub usage: ResourceUsage,
}

impl ExecutionResult {
    pub fn success(output: Value, elapsed_ms: u64) -> Self {
        let output_bytes = output.to_string().len() as u64;
        Self {
            status: ExecutionStatus::Success { output },
            elapsed_ms,
            retries: 0,
            usage: ResourceUsage {
                output_bytes,
                peak_memory_bytes: None,
            },
        }
    }

    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::with_status(ExecutionStatus::Timeout, elapsed_ms)
    }

    pub fn crashed(reason: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::with_status(
            ExecutionStatus::Crashed {
                reason: reason.into(),
            },
            elapsed_ms,
        )
    }

    pub fn resource_exceeded(
        resource: Resource,
        detail: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self::with_status(
            ExecutionStatus::ResourceExceeded {
                resource,
                detail: detail.into(),
            },
            elapsed_ms,
        )
    }

    fn with_status(status: ExecutionStatus, elapsed_ms: u64) -> Self {
        Self {
            status,
            elapsed_ms,
            retries: 0,
            usage: ResourceUsage::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.status {
            ExecutionStatus::Success { output } => Some(output),
            _ => None,
        }
    }

    /// Human-readable failure line; `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.status {
            ExecutionStatus::Success { .. } => None,
            ExecutionStatus::Timeout => Some(format!("timed out after {}ms", self.elapsed_ms)),
            ExecutionStatus::Crashed { reason } => Some(format!("crashed: {reason}")),
            ExecutionStatus::ResourceExceeded { resource, detail } => {
                Some(format!("{resource} limit exceeded: {detail}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_accessors() {
        let r = ExecutionResult::success(json!({"ok": true}), 12);
        assert!(r.is_success());
        assert_eq!(r.output().unwrap()["ok"], true);
        assert!(r.failure_reason().is_none());
        assert_eq!(r.usage.output_bytes, 11);
    }

    #[test]
    fn test_failure_reasons() {
        assert_eq!(
            ExecutionResult::timeout(500).failure_reason().unwrap(),
            "timed out after 500ms"
        );
        let r = ExecutionResult::resource_exceeded(Resource::Network, "socket", 0);
        assert_eq!(
            r.failure_reason().unwrap(),
            "network limit exceeded: socket"
        );
        assert_eq!(r.status.label(), "resource_exceeded");
    }

    #[test]
    fn test_status_serializes_flat() {
        let r = ExecutionResult::crashed("segfault", 3);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "crashed");
        assert_eq!(v["reason"], "segfault");
        assert_eq!(v["elapsed_ms"], 3);
    }
}
