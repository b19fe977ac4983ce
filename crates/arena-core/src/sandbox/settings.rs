//! Sandbox configuration.

use std::time::Duration;

use arena_state::ArenaType;
use serde::{Deserialize, Serialize};

/// Which isolation backend executes agent code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    /// Deterministic in-process simulation for development and tests
    #[default]
    Mock,
    /// Child process with resource limits and namespace isolation
    Process,
}

impl std::str::FromStr for SandboxBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(SandboxBackend::Mock),
            "process" => Ok(SandboxBackend::Process),
            other => Err(format!("unknown sandbox backend: {other}")),
        }
    }
}

/// Per-arena scenario timeouts (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaTimeouts {
    pub trading_ms: u64,
    pub utility_ms: u64,
    pub coding_ms: u64,
}

impl Default for ArenaTimeouts {
    fn default() -> Self {
        Self {
            trading_ms: 30_000,
            utility_ms: 30_000,
            coding_ms: 60_000,
        }
    }
}

impl ArenaTimeouts {
    pub fn for_arena(&self, arena: ArenaType) -> Duration {
        let ms = match arena {
            ArenaType::Trading => self.trading_ms,
            ArenaType::Utility => self.utility_ms,
            ArenaType::Coding => self.coding_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Mock backend knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Probability in `[0, 1]` that an attempt crashes
    pub failure_rate: f64,
    /// Simulated latency range (inclusive, milliseconds)
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    /// Actually sleep for the simulated latency
    pub sleep: bool,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency_min_ms: 50,
            latency_max_ms: 500,
            sleep: false,
        }
    }
}

/// Process backend knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Interpreter launched for each execution
    pub program: String,
    /// Arguments placed before the script path
    pub args: Vec<String>,
    /// Wrap the agent code in a harness that calls `decide(input)`
    pub harness: bool,
    pub memory_limit_mb: u64,
    pub cpu_time_limit_secs: u64,
    pub network_disabled: bool,
    pub max_output_bytes: usize,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-I".to_string()],
            harness: true,
            memory_limit_mb: 512,
            cpu_time_limit_secs: 30,
            network_disabled: true,
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub backend: SandboxBackend,
    /// Hard cap on concurrently running executions
    pub max_concurrent: usize,
    /// Retries for crashed attempts (0 = run once)
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub backoff_base_ms: u64,
    pub timeouts: ArenaTimeouts,
    pub mock: MockSettings,
    pub process: ProcessSettings,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Mock,
            max_concurrent: 4,
            max_retries: 2,
            backoff_base_ms: 250,
            timeouts: ArenaTimeouts::default(),
            mock: MockSettings::default(),
            process: ProcessSettings::default(),
        }
    }
}

impl SandboxSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("sandbox.max_concurrent must be at least 1".into());
        }
        let t = &self.timeouts;
        if t.trading_ms == 0 || t.utility_ms == 0 || t.coding_ms == 0 {
            return Err("sandbox timeouts must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.mock.failure_rate) {
            return Err("sandbox.mock.failure_rate must lie in [0, 1]".into());
        }
        if self.mock.latency_min_ms > self.mock.latency_max_ms {
            return Err("sandbox.mock latency range is inverted".into());
        }
        if self.backend == SandboxBackend::Process {
            if self.process.program.trim().is_empty() {
                return Err("sandbox.process.program must be set".into());
            }
            if self.process.memory_limit_mb == 0 || self.process.max_output_bytes == 0 {
                return Err("sandbox.process limits must be positive".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SandboxSettings::default().validate().is_ok());
    }

    #[test]
    fn test_coding_gets_longer_timeout() {
        let t = ArenaTimeouts::default();
        assert_eq!(t.for_arena(ArenaType::Coding), Duration::from_secs(60));
        assert_eq!(t.for_arena(ArenaType::Utility), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_slots_rejected() {
        let settings = SandboxSettings {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
