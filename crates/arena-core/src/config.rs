//! Engine configuration.
//!
//! Every section defaults, so an empty TOML file (or none at all) yields the
//! stock policy. A few knobs can be overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ARENA_SANDBOX_BACKEND` | `sandbox.backend` (`mock` or `process`) |
//! | `ARENA_SANDBOX_SLOTS` | `sandbox.max_concurrent` |
//! | `ARENA_MAX_CONCURRENT_AGENTS` | `orchestrator.max_concurrent_agents` |

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ArenaError, ArenaResult};
use crate::orchestrator::OrchestratorSettings;
use crate::pricing::PricingPolicy;
use crate::sandbox::{SandboxBackend, SandboxSettings};
use crate::scoring::ScoringPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub scoring: ScoringPolicy,
    pub pricing: PricingPolicy,
    pub sandbox: SandboxSettings,
    pub orchestrator: OrchestratorSettings,
}

impl ArenaConfig {
    pub fn from_toml_str(text: &str) -> ArenaResult<Self> {
        toml::from_str(text).map_err(|e| ArenaError::InvalidConfig(e.to_string()))
    }

    /// Parse and validate a TOML file.
    pub fn load(path: &Path) -> ArenaResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ArenaError::InvalidConfig(format!("reading {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// `load(path)` when a path is given, defaults otherwise; then apply
    /// environment overrides and validate.
    pub fn load_or_default(path: Option<&Path>) -> ArenaResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> ArenaResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("ARENA_SANDBOX_BACKEND") {
            self.sandbox.backend = backend
                .parse::<SandboxBackend>()
                .map_err(ArenaError::InvalidConfig)?;
        }
        if let Some(slots) = lookup("ARENA_SANDBOX_SLOTS") {
            self.sandbox.max_concurrent = parse_count("ARENA_SANDBOX_SLOTS", &slots)?;
        }
        if let Some(agents) = lookup("ARENA_MAX_CONCURRENT_AGENTS") {
            self.orchestrator.max_concurrent_agents =
                parse_count("ARENA_MAX_CONCURRENT_AGENTS", &agents)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ArenaResult<()> {
        self.scoring
            .validate()
            .and_then(|_| self.pricing.validate())
            .and_then(|_| self.sandbox.validate())
            .and_then(|_| self.orchestrator.validate())
            .map_err(ArenaError::InvalidConfig)
    }
}

fn parse_count(key: &str, value: &str) -> ArenaResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| ArenaError::InvalidConfig(format!("{key} must be a positive integer, got {value:?}")))
}
