//! Storage trait definitions for the agent arena
//!
//! These traits define the engine's storage collaborator:
//! - `AgentStore`: Agent profiles, daily outcomes, failure log, history
//! - `InterfaceStore`: Content-addressed agent interface code
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a registered agent interface (digest of its code).
pub type InterfaceRef = ContentDigest;

/// Unique agent identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Generate a new random AgentId
    pub fn new() -> Self {
        AgentId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Which arena an agent competes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaType {
    Trading,
    Utility,
    Coding,
}

impl ArenaType {
    pub const ALL: [ArenaType; 3] = [ArenaType::Trading, ArenaType::Utility, ArenaType::Coding];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaType::Trading => "trading",
            ArenaType::Utility => "utility",
            ArenaType::Coding => "coding",
        }
    }
}

impl FromStr for ArenaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trading" => Ok(ArenaType::Trading),
            "utility" => Ok(ArenaType::Utility),
            "coding" => Ok(ArenaType::Coding),
            other => Err(format!("unknown arena type: {other}")),
        }
    }
}

impl std::fmt::Display for ArenaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent tier. Each tier carries its own score ceiling.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Alpha,
    Beta,
    Omega,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Alpha, Tier::Beta, Tier::Omega];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Alpha => "alpha",
            Tier::Beta => "beta",
            Tier::Omega => "omega",
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alpha" => Ok(Tier::Alpha),
            "beta" => Ok(Tier::Beta),
            "omega" => Ok(Tier::Omega),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registered agent as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub name: String,
    pub arena_type: ArenaType,
    pub tier: Tier,
    /// Current score, `0 <= score <= ceiling(tier)`
    pub score: f64,
    /// Price derived from `score` at the last write
    pub price: f64,
    /// Digest of the registered interface code, if any
    pub interface_ref: Option<InterfaceRef>,
    /// Scenario selection hints
    #[serde(default)]
    pub keywords: Vec<String>,
    pub active: bool,
    /// Day of the last scored outcome
    pub last_run_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl AgentProfile {
    /// New active profile with no outcome history.
    pub fn new(
        name: impl Into<String>,
        arena_type: ArenaType,
        tier: Tier,
        score: f64,
        price: f64,
    ) -> Self {
        Self {
            agent_id: AgentId::new(),
            name: name.into(),
            arena_type,
            tier,
            score,
            price,
            interface_ref: None,
            keywords: Vec::new(),
            active: true,
            last_run_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_interface(mut self, interface_ref: InterfaceRef) -> Self {
        self.interface_ref = Some(interface_ref);
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }
}

/// The tier and score a write was computed from.
///
/// Score writes are compare-and-set against this pair, so a write based on
/// a stale read never lands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierScore {
    pub tier: Tier,
    pub score: f64,
}

impl TierScore {
    pub fn new(tier: Tier, score: f64) -> Self {
        Self { tier, score }
    }

    pub fn of(profile: &AgentProfile) -> Self {
        Self::new(profile.tier, profile.score)
    }

    /// Whether `profile` still holds exactly this tier and score.
    pub fn matches(&self, profile: &AgentProfile) -> bool {
        profile.tier == self.tier && profile.score == self.score
    }
}

/// Outcome status of one daily evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Scored,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Scored => "SCORED",
            OutcomeStatus::Failed => "FAILED",
        }
    }
}

/// Result of evaluating one agent on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent_id: AgentId,
    pub run_date: NaiveDate,
    pub status: OutcomeStatus,
    /// Tier the outcome was scored under
    pub tier: Tier,
    pub previous_score: f64,
    pub new_score: f64,
    pub new_price: f64,
    /// Engine performance index in `[0, 1]`; absent when the agent failed
    pub performance_index: Option<f64>,
    pub was_capped: bool,
    pub ceiling_hit: bool,
    pub failure_reason: Option<String>,
    pub run_timestamp: DateTime<Utc>,
}

impl AgentOutcome {
    /// Outcome for an agent that could not be evaluated: score and price
    /// carry over unchanged.
    pub fn failed(
        profile: &AgentProfile,
        run_date: NaiveDate,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: profile.agent_id.clone(),
            run_date,
            status: OutcomeStatus::Failed,
            tier: profile.tier,
            previous_score: profile.score,
            new_score: profile.score,
            new_price: profile.price,
            performance_index: None,
            was_capped: false,
            ceiling_hit: false,
            failure_reason: Some(reason.into()),
            run_timestamp: Utc::now(),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.status == OutcomeStatus::Scored
    }

    /// Profile state this outcome was computed from.
    pub fn basis(&self) -> TierScore {
        TierScore::new(self.tier, self.previous_score)
    }
}

/// Entry in the failure log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub agent_id: AgentId,
    pub run_date: NaiveDate,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AgentStore
// ---------------------------------------------------------------------------

/// Persistence for agent profiles and their daily outcomes.
///
/// Guarantees:
/// - At most one scored outcome exists per `(agent_id, run_date)`.
/// - `record_outcome` updates the profile's score, price and
///   `last_run_date` together with the outcome row.
/// - `record_outcome` and `update_tier` only apply when the profile still
///   holds the tier and score the write was computed from; otherwise they
///   return `ScoreConflict` and change nothing.
/// - Failure log entries never count as the day's outcome.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert or replace an agent profile.
    async fn register(&self, profile: AgentProfile) -> StorageResult<()>;

    /// Fetch a profile. Returns `AgentNotFound` if absent.
    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentProfile>;

    /// All registered agents, ordered by creation time.
    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>>;

    /// Active agents with no scored outcome for `day`.
    async fn list_due(&self, day: NaiveDate) -> StorageResult<Vec<AgentProfile>>;

    /// The scored outcome for `(agent_id, day)`, if one exists.
    async fn outcome_for(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
    ) -> StorageResult<Option<AgentOutcome>>;

    /// Persist a scored outcome and apply it to the profile.
    ///
    /// Returns `AlreadyRecorded` if the day already has an outcome, and
    /// `ScoreConflict` if the profile no longer matches `outcome.basis()`.
    /// Callers pass only `OutcomeStatus::Scored` outcomes; failures go
    /// through `record_failure`.
    async fn record_outcome(&self, outcome: &AgentOutcome) -> StorageResult<()>;

    /// Append to the failure log.
    async fn record_failure(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
        reason: &str,
    ) -> StorageResult<()>;

    /// Failure log entries for an agent, oldest first.
    async fn failures(&self, agent_id: &AgentId) -> StorageResult<Vec<FailureRecord>>;

    /// Scored outcomes for an agent, oldest first.
    async fn history(&self, agent_id: &AgentId) -> StorageResult<Vec<AgentOutcome>>;

    /// Move an agent to `next` (tier plus already-adjusted score) and
    /// `price`, provided the profile still matches `expected`.
    async fn update_tier(
        &self,
        agent_id: &AgentId,
        expected: TierScore,
        next: TierScore,
        price: f64,
    ) -> StorageResult<AgentProfile>;
}

// ---------------------------------------------------------------------------
// InterfaceStore
// ---------------------------------------------------------------------------

/// Content-addressed store for agent interface code.
///
/// Guarantees:
/// - `put(code)` always returns the SHA-256 digest of `code`.
/// - `get(digest)` returns the exact code previously stored.
#[async_trait]
pub trait InterfaceStore: Send + Sync {
    /// Store interface code and return its digest.
    async fn put(&self, code: &str) -> StorageResult<InterfaceRef>;

    /// Retrieve code by digest. Returns `InterfaceNotFound` if absent.
    async fn get(&self, interface_ref: &InterfaceRef) -> StorageResult<String>;

    /// Check whether code with this digest exists.
    async fn contains(&self, interface_ref: &InterfaceRef) -> StorageResult<bool>;
}
